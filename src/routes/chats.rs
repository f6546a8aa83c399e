// ABOUTME: Conversation history routes
// ABOUTME: Lists, fetches and deletes conversations; listing and deletion need a bearer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::cmp::Reverse;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::middleware::require_bearer;
use crate::models::Conversation;
use crate::server::ServerResources;

/// Body of `GET /chats`
#[derive(Debug, Serialize)]
pub struct ChatList {
    /// Conversations, most recently active first
    pub chats: Vec<Conversation>,
}

fn parse_chat_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::invalid_format("Invalid chat ID"))
}

fn chat_not_found(e: AppError) -> AppError {
    if e.code == ErrorCode::ResourceNotFound {
        AppError::not_found("Chat")
    } else {
        e
    }
}

/// Chat routes implementation
pub struct ChatRoutes;

impl ChatRoutes {
    /// `GET /chats`, `GET /chats/:id` and `DELETE /chats/:id`
    pub fn routes(resources: &Arc<ServerResources>) -> Router {
        let public = Router::new().route("/chats/:id", get(Self::get_chat));

        let protected = Router::new()
            .route("/chats", get(Self::list_chats))
            .route("/chats/:id", delete(Self::delete_chat));
        let protected = match &resources.validator {
            Some(validator) => {
                protected.route_layer(from_fn_with_state(Arc::clone(validator), require_bearer))
            }
            None => protected,
        };

        public.merge(protected).with_state(Arc::clone(resources))
    }

    async fn list_chats(State(resources): State<Arc<ServerResources>>) -> AppResult<Json<ChatList>> {
        let mut chats = resources.orchestrator.store().list().await?;
        chats.sort_by_key(|chat| Reverse(chat.last_activity()));
        Ok(Json(ChatList { chats }))
    }

    async fn get_chat(
        State(resources): State<Arc<ServerResources>>,
        Path(id): Path<String>,
    ) -> AppResult<Json<Conversation>> {
        let id = parse_chat_id(&id)?;
        let chat = resources
            .orchestrator
            .store()
            .get(id)
            .await
            .map_err(chat_not_found)?;
        Ok(Json(chat))
    }

    async fn delete_chat(
        State(resources): State<Arc<ServerResources>>,
        Path(id): Path<String>,
    ) -> AppResult<StatusCode> {
        let id = parse_chat_id(&id)?;
        resources
            .orchestrator
            .store()
            .delete(id)
            .await
            .map_err(chat_not_found)?;
        info!(chat_id = %id, "Chat deleted");
        Ok(StatusCode::NO_CONTENT)
    }
}
