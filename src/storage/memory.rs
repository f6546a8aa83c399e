// ABOUTME: In-memory conversation store guarded by a single read-write lock
// ABOUTME: Readers run in parallel, appends are exclusive and never reorder
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::ConversationStore;
use crate::errors::{AppError, AppResult};
use crate::models::{Conversation, Message};

const RESOURCE: &str = "Conversation";

/// Process-local conversation store
///
/// Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<Uuid, Conversation>>>,
}

impl InMemoryConversationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self) -> AppResult<Conversation> {
        let conversation = Conversation::new();
        self.conversations
            .write()
            .await
            .insert(conversation.id, conversation.clone());
        debug!(chat_id = %conversation.id, "Conversation created");
        Ok(conversation)
    }

    async fn append(&self, id: Uuid, mut message: Message) -> AppResult<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(RESOURCE).with_resource_id(id.to_string()))?;

        // generated_at never goes backwards within a conversation
        if let Some(last) = conversation.messages.last() {
            if message.generated_at < last.generated_at {
                message.generated_at = last.generated_at;
            }
        }
        conversation.messages.push(message);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Conversation> {
        self.conversations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found(RESOURCE).with_resource_id(id.to_string()))
    }

    async fn list(&self) -> AppResult<Vec<Conversation>> {
        Ok(self.conversations.read().await.values().cloned().collect())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.conversations
            .write()
            .await
            .remove(&id)
            .map(|_| debug!(chat_id = %id, "Conversation deleted"))
            .ok_or_else(|| AppError::not_found(RESOURCE).with_resource_id(id.to_string()))
    }
}
