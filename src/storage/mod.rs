// ABOUTME: Conversation storage abstraction shared by the orchestrator and chat routes
// ABOUTME: Pluggable backend trait with an in-memory implementation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// In-memory conversation store
pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::{AppResult, ErrorCode};
use crate::models::{Conversation, Message};

pub use memory::InMemoryConversationStore;

/// Conversation store trait for pluggable backend implementations
///
/// Every read returns an owned snapshot. Mutating a returned [`Conversation`]
/// never affects the store.
///
/// # Examples
///
/// ```rust,no_run
/// use tool_gateway::models::Message;
/// use tool_gateway::storage::{ConversationStore, InMemoryConversationStore};
/// # async fn example() -> Result<(), tool_gateway::errors::AppError> {
/// let store = InMemoryConversationStore::new();
/// let chat = store.create().await?;
/// store.append(chat.id, Message::user("hello")).await?;
///
/// let snapshot = store.get(chat.id).await?;
/// assert_eq!(snapshot.messages.len(), 1);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Allocate a new empty conversation
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot persist the conversation
    async fn create(&self) -> AppResult<Conversation>;

    /// Append one message to the end of a conversation
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if `id` is unknown
    async fn append(&self, id: Uuid, message: Message) -> AppResult<()>;

    /// Snapshot of one conversation
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if `id` is unknown
    async fn get(&self, id: Uuid) -> AppResult<Conversation>;

    /// Snapshot of all conversations, in unspecified order
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read
    async fn list(&self) -> AppResult<Vec<Conversation>>;

    /// Remove a conversation
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if `id` is unknown
    async fn delete(&self, id: Uuid) -> AppResult<()>;

    /// Whether a conversation exists
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read
    async fn exists(&self, id: Uuid) -> AppResult<bool> {
        match self.get(id).await {
            Ok(_) => Ok(true),
            Err(e) if e.code == ErrorCode::ResourceNotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
