//! In-memory conversation and message store for tests.
//!
//! Applies the same rules as the PostgreSQL repositories: one record per
//! `(ride_id, canonical pair)` and appends that update the message log and
//! the conversation's activity under a single lock.

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::conversation_models::{CanonicalPair, Conversation};
use super::conversation_repository::ConversationStore;
use crate::error::{AppError, Result};
use crate::message::message_models::{next_message_timestamp, Cursor, Message, MessagePage};
use crate::message::MessageStore;

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, Conversation>,
    keys: HashMap<(Uuid, CanonicalPair), Uuid>,
    messages: HashMap<Uuid, Vec<Message>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    stale_lookups: AtomicUsize,
    transient_read_failures: AtomicUsize,
    append_failures: AtomicUsize,
    inserts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` key lookups miss, as a lookup racing a concurrent
    /// creator would.
    pub fn miss_next_lookups(&self, n: usize) {
        self.stale_lookups.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` message reads with a pool timeout.
    pub fn fail_next_reads(&self, n: usize) {
        self.transient_read_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` appends with a pool timeout.
    pub fn fail_next_appends(&self, n: usize) {
        self.append_failures.store(n, Ordering::SeqCst);
    }

    pub fn conversation_count(&self) -> usize {
        self.inner.lock().unwrap().conversations.len()
    }

    pub fn message_count(&self, conversation_id: Uuid) -> usize {
        self.inner
            .lock()
            .unwrap()
            .messages
            .get(&conversation_id)
            .map_or(0, Vec::len)
    }

    pub fn successful_inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.inner.lock().unwrap().conversations.get(&id).cloned())
    }

    async fn find_by_key(
        &self,
        ride_id: Uuid,
        pair: CanonicalPair,
    ) -> Result<Option<Conversation>> {
        // Let concurrent callers interleave between lookup and insert.
        tokio::task::yield_now().await;

        if Self::take(&self.stale_lookups) {
            return Ok(None);
        }

        let inner = self.inner.lock().unwrap();
        Ok(inner
            .keys
            .get(&(ride_id, pair))
            .and_then(|id| inner.conversations.get(id))
            .cloned())
    }

    async fn insert(&self, ride_id: Uuid, pair: CanonicalPair) -> Result<Conversation> {
        tokio::task::yield_now().await;

        let mut inner = self.inner.lock().unwrap();
        if inner.keys.contains_key(&(ride_id, pair)) {
            return Err(AppError::Conflict("Conversation already exists".to_string()));
        }

        let now = Utc::now().trunc_subsecs(6);
        let conversation = Conversation {
            id: Uuid::new_v4(),
            ride_id,
            participant_a: pair.low(),
            participant_b: pair.high(),
            created_at: now,
            last_activity_at: now,
            message_count: 0,
        };

        inner.keys.insert((ride_id, pair), conversation.id);
        inner.conversations.insert(conversation.id, conversation.clone());
        self.inserts.fetch_add(1, Ordering::SeqCst);

        Ok(conversation)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let inner = self.inner.lock().unwrap();
        let mut conversations: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect();

        conversations.sort_by(|a, b| {
            b.last_activity_at
                .cmp(&a.last_activity_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(conversations)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::EmptyContent);
        }
        if Self::take(&self.append_failures) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut inner = self.inner.lock().unwrap();

        let conversation = inner
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

        if !conversation.has_participant(sender_id) {
            return Err(AppError::InvalidSender);
        }

        let created_at = next_message_timestamp(conversation.last_activity_at, Utc::now());
        let seq = conversation.message_count + 1;

        conversation.last_activity_at = created_at;
        conversation.message_count = seq;

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            seq,
            sender_id,
            content: content.to_string(),
            created_at,
        };

        inner
            .messages
            .entry(conversation_id)
            .or_default()
            .push(message.clone());

        Ok(message)
    }

    async fn list_since(
        &self,
        conversation_id: Uuid,
        after: Option<Cursor>,
        limit: i64,
    ) -> Result<MessagePage> {
        if Self::take(&self.transient_read_failures) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }

        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Message> = inner
            .messages
            .get(&conversation_id)
            .map(|log| {
                log.iter()
                    .filter(|m| after.map_or(true, |c| m.cursor() > c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by_key(Message::cursor);
        rows.truncate((limit.max(0) + 1) as usize);

        Ok(MessagePage::from_rows(rows, after, limit))
    }

    async fn latest_for(&self, conversation_ids: &[Uuid]) -> Result<HashMap<Uuid, Message>> {
        let inner = self.inner.lock().unwrap();
        Ok(conversation_ids
            .iter()
            .filter_map(|id| {
                inner
                    .messages
                    .get(id)
                    .and_then(|log| log.iter().max_by_key(|m| m.cursor()))
                    .map(|m| (*id, m.clone()))
            })
            .collect())
    }
}
