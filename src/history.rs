//! # Message history
//!
//! Session-tagged conversation memory persisted in the SQLite `messages` table.
//!
//! - [`MessageHistory`] is a handle bound to one history name and one session tag. Every
//!   read and write is scoped to that pair, so sessions sharing a database never see each
//!   other's messages.
//! - [`HistoryCache`] keeps one [`MessageHistory`] per session id and renders recent
//!   messages into a compact context string for prompts.
//!
//! ## Context format
//! ```text
//! User: What is the EMI on 5 lakh for 3 years?
//! Assistant: Your EMI is ₹16,134 per month... Intent: loans (0.12)
//! ```

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::establish_connection;
use crate::error::{Result, RouterError};
use crate::models::MessageRow;
use crate::schema::messages;

/// Characters of an assistant message kept in the rendered context.
pub const CONTEXT_PREVIEW_CHARS: usize = 100;

/// Sender of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            other => Err(RouterError::Serialization(format!("unknown role '{other}'"))),
        }
    }
}

/// Routing result attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub intent: Option<String>,
    pub score: Option<f64>,
}

/// A message before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: MessageMetadata::default(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_intent(mut self, intent: Option<&str>, score: Option<f64>) -> Self {
        self.metadata = MessageMetadata {
            intent: intent.map(str::to_string),
            score,
        };
        self
    }
}

/// A message read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i32,
    pub session_tag: String,
    pub role: Role,
    pub content: String,
    pub metadata: MessageMetadata,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<MessageRow> for StoredMessage {
    type Error = RouterError;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Self {
            id: row.id.unwrap_or_default(),
            session_tag: row.session_tag,
            role: row.role.parse()?,
            content: row.content,
            metadata: MessageMetadata {
                intent: row.intent,
                score: row.score,
            },
            timestamp: DateTime::<Utc>::from_timestamp_millis(row.created_at).unwrap_or_default(),
        })
    }
}

/// Conversation memory for one `(history name, session tag)` pair.
pub struct MessageHistory {
    name: String,
    session_tag: String,
    connection: SqliteConnection,
}

impl MessageHistory {
    pub fn new(name: impl Into<String>, session_tag: impl Into<String>, connection: SqliteConnection) -> Self {
        Self {
            name: name.into(),
            session_tag: session_tag.into(),
            connection,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session_tag(&self) -> &str {
        &self.session_tag
    }

    fn to_row(&self, message: &ChatMessage, created_at: i64) -> MessageRow {
        MessageRow {
            id: None,
            history_name: self.name.clone(),
            session_tag: self.session_tag.clone(),
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
            intent: message.metadata.intent.clone(),
            score: message.metadata.score,
            created_at,
        }
    }

    /// Append one message.
    pub fn add_message(&mut self, message: &ChatMessage) -> Result<()> {
        self.add_messages(std::slice::from_ref(message))
    }

    /// Append several messages in one transaction, keeping their order.
    pub fn add_messages(&mut self, batch: &[ChatMessage]) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let rows: Vec<MessageRow> = batch.iter().map(|m| self.to_row(m, now)).collect();
        self.connection.transaction(|conn| {
            for row in &rows {
                diesel::insert_into(messages::table).values(row).execute(conn)?;
            }
            Ok::<_, diesel::result::Error>(())
        })?;
        debug!("Stored {} messages for session '{}'", rows.len(), self.session_tag);
        Ok(())
    }

    /// Store a user prompt and the assistant response as one exchange.
    pub fn store(&mut self, prompt: &str, response: &str) -> Result<()> {
        self.add_messages(&[ChatMessage::user(prompt), ChatMessage::assistant(response)])
    }

    /// The `top_k` most recent messages, oldest first.
    pub fn get_recent(&mut self, top_k: usize) -> Result<Vec<StoredMessage>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let mut rows: Vec<MessageRow> = messages::table
            .filter(messages::history_name.eq(&self.name))
            .filter(messages::session_tag.eq(&self.session_tag))
            .order(messages::id.desc())
            .limit(top_k as i64)
            .select(MessageRow::as_select())
            .load(&mut self.connection)?;
        rows.reverse();
        rows.into_iter().map(StoredMessage::try_from).collect()
    }

    /// Every message of this session, oldest first.
    pub fn messages(&mut self) -> Result<Vec<StoredMessage>> {
        let rows: Vec<MessageRow> = messages::table
            .filter(messages::history_name.eq(&self.name))
            .filter(messages::session_tag.eq(&self.session_tag))
            .order(messages::id.asc())
            .select(MessageRow::as_select())
            .load(&mut self.connection)?;
        rows.into_iter().map(StoredMessage::try_from).collect()
    }

    pub fn count(&mut self) -> Result<usize> {
        let count: i64 = messages::table
            .filter(messages::history_name.eq(&self.name))
            .filter(messages::session_tag.eq(&self.session_tag))
            .count()
            .get_result(&mut self.connection)?;
        Ok(count as usize)
    }

    /// Remove one message by id, or the latest one when `id` is `None`.
    ///
    /// Returns `false` if nothing matched.
    pub fn drop_message(&mut self, id: Option<i32>) -> Result<bool> {
        let target = match id {
            Some(id) => id,
            None => {
                let last: Option<i32> = messages::table
                    .filter(messages::history_name.eq(&self.name))
                    .filter(messages::session_tag.eq(&self.session_tag))
                    .order(messages::id.desc())
                    .select(messages::id)
                    .first(&mut self.connection)
                    .optional()?;
                match last {
                    Some(id) => id,
                    None => return Ok(false),
                }
            }
        };
        let deleted = diesel::delete(
            messages::table
                .filter(messages::id.eq(target))
                .filter(messages::history_name.eq(&self.name))
                .filter(messages::session_tag.eq(&self.session_tag)),
        )
        .execute(&mut self.connection)?;
        Ok(deleted > 0)
    }

    /// Delete every message of this session. Other sessions are untouched.
    pub fn clear(&mut self) -> Result<usize> {
        let deleted = diesel::delete(
            messages::table
                .filter(messages::history_name.eq(&self.name))
                .filter(messages::session_tag.eq(&self.session_tag)),
        )
        .execute(&mut self.connection)?;
        Ok(deleted)
    }
}

/// Render messages as prompt context, one line each. `None` when empty.
pub fn format_context(messages: &[StoredMessage]) -> Option<String> {
    if messages.is_empty() {
        return None;
    }
    let lines: Vec<String> = messages
        .iter()
        .map(|m| match m.role {
            Role::User => format!("User: {}", m.content),
            _ => {
                let preview: String = m.content.chars().take(CONTEXT_PREVIEW_CHARS).collect();
                format!(
                    "Assistant: {preview}... Intent: {} ({:.2})",
                    m.metadata.intent.as_deref().unwrap_or("unknown"),
                    m.metadata.score.unwrap_or(0.0)
                )
            }
        })
        .collect();
    Some(lines.join("\n"))
}

/// One [`MessageHistory`] per session id, opened lazily on first use.
pub struct HistoryCache {
    db_url: String,
    history_name: String,
    histories: HashMap<String, MessageHistory>,
}

impl HistoryCache {
    pub fn new(db_url: impl Into<String>, history_name: impl Into<String>) -> Self {
        Self {
            db_url: db_url.into(),
            history_name: history_name.into(),
            histories: HashMap::new(),
        }
    }

    /// The history of `session_id`, created on first access.
    pub fn get_history(&mut self, session_id: &str) -> Result<&mut MessageHistory> {
        match self.histories.entry(session_id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let connection = establish_connection(&self.db_url)?;
                Ok(entry.insert(MessageHistory::new(self.history_name.clone(), session_id, connection)))
            }
        }
    }

    /// Record one message with the routing result that produced it.
    pub fn add_message(
        &mut self,
        session_id: &str,
        role: Role,
        text: &str,
        intent: Option<&str>,
        score: Option<f64>,
    ) -> Result<()> {
        let message = ChatMessage::new(role, text).with_intent(intent, score);
        self.get_history(session_id)?.add_message(&message)
    }

    /// Record a prompt/response pair; the routing result is attached to the response.
    pub fn store_exchange(
        &mut self,
        session_id: &str,
        prompt: &str,
        response: &str,
        intent: Option<&str>,
        score: Option<f64>,
    ) -> Result<()> {
        let batch = [
            ChatMessage::user(prompt),
            ChatMessage::assistant(response).with_intent(intent, score),
        ];
        self.get_history(session_id)?.add_messages(&batch)
    }

    /// Recent messages of a session rendered with [`format_context`].
    pub fn get_context(&mut self, session_id: &str, limit: usize) -> Result<Option<String>> {
        let recent = self.get_history(session_id)?.get_recent(limit)?;
        debug!("Retrieved {} messages for session '{session_id}'", recent.len());
        Ok(format_context(&recent))
    }

    /// Delete a session's messages and forget its handle.
    pub fn clear_conversation(&mut self, session_id: &str) -> Result<usize> {
        let deleted = self.get_history(session_id)?.clear()?;
        self.histories.remove(session_id);
        info!("Cleared {deleted} messages for session '{session_id}'");
        Ok(deleted)
    }

    /// Session ids with an open handle, sorted.
    pub fn sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = self.histories.keys().cloned().collect();
        sessions.sort();
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(session: &str) -> MessageHistory {
        MessageHistory::new("bank:msg:test", session, establish_connection(":memory:").unwrap())
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!(Role::Tool.to_string(), "tool");
        assert!("robot".parse::<Role>().is_err());
    }

    #[test]
    fn test_store_and_get_recent_order() {
        let mut h = history("s1");
        h.store("hello", "hi there").unwrap();
        h.add_message(&ChatMessage::user("emi for 5 lakh")).unwrap();

        let recent = h.get_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "hi there");
        assert_eq!(recent[0].role, Role::Assistant);
        assert_eq!(recent[1].content, "emi for 5 lakh");

        assert_eq!(h.messages().unwrap().len(), 3);
        assert_eq!(h.count().unwrap(), 3);
        assert!(h.get_recent(0).unwrap().is_empty());
        assert_eq!(h.get_recent(10).unwrap().len(), 3);
    }

    #[test]
    fn test_drop_message() {
        let mut h = history("s1");
        h.store("a", "b").unwrap();
        assert!(h.drop_message(None).unwrap());
        let left = h.messages().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].content, "a");

        assert!(h.drop_message(Some(left[0].id)).unwrap());
        assert!(!h.drop_message(None).unwrap());
        assert!(!h.drop_message(Some(999)).unwrap());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("history.db");
        let db = db.to_str().unwrap();

        let mut alice = MessageHistory::new("bank:msg:test", "alice", establish_connection(db).unwrap());
        let mut bob = MessageHistory::new("bank:msg:test", "bob", establish_connection(db).unwrap());
        alice.store("alice q", "alice a").unwrap();
        bob.add_message(&ChatMessage::user("bob q")).unwrap();

        assert_eq!(alice.count().unwrap(), 2);
        assert_eq!(bob.count().unwrap(), 1);
        assert!(!bob.drop_message(Some(alice.messages().unwrap()[0].id)).unwrap());

        assert_eq!(alice.clear().unwrap(), 2);
        assert_eq!(alice.count().unwrap(), 0);
        assert_eq!(bob.messages().unwrap()[0].content, "bob q");
    }

    #[test]
    fn test_format_context() {
        let long = "x".repeat(150);
        let msg = |role, content: &str, intent: Option<&str>, score| StoredMessage {
            id: 1,
            session_tag: "s".into(),
            role,
            content: content.into(),
            metadata: MessageMetadata {
                intent: intent.map(str::to_string),
                score,
            },
            timestamp: Utc::now(),
        };
        let context = format_context(&[
            msg(Role::User, "hello", None, None),
            msg(Role::Assistant, &long, Some("loans"), Some(0.123)),
            msg(Role::Tool, "done", None, None),
        ])
        .unwrap();
        let lines: Vec<&str> = context.lines().collect();
        assert_eq!(lines[0], "User: hello");
        assert_eq!(lines[1], format!("Assistant: {}... Intent: loans (0.12)", "x".repeat(100)));
        assert_eq!(lines[2], "Assistant: done... Intent: unknown (0.00)");
        assert!(format_context(&[]).is_none());
    }

    #[test]
    fn test_cache_reuses_session_handle() {
        // every `:memory:` connection is a separate database, so data only survives
        // when the cached handle is returned again
        let mut cache = HistoryCache::new(":memory:", "bank:msg:test");
        cache.add_message("s1", Role::User, "hello", None, None).unwrap();
        assert_eq!(cache.get_history("s1").unwrap().count().unwrap(), 1);
        assert_eq!(cache.get_history("s2").unwrap().count().unwrap(), 0);
        assert_eq!(cache.get_history("s1").unwrap().count().unwrap(), 1);
    }

    #[test]
    fn test_cache_context_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cache.db");
        let mut cache = HistoryCache::new(db.to_str().unwrap(), "bank:msg:test");

        assert!(cache.get_context("s1", 6).unwrap().is_none());
        cache
            .add_message("s1", Role::User, "I lost my card", Some("fraud"), Some(0.08))
            .unwrap();
        cache
            .store_exchange("s1", "block it", "Card blocked", Some("fraud"), Some(0.1))
            .unwrap();
        cache.add_message("s2", Role::User, "hi", None, None).unwrap();
        assert_eq!(cache.sessions(), vec!["s1", "s2"]);

        let context = cache.get_context("s1", 2).unwrap().unwrap();
        assert_eq!(context, "User: block it\nAssistant: Card blocked... Intent: fraud (0.10)");

        let stored = cache.get_history("s1").unwrap().messages().unwrap();
        assert_eq!(stored[0].metadata.intent.as_deref(), Some("fraud"));
        assert_eq!(stored[1].metadata, MessageMetadata::default());

        assert_eq!(cache.clear_conversation("s1").unwrap(), 3);
        assert_eq!(cache.sessions(), vec!["s2"]);
        assert!(cache.get_context("s1", 6).unwrap().is_none());
        assert!(cache.get_context("s2", 6).unwrap().is_some());
    }
}
