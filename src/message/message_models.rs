use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// An immutable message. Within a conversation, messages are totally
/// ordered by `(created_at, id)`; `seq` counts them from 1 in that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub seq: i64,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn cursor(&self) -> Cursor {
        Cursor {
            created_at: self.created_at,
            id: self.id,
        }
    }
}

/// Reader position in a conversation's history.
///
/// Field order matters: the derived `Ord` compares `created_at` first and
/// breaks ties on `id`, which is the store's ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}:{}", self.created_at.timestamp_micros(), self.id))
    }

    pub fn decode(token: &str) -> Result<Self> {
        let invalid = || AppError::Validation("Invalid cursor".to_string());

        let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
        let raw = String::from_utf8(bytes).map_err(|_| invalid())?;
        let (micros, id) = raw.split_once(':').ok_or_else(invalid)?;

        let micros: i64 = micros.parse().map_err(|_| invalid())?;
        let created_at = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(invalid)?;
        let id = Uuid::parse_str(id).map_err(|_| invalid())?;

        Ok(Self { created_at, id })
    }
}

/// One page of `list_since`.
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Cursor of the last returned message, or the requested cursor when the
    /// page is empty.
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
}

impl MessagePage {
    /// Build a page from up to `limit + 1` ordered rows.
    pub fn from_rows(mut rows: Vec<Message>, after: Option<Cursor>, limit: i64) -> Self {
        let limit = limit.max(0) as usize;
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let next_cursor = rows.last().map(Message::cursor).or(after);

        Self {
            messages: rows,
            next_cursor,
            has_more,
        }
    }
}

/// Trim message content and enforce the non-empty and length bounds.
pub fn normalize_content(content: &str, max_chars: usize) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(AppError::EmptyContent);
    }
    if trimmed.chars().count() > max_chars {
        return Err(AppError::Validation(format!(
            "Message content exceeds {} characters",
            max_chars
        )));
    }
    Ok(trimmed.to_string())
}

/// Timestamp for the next message in a conversation whose latest activity
/// was `last_activity`. Strictly increasing and truncated to the store's
/// microsecond precision so cursors round-trip exactly.
pub fn next_message_timestamp(last_activity: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(6);
    if now > last_activity {
        now
    } else {
        last_activity.trunc_subsecs(6) + Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_at(micros: i64, seq: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::nil(),
            seq,
            sender_id: Uuid::nil(),
            content: format!("m{}", seq),
            created_at: DateTime::<Utc>::from_timestamp_micros(micros).unwrap(),
        }
    }

    #[test]
    fn test_cursor_round_trip() {
        let cursor = message_at(1_760_000_000_123_456, 1).cursor();
        let decoded = Cursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn test_cursor_rejects_garbage() {
        assert!(matches!(Cursor::decode("not base64!"), Err(AppError::Validation(_))));
        let no_separator = URL_SAFE_NO_PAD.encode("12345");
        assert!(Cursor::decode(&no_separator).is_err());
        let bad_uuid = URL_SAFE_NO_PAD.encode("12345:nope");
        assert!(Cursor::decode(&bad_uuid).is_err());
    }

    #[test]
    fn test_cursor_orders_by_time_then_id() {
        let earlier = message_at(10, 1).cursor();
        let later = message_at(11, 2).cursor();
        assert!(earlier < later);

        let tie_a = Cursor {
            created_at: earlier.created_at,
            id: Uuid::from_u128(1),
        };
        let tie_b = Cursor {
            created_at: earlier.created_at,
            id: Uuid::from_u128(2),
        };
        assert!(tie_a < tie_b);
    }

    #[test]
    fn test_page_cursor_is_last_returned_record() {
        let rows = vec![message_at(1, 1), message_at(2, 2), message_at(3, 3)];
        let page = MessagePage::from_rows(rows.clone(), None, 2);

        assert!(page.has_more);
        assert_eq!(page.messages.len(), 2);
        assert_eq!(page.next_cursor, Some(rows[1].cursor()));
    }

    #[test]
    fn test_empty_page_keeps_requested_cursor() {
        let after = message_at(5, 1).cursor();
        let page = MessagePage::from_rows(Vec::new(), Some(after), 10);

        assert!(!page.has_more);
        assert!(page.messages.is_empty());
        assert_eq!(page.next_cursor, Some(after));
    }

    #[test]
    fn test_normalize_content() {
        assert_eq!(normalize_content("  Hi  ", 10).unwrap(), "Hi");
        assert!(matches!(normalize_content("", 10), Err(AppError::EmptyContent)));
        assert!(matches!(normalize_content(" \n\t ", 10), Err(AppError::EmptyContent)));
        assert!(matches!(normalize_content("hello world", 5), Err(AppError::Validation(_))));
        // Length is counted in characters, not bytes.
        assert!(normalize_content("héllo", 5).is_ok());
    }

    #[test]
    fn test_next_message_timestamp_is_strictly_increasing() {
        let last = DateTime::<Utc>::from_timestamp_micros(1_000_000).unwrap();

        let behind = DateTime::<Utc>::from_timestamp_micros(999_000).unwrap();
        assert_eq!(
            next_message_timestamp(last, behind),
            DateTime::<Utc>::from_timestamp_micros(1_000_001).unwrap()
        );

        let ahead = DateTime::<Utc>::from_timestamp(2, 999).unwrap();
        let next = next_message_timestamp(last, ahead);
        assert_eq!(next.timestamp_subsec_nanos() % 1_000, 0);
        assert!(next > last);
    }
}
