use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const DEFAULT_TITLE: &str = "New Chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserRole {
    Child,
    Admin,
}

/// The user attached to a request by the session middleware.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CurrentUser {
    pub id: i64,
    pub email: String,
    pub role: UserRole,
    #[serde(skip_serializing)]
    pub csrf_token: String,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    pub id: i64,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl FromStr for MessageRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        };
        f.write_str(role)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    pub auto_renamed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConversationWithMessages {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// Outcome of appending a message. `title` is set when the append renamed
/// the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendedMessage {
    pub id: i64,
    pub title: Option<String>,
}

/// Title derived from the first user message: the first 20 characters, with
/// an ellipsis when the message is longer.
pub fn auto_title(message: &str) -> String {
    const MAX_CHARS: usize = 20;

    let mut chars = message.chars();
    let head: String = chars.by_ref().take(MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_title_short_message_kept() {
        assert_eq!(auto_title("Why is the sky blue"), "Why is the sky blue");
        assert_eq!(auto_title("exactly twenty chars"), "exactly twenty chars");
    }

    #[test]
    fn test_auto_title_truncates_on_characters() {
        assert_eq!(
            auto_title("Tell me a story about dragons"),
            "Tell me a story abou..."
        );
        let title = auto_title("恐龙为什么会灭绝呢？它们是不是被小行星撞到了呀");
        assert_eq!(title, "恐龙为什么会灭绝呢？它们是不是被小行星撞...");
    }

    #[test]
    fn test_message_role_parse() {
        assert_eq!("assistant".parse::<MessageRole>(), Ok(MessageRole::Assistant));
        assert!("robot".parse::<MessageRole>().is_err());
        assert!("User".parse::<MessageRole>().is_err());
    }
}
