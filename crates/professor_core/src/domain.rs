//! crates/professor_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! The serde field names match the documents the AI backend produces and the
//! lists stored per user, so the same types are used on the wire and on disk.

use serde::{Deserialize, Serialize};

/// A single concept inside a chapter, explained in markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub title: String,
    pub explanation: String,
}

/// A chapter, unit or main section identified in the analyzed content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(rename = "chapterTitle")]
    pub title: String,
    pub topics: Vec<Topic>,
}

/// The structured breakdown produced by one analysis call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub chapters: Vec<Chapter>,
}

impl AnalysisResult {
    pub fn topic_count(&self) -> usize {
        self.chapters.iter().map(|c| c.topics.len()).sum()
    }
}

/// One past analysis, keyed by its creation timestamp (ms since epoch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSession {
    pub timestamp: i64,
    pub content_text: String,
    pub analysis_result: AnalysisResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self { sender: Sender::User, text: text.into() }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self { sender: Sender::Bot, text: text.into() }
    }
}

/// An archived conversation with the tutor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub timestamp: i64,
    pub messages: Vec<ChatMessage>,
}

// Represents the active user - scopes all persisted history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

// Only used internally for sign-in - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub uid: String,
    pub name: Option<String>,
    pub email: String,
    pub hashed_password: String,
}

impl UserCredentials {
    pub fn to_user(&self) -> User {
        User {
            uid: self.uid.clone(),
            name: self.name.clone(),
            email: Some(self.email.clone()),
        }
    }
}

// Represents a persisted sign-in (survives restarts until it expires)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub uid: String,
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_session_uses_stored_field_names() {
        let session = AnalysisSession {
            timestamp: 1_700_000_000_000,
            content_text: "Newton's laws".to_string(),
            analysis_result: AnalysisResult {
                chapters: vec![Chapter {
                    title: "Mechanics".to_string(),
                    topics: vec![Topic {
                        title: "Inertia".to_string(),
                        explanation: "**Inertia** resists change.".to_string(),
                    }],
                }],
            },
        };

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["contentText"], "Newton's laws");
        assert_eq!(json["analysisResult"]["chapters"][0]["chapterTitle"], "Mechanics");
        assert_eq!(
            json["analysisResult"]["chapters"][0]["topics"][0]["title"],
            "Inertia"
        );
    }

    #[test]
    fn sender_is_lowercase_on_the_wire() {
        let json = serde_json::to_string(&ChatMessage::bot("hi")).unwrap();
        assert_eq!(json, r#"{"sender":"bot","text":"hi"}"#);
    }
}
