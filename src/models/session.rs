use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::registry::ParticipantRegistry;

/// Languages a session can be edited in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Javascript,
    Python,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Javascript, Language::Python];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Python => "python",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == value)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shared document plus the roster of connected participants.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub code: String,
    pub language: Language,
    pub created_at: DateTime<Utc>,
    pub participants: ParticipantRegistry,
}

/// Body returned by the create endpoint. Omits the (always empty) roster.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub code: String,
    pub language: Language,
    pub created_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            code: session.code.clone(),
            language: session.language,
            created_at: session.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_wire_names() {
        assert_eq!(
            serde_json::to_value(Language::Javascript).unwrap(),
            "javascript"
        );
        assert_eq!(serde_json::to_value(Language::Python).unwrap(), "python");
        assert_eq!(Language::parse("python"), Some(Language::Python));
        assert_eq!(Language::parse("Python"), None);
        assert_eq!(Language::parse("ruby"), None);
    }

    #[test]
    fn test_default_language_is_first_variant() {
        assert_eq!(Language::default(), Language::ALL[0]);
    }
}
