pub mod classify;
pub mod follow_up;
pub mod llm;
pub mod openrouter;
pub mod pipeline;
pub mod sanitize;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(parts),
        }
    }
}

/// Either a bare string or an array of typed blocks, as the endpoint accepts both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationMode {
    #[default]
    Beginner,
    Exam,
    Conceptual,
    Quick,
}

impl ExplanationMode {
    pub const ALL: [ExplanationMode; 4] = [
        ExplanationMode::Beginner,
        ExplanationMode::Exam,
        ExplanationMode::Conceptual,
        ExplanationMode::Quick,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExplanationMode::Beginner => "beginner",
            ExplanationMode::Exam => "exam",
            ExplanationMode::Conceptual => "conceptual",
            ExplanationMode::Quick => "quick",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExplanationMode::Beginner => "Beginner",
            ExplanationMode::Exam => "Exam-Oriented",
            ExplanationMode::Conceptual => "Conceptual",
            ExplanationMode::Quick => "Quick Revision",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ExplanationMode::Beginner => "Simple and easy-to-understand explanations",
            ExplanationMode::Exam => "Focused on key points for exams",
            ExplanationMode::Conceptual => "Deep understanding of concepts",
            ExplanationMode::Quick => "Brief summary for quick review",
        }
    }
}

impl fmt::Display for ExplanationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExplanationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExplanationMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown explanation mode '{}' (expected beginner, exam, conceptual or quick)",
                    s
                )
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub label: String,
    pub description: String,
}
