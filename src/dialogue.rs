use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub dialogue_id: String,
    pub messages: Vec<Turn>,
}

/// A single utterance. Fields are optional on input so that a malformed
/// record surfaces as a [`FormatError`] rather than failing the whole load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Turn {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[cfg(test)]
impl Turn {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: Some(sender.into()),
            text: Some(text.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read dialogues from {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse dialogues in {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("Turn {index} is missing its `{field}` field")]
pub struct FormatError {
    pub index: usize,
    pub field: &'static str,
}

pub async fn load_conversations(path: &Path) -> Result<Vec<Conversation>, LoadError> {
    let data = tokio::fs::read(path).await.map_err(|source| LoadError::Read {
        path: path.to_owned(),
        source,
    })?;

    serde_json::from_slice(&data).map_err(|source| LoadError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Renders turns as `"<sender>: <text>"` lines in their original order.
pub fn format_transcript(turns: &[Turn]) -> Result<String, FormatError> {
    turns
        .iter()
        .enumerate()
        .map(|(index, turn)| {
            let sender = turn.sender.as_deref().ok_or(FormatError {
                index,
                field: "sender",
            })?;
            let text = turn.text.as_deref().ok_or(FormatError {
                index,
                field: "text",
            })?;
            Ok(format!("{sender}: {text}"))
        })
        .process_results(|mut lines| lines.join("\n"))
}
