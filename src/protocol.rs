// Wire protocol spoken with the generation backend

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::PromptError;

pub const DEFAULT_TARGET_PAGES: u32 = 10;
pub const MIN_PROMPT_CHARS: usize = 10;
pub const MAX_PROMPT_CHARS: usize = 5000;

/// Frames sent from the client to the backend.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientRequest {
    Generate { prompt: String, target_pages: u32 },
}

impl ClientRequest {
    /// Build a validated generate request.
    ///
    /// # Errors
    ///
    /// Returns a [`PromptError`] when the prompt is blank, shorter than
    /// [`MIN_PROMPT_CHARS`] once trimmed, or longer than [`MAX_PROMPT_CHARS`].
    pub fn generate(prompt: impl Into<String>, target_pages: Option<u32>) -> Result<Self, PromptError> {
        let prompt = prompt.into();
        validate_prompt(&prompt)?;
        Ok(Self::Generate {
            prompt,
            target_pages: target_pages.unwrap_or(DEFAULT_TARGET_PAGES),
        })
    }

    pub fn prompt(&self) -> &str {
        match self {
            Self::Generate { prompt, .. } => prompt,
        }
    }
}

/// Check a prompt the same way the backend does, so bad input fails fast.
///
/// # Errors
///
/// See [`ClientRequest::generate`].
pub fn validate_prompt(prompt: &str) -> Result<(), PromptError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(PromptError::Empty);
    }
    if trimmed.chars().count() < MIN_PROMPT_CHARS {
        return Err(PromptError::TooShort);
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(PromptError::TooLong {
            max: MAX_PROMPT_CHARS,
        });
    }
    Ok(())
}

/// Frames sent from the backend to the client, discriminated by `type`.
///
/// Only `type` is strict. Optional fields that are null or of an unexpected
/// type fall back to their defaults instead of rejecting the whole frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    Start {
        #[serde(default, deserialize_with = "lenient_text")]
        message: Option<String>,
    },
    Chunk {
        #[serde(default, deserialize_with = "lenient_content")]
        content: String,
        /// Informational only; reassembly uses arrival order.
        #[serde(default, deserialize_with = "lenient_count")]
        chunk_index: Option<u64>,
        #[serde(default, deserialize_with = "lenient_flag")]
        is_last: bool,
        #[serde(default)]
        metadata: Option<Value>,
    },
    /// Single-shot delivery of the whole document body.
    Content {
        #[serde(default, deserialize_with = "lenient_content")]
        content: String,
        #[serde(default)]
        metadata: Option<Value>,
    },
    Complete {
        #[serde(default, deserialize_with = "lenient_text")]
        message: Option<String>,
        #[serde(default, deserialize_with = "lenient_metadata")]
        metadata: Option<CompletionMetadata>,
    },
    Error {
        #[serde(default, deserialize_with = "lenient_text")]
        error: Option<String>,
    },
}

impl WireMessage {
    /// Parse one inbound text frame.
    ///
    /// # Errors
    ///
    /// Fails on invalid JSON, a missing or unknown `type`, or mistyped fields.
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Chunk { .. } => "chunk",
            Self::Content { .. } => "content",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    pub fn chunk(content: impl Into<String>, is_last: bool) -> Self {
        Self::Chunk {
            content: content.into(),
            chunk_index: None,
            is_last,
            metadata: None,
        }
    }
}

/// Metadata the backend attaches to `complete`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompletionMetadata {
    #[serde(default, deserialize_with = "lenient_count")]
    pub length: Option<usize>,
    #[serde(default, deserialize_with = "lenient_optional_flag")]
    pub chunks_sent: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

fn lenient_content<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_text(deserializer)?.unwrap_or_default())
}

fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(n) => n.as_f64().map(|v| v.abs() > 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(truthy(&Value::deserialize(deserializer)?).unwrap_or(false))
}

fn lenient_optional_flag<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<bool>, D::Error> {
    Ok(truthy(&Value::deserialize(deserializer)?))
}

/// Non-negative integers, also when sent as strings. Anything else is `None`.
fn lenient_count<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let count = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(count.and_then(|c| T::try_from(c).ok()))
}

fn lenient_metadata<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<CompletionMetadata>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        object @ Value::Object(_) => serde_json::from_value(object).ok(),
        _ => None,
    })
}
