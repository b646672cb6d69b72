// Turns the wire message stream into raw document content and a lifecycle

use serde::{Deserialize, Serialize};

use crate::protocol::{CompletionMetadata, WireMessage};

pub const DEFAULT_GENERATION_ERROR: &str = "An error occurred during generation";

/// Logical state of one generation request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    #[default]
    Idle,
    Generating,
    Succeeded,
    Failed,
}

impl Lifecycle {
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// How `chunk` frames reach the raw content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkMode {
    /// Every chunk is appended as soon as it arrives.
    #[default]
    Incremental,
    /// Chunks are staged and flattened once the `is_last` chunk arrives.
    Combined,
}

/// What the render pipeline has to do after a message was reduced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEffect {
    Reset,
    Append(String),
    Replace(String),
}

#[derive(Debug, Default)]
pub struct Reassembler {
    mode: ChunkMode,
    raw: String,
    staged: Vec<String>,
    lifecycle: Lifecycle,
    error: Option<String>,
    status: Option<String>,
    metadata: Option<CompletionMetadata>,
}

impl Reassembler {
    pub fn new(mode: ChunkMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub const fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Latest human readable status from `start` or `complete`.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub const fn metadata(&self) -> Option<&CompletionMetadata> {
        self.metadata.as_ref()
    }

    /// Reduce one message. Returns the change the renderer must mirror, if any.
    ///
    /// `content` replaces the body but does not end generation; only
    /// `complete` and `error` do. A `complete` outside of a running
    /// generation is ignored, so it never overturns a failure.
    pub fn apply(&mut self, message: &WireMessage) -> Option<RenderEffect> {
        match message {
            WireMessage::Start { message } => {
                self.raw.clear();
                self.staged.clear();
                self.lifecycle = Lifecycle::Generating;
                self.error = None;
                self.metadata = None;
                self.status.clone_from(message);
                Some(RenderEffect::Reset)
            }
            WireMessage::Chunk {
                content, is_last, ..
            } => {
                self.lifecycle = Lifecycle::Generating;
                match self.mode {
                    ChunkMode::Incremental => self.append(content),
                    ChunkMode::Combined => {
                        self.staged.push(content.clone());
                        if *is_last {
                            self.flush_staged()
                        } else {
                            None
                        }
                    }
                }
            }
            WireMessage::Content { content, .. } => {
                self.lifecycle = Lifecycle::Generating;
                self.staged.clear();
                self.raw.clone_from(content);
                Some(RenderEffect::Replace(content.clone()))
            }
            WireMessage::Complete { .. } if self.lifecycle != Lifecycle::Generating => None,
            WireMessage::Complete { message, metadata } => {
                let effect = self.flush_staged();
                self.lifecycle = Lifecycle::Succeeded;
                self.status.clone_from(message);
                self.metadata.clone_from(metadata);
                effect
            }
            WireMessage::Error { error } => {
                self.lifecycle = Lifecycle::Failed;
                self.error = Some(
                    error
                        .clone()
                        .unwrap_or_else(|| DEFAULT_GENERATION_ERROR.to_string()),
                );
                None
            }
        }
    }

    fn append(&mut self, content: &str) -> Option<RenderEffect> {
        if content.is_empty() {
            return None;
        }
        self.raw.push_str(content);
        Some(RenderEffect::Append(content.to_string()))
    }

    fn flush_staged(&mut self) -> Option<RenderEffect> {
        if self.staged.is_empty() {
            return None;
        }
        let combined = self.staged.concat();
        self.staged.clear();
        self.append(&combined)
    }
}
