//! Output collection.
//!
//! Chunks arrive in order, one per wait, and are only ever appended.

/// Ordered, append-only record of everything the child printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    chunks: Vec<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk. Empty chunks are skipped.
    pub fn push(&mut self, chunk: impl Into<String>) {
        let chunk = chunk.into();
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    /// Concatenate the chunks into the final output string.
    pub fn into_output(self) -> String {
        self.chunks.concat()
    }
}
