//! Streamed agent output accumulator.

/// Ordered output fragments for one conversation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutputAccumulator {
    fragments: Vec<String>,
}

impl OutputAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment in arrival order.
    pub fn push(&mut self, fragment: impl Into<String>) {
        self.fragments.push(fragment.into());
    }

    /// Number of fragments received, including empty ones.
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Whether the accumulated text is empty.
    ///
    /// Fragments with empty text add nothing, so an accumulator holding only
    /// those is still empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.iter().all(String::is_empty)
    }

    /// Concatenate all fragments with no separator.
    #[must_use]
    pub fn concat(&self) -> String {
        self.fragments.concat()
    }
}
