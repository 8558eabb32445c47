use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryItem {
    pub message: String,
    pub error: Option<String>,
}

impl fmt::Display for HistoryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(error) => write!(f, "{}, failed with error: {}", self.message, error),
            None => f.write_str(&self.message),
        }
    }
}

/// Append-only transcript of what the engine tried.
#[derive(Debug, Default, Clone)]
pub struct History {
    items: Vec<HistoryItem>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.items.push(HistoryItem {
            message: message.into(),
            error: None,
        });
    }

    /// Attach `error` to the most recent entry. Callers report at most once
    /// per step; a second report overwrites the first.
    pub fn failed(&mut self, error: impl Into<String>) {
        let error = error.into();
        match self.items.last_mut() {
            Some(item) => item.error = Some(error),
            None => self.items.push(HistoryItem {
                message: String::new(),
                error: Some(error),
            }),
        }
    }

    /// The last `limit` entries rendered in original order, or all of them.
    pub fn messages(&self, limit: Option<usize>) -> Vec<String> {
        let start = match limit {
            Some(limit) => self.items.len().saturating_sub(limit),
            None => 0,
        };
        self.items[start..].iter().map(ToString::to_string).collect()
    }

    pub fn items(&self) -> &[HistoryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
