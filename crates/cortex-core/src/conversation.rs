use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CortexError, Result};
use crate::traits::ConversationLog;

/// One line of a conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// In-memory conversation transcript.
#[derive(Default)]
pub struct MemoryConversationLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConversationLog for MemoryConversationLog {
    fn append(&self, sender: &str, text: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CortexError::ConversationLog("log mutex poisoned".into()))?;
        entries.push(LogEntry {
            sender: sender.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn history(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_history() {
        let log = MemoryConversationLog::new();
        assert!(log.is_empty());
        log.append("user", "hi").unwrap();
        log.append("assistant", "hello").unwrap();

        let history = log.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].sender, "assistant");
        assert_eq!(history[0].text, "hi");
    }
}
