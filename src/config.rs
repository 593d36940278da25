use serde::{Deserialize, Serialize};

/// Configuration for an editing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of undo steps kept. `None` keeps everything.
    pub history_limit: Option<usize>,
    /// Queue change signals on the document for consumers to drain.
    pub emit_signals: bool,
}

impl EngineConfig {
    /// Parse a config from JSON. Missing keys take their default values.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: Some(100),
            emit_signals: true,
        }
    }
}
