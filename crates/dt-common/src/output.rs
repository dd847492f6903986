//! Output format specifications.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Supported output formats for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed JSON document
    #[default]
    Json,

    /// One JSON object per line (poll ticks, progress events)
    Jsonl,

    /// Label/value rows grouped by category
    Summary,
}

impl OutputFormat {
    /// Whether this format streams one record per line.
    pub fn is_streaming(self) -> bool {
        matches!(self, OutputFormat::Jsonl)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Jsonl => write!(f, "jsonl"),
            OutputFormat::Summary => write!(f, "summary"),
        }
    }
}
