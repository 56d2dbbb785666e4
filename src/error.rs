use std::path::PathBuf;
use thiserror::Error;

/// Reasons a recipe leaves the state machine without being classified.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("read recipe definition {}: {source}", path.display())]
    Definition {
        path: PathBuf,
        #[source]
        source: plist::Error,
    },

    #[error("prepare report file {}: {source}", path.display())]
    ReportFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("update-trust-info failed for {identifier}: {detail}")]
    TrustRepair { identifier: String, detail: String },
}
