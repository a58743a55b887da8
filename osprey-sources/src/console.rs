//! Console emitter: logs each alert as pretty JSON

use async_trait::async_trait;
use osprey_core::Alert;
use tracing::info;

use crate::{Emitter, SourceError};

/// Logs the alert as pretty-printed JSON
#[derive(Debug, Default)]
pub struct ConsoleEmitter;

#[async_trait]
impl Emitter for ConsoleEmitter {
    fn name(&self) -> &str {
        "console"
    }

    async fn emit(&self, alert: &Alert) -> Result<(), SourceError> {
        let json =
            serde_json::to_string_pretty(alert).map_err(|e| SourceError::Parse(e.to_string()))?;
        info!(
            "Alert '{}' ({} artifacts from {}):\n{}",
            alert.title,
            alert.artifact_count(),
            alert.source,
            json
        );
        Ok(())
    }
}
