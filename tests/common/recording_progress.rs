use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use changefeed_core::handler::ProgressHandler;
use changefeed_core::position::ChangefeedPosition;

/// One delivered progress window
#[derive(Debug, Clone)]
pub struct ProgressCall {
    pub outputs: Vec<u32>,
    pub position: ChangefeedPosition,
    pub at: Instant,
}

/// Progress handler that keeps every window it receives
///
/// Clones share the same record, so a test keeps one clone and hands the
/// other to the processor.
#[derive(Debug, Clone, Default)]
pub struct RecordingProgress {
    calls: Arc<Mutex<Vec<ProgressCall>>>,
    fail_with: Option<String>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the call, then fail it
    pub fn failing(message: &str) -> Self {
        Self {
            calls: Arc::default(),
            fail_with: Some(message.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<ProgressCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn all_outputs(&self) -> Vec<u32> {
        self.calls
            .lock()
            .iter()
            .flat_map(|call| call.outputs.iter().copied())
            .collect()
    }

    pub fn last_position(&self) -> Option<ChangefeedPosition> {
        self.calls.lock().last().map(|call| call.position.clone())
    }
}

#[async_trait]
impl ProgressHandler<u32> for RecordingProgress {
    async fn on_progress(
        &self,
        outputs: Vec<u32>,
        position: ChangefeedPosition,
    ) -> anyhow::Result<()> {
        self.calls.lock().push(ProgressCall {
            outputs,
            position,
            at: Instant::now(),
        });

        match &self.fail_with {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }
}
