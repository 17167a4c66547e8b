//! Poll-based event source for the `run` command.
//!
//! Reads the watched resource on a fixed interval and turns successive
//! observations into watch events. The controller's predicate decides which
//! of them matter.

use std::sync::Arc;
use std::time::Duration;

use revwatch_core::cluster::SourceReader;
use revwatch_core::predicate::WatchEvent;
use revwatch_core::types::{ObjectRef, WatchedResource};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct PollingSource {
    reader: Arc<dyn SourceReader>,
    object: ObjectRef,
    interval: Duration,
}

impl PollingSource {
    pub fn new(reader: Arc<dyn SourceReader>, object: ObjectRef, interval: Duration) -> Self {
        Self {
            reader,
            object,
            interval,
        }
    }

    /// Poll until cancelled or the receiver goes away.
    pub async fn run(self, events: mpsc::Sender<WatchEvent>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<WatchedResource> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let current = match self.reader.get_source(&self.object).await {
                Ok(current) => current,
                Err(err) => {
                    warn!(object = %self.object, error = %err, "failed to read watched resource");
                    continue;
                }
            };

            if let Some(event) = observe(last.as_ref(), current.as_ref()) {
                debug!(object = %self.object, "observed watched resource");
                if events.send(event).await.is_err() {
                    break;
                }
            }
            last = current;
        }
    }
}

/// Event for the transition between two observations.
fn observe(
    previous: Option<&WatchedResource>,
    current: Option<&WatchedResource>,
) -> Option<WatchEvent> {
    match (previous, current) {
        (None, Some(current)) => Some(WatchEvent::Created(current.clone())),
        (Some(previous), Some(current)) => Some(WatchEvent::Updated {
            old: Some(previous.clone()),
            new: current.clone(),
        }),
        (Some(previous), None) => Some(WatchEvent::Deleted(previous.clone())),
        (None, None) => None,
    }
}
