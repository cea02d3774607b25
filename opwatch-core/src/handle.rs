//! Control handle for the background polling loop.

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::PollError;

/// Returned by [`PollingService::start`](crate::PollingService::start).
///
/// Dropping the handle also stops the loop.
#[derive(Debug)]
pub struct PollingHandle {
    pub(crate) stop_tx: watch::Sender<bool>,
    pub(crate) task: JoinHandle<()>,
}

impl PollingHandle {
    /// Ask the loop to stop after its current iteration.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// A panic inside the loop itself comes back as
    /// [`PollError::SchedulerFailed`]. Fetches already in flight keep
    /// running to completion on their own tasks.
    pub async fn shutdown(self) -> Result<(), PollError> {
        let _ = self.stop_tx.send(true);
        self.task
            .await
            .map_err(|e| PollError::SchedulerFailed(e.to_string()))
    }
}
