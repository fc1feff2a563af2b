use tokio::task::JoinHandle;

/// Timer handles owned by one room. `epoch` brands every armed task; a task
/// that wakes up under a newer epoch must not act, which covers the window
/// where an aborted task had already finished its sleep.
#[derive(Default)]
pub struct RoomTimers {
    pub epoch: u64,
    pub phase: Option<JoinHandle<()>>,
    pub evidence: Vec<JoinHandle<()>>,
}

impl RoomTimers {
    /// Invalidates and aborts everything currently armed.
    pub fn cancel_all(&mut self) {
        self.epoch += 1;
        if let Some(handle) = self.phase.take() {
            handle.abort();
        }
        for handle in self.evidence.drain(..) {
            handle.abort();
        }
    }
}
