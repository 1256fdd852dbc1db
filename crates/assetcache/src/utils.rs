use tokio::task::AbortHandle;

/// Guard that aborts a spawned task when dropped.
///
/// Download tasks are owned by their in-flight index entry through this
/// guard: dropping the entry (and with it the cache) cancels the download,
/// unless the task already finished and disarmed the guard.
pub struct AbortOnDrop(Option<AbortHandle>);

impl AbortOnDrop {
    pub fn new(handle: AbortHandle) -> Self {
        Self(Some(handle))
    }

    /// Defuses the guard so the task is left running.
    pub fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}
