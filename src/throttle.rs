//! Concurrency bound for render operations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::Error;

/// Admits at most `limit` captures at a time; excess callers wait in FIFO
/// order on the semaphore.
#[derive(Debug, Clone)]
pub struct CaptureThrottle {
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    limit: usize,
}

/// RAII guard for one capture slot. Dropping it frees the slot.
pub struct CapturePermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for CapturePermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePermit").finish()
    }
}

impl Drop for CapturePermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CaptureThrottle {
    /// Create a throttle admitting `limit` concurrent captures.
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<CapturePermit, Error> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::BrowserUnavailable("capture throttle closed".to_string()))?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Capture slot acquired ({}/{})", now, self.limit);
        Ok(CapturePermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Captures currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Stop admitting captures; pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.semaphore.close();
    }
}
