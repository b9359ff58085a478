//! Change cursors
//!
//! A cursor owns the store-side resources of one change feed. Release
//! happens exactly once, whichever of `close()` or drop comes first.

use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use super::change::Change;
use crate::errors::HorizonResult;

/// Runs its release action once
pub struct ReleaseGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ReleaseGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A guard with nothing to release
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Run the release action if it has not run yet
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ReleaseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseGuard")
            .field("released", &self.is_released())
            .finish()
    }
}

/// An open change feed
pub struct ChangeCursor {
    stream: Option<BoxStream<'static, HorizonResult<Change>>>,
    guard: ReleaseGuard,
}

impl ChangeCursor {
    pub fn new(stream: BoxStream<'static, HorizonResult<Change>>, guard: ReleaseGuard) -> Self {
        Self {
            stream: Some(stream),
            guard,
        }
    }

    /// Next change; `None` once the feed ended or the cursor was closed
    pub async fn next(&mut self) -> Option<HorizonResult<Change>> {
        let stream = self.stream.as_mut()?;
        let item = stream.next().await;
        if item.is_none() {
            self.close();
        }
        item
    }

    /// Release the feed. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.stream = None;
        self.guard.release();
    }

    pub fn is_closed(&self) -> bool {
        self.guard.is_released()
    }
}

impl std::fmt::Debug for ChangeCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeCursor")
            .field("closed", &self.is_closed())
            .finish()
    }
}
