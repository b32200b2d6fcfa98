//! The background loop that owns the transport queues and pump tasks.

use std::future::Future;
use std::io;
use std::thread;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Handle used to spawn work onto the owning loop from any thread.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    handle: tokio::runtime::Handle,
}

impl LoopHandle {
    /// Wrap the runtime the caller is currently running on.
    ///
    /// Panics outside a tokio runtime; use [`LoopHandle::try_current`] to probe.
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }

    pub fn try_current() -> Option<Self> {
        tokio::runtime::Handle::try_current()
            .ok()
            .map(|handle| Self { handle })
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}

impl From<tokio::runtime::Handle> for LoopHandle {
    fn from(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

/// A single-threaded tokio runtime on a dedicated thread.
///
/// For hosts that are not async themselves. Dropping it stops the loop;
/// tasks still pending at that point are dropped with the runtime.
pub struct BackgroundLoop {
    handle: LoopHandle,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl BackgroundLoop {
    pub fn start() -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let handle = LoopHandle::from(runtime.handle().clone());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("tracesync-loop".to_string())
            .spawn(move || {
                runtime.block_on(async {
                    let _ = stop_rx.await;
                });
                tracing::debug!("background loop stopped");
            })?;

        Ok(Self {
            handle,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }
}

impl Drop for BackgroundLoop {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("background loop thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for BackgroundLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundLoop")
            .field("running", &self.stop.is_some())
            .finish()
    }
}
