//! Per-request deadline and cancellation signal.

use std::future::{Future, pending};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("canceled")]
    Canceled,
}

/// Deadline and cancellation carried by one caller.
///
/// Only the work actually performed on behalf of the caller (the repository
/// fetch) is raced against this context; cache lookups are not.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Fires the cancellation signal of the context it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Convert into a guard that cancels when dropped.
    pub fn cancel_on_drop(self) -> CancelOnDrop {
        CancelOnDrop { handle: self }
    }
}

/// Cancels its context when dropped, e.g. when a client disconnects and the
/// handler future is discarded.
#[derive(Debug)]
pub struct CancelOnDrop {
    handle: CancelHandle,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

impl RequestContext {
    /// A context that never expires and cannot be canceled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::background(),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// Attach a cancellation signal, returning the handle that fires it.
    pub fn cancellable(mut self) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        self.cancel = Some(receiver);
        (self, CancelHandle { sender })
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|receiver| *receiver.borrow())
    }

    /// Drive `work` until it finishes, the deadline passes, or the context is canceled.
    pub async fn run<F>(&self, work: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        let deadline = self.deadline;
        let mut cancel = self.cancel.clone();

        let expired = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => pending::<()>().await,
            }
        };

        let canceled = async move {
            match cancel.as_mut() {
                Some(receiver) => {
                    // A dropped handle can no longer cancel.
                    if receiver.wait_for(|canceled| *canceled).await.is_err() {
                        pending::<()>().await;
                    }
                }
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = canceled => Err(ContextError::Canceled),
            _ = expired => Err(ContextError::DeadlineExceeded),
            output = work => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_context_runs_to_completion() {
        let ctx = RequestContext::background();
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn deadline_interrupts_slow_work() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(20));
        let result = ctx
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert_eq!(result, Err(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn unrepresentable_timeout_means_no_deadline() {
        let ctx = RequestContext::with_timeout(Duration::MAX);
        assert_eq!(ctx.run(async { 3 }).await, Ok(3));
    }

    #[tokio::test]
    async fn cancel_handle_interrupts_work() {
        let (ctx, handle) = RequestContext::background().cancellable();
        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.run(pending::<()>()).await })
        };
        handle.cancel();
        assert_eq!(task.await.expect("task joins"), Err(ContextError::Canceled));
        assert!(ctx.is_canceled());
    }

    #[tokio::test]
    async fn drop_guard_cancels_its_context() {
        let (ctx, handle) = RequestContext::background().cancellable();
        let guard = handle.cancel_on_drop();
        assert!(!ctx.is_canceled());
        drop(guard);
        assert!(ctx.is_canceled());
        assert_eq!(ctx.run(pending::<()>()).await, Err(ContextError::Canceled));
    }

    #[tokio::test]
    async fn dropped_handle_does_not_cancel() {
        let (ctx, handle) = RequestContext::background().cancellable();
        drop(handle);
        assert_eq!(ctx.run(async { "done" }).await, Ok("done"));
    }
}
