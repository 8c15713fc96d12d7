//! Cancellable Flows
//!
//! A flow is a multi-step asynchronous computation whose suspension points
//! are explicit [`Flow::step`] calls. Each step checks the flow's
//! cancellation token before suspending, races the sub-operation against
//! cancellation, and checks again once the sub-operation has produced a
//! value. A cancelled flow therefore never observes a stale result.
//!
//! Inside a handler, [`Context::flow`](crate::Context::flow) returns the flow
//! bound to the message being processed; the scheduler cancels it when a
//! newer message of the same preemptible type arrives. Outside actors,
//! [`Flow::spawn`] drives a flow on its own task and hands back a
//! cancellable [`FlowHandle`].
//!
//! Cancellation is cooperative: it only takes effect at a step boundary and
//! never aborts external work the sub-operation may have started.

use crate::error::{ActorError, Result};
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cancellation-aware driver for one computation
#[derive(Debug, Clone)]
pub struct Flow {
    label: String,
    token: CancellationToken,
}

impl Flow {
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_token(label, CancellationToken::new())
    }

    pub(crate) fn with_token(label: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            label: label.into(),
            token,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail with `Cancelled` if the flow has been superseded
    pub fn ensure_active(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(ActorError::cancelled(self.label.clone()))
        } else {
            Ok(())
        }
    }

    /// Suspend on `operation`, resuming only if the flow is still active
    pub async fn step<F>(&self, operation: F) -> Result<F::Output>
    where
        F: Future,
    {
        self.ensure_active()?;

        tokio::select! {
            biased;

            _ = self.token.cancelled() => {
                debug!(flow = %self.label, "Flow cancelled while suspended");
                Err(ActorError::cancelled(self.label.clone()))
            }
            output = operation => {
                // the sub-operation may finish after a newer flow took over
                self.ensure_active()?;
                Ok(output)
            }
        }
    }

    /// Run the flow's final side effect unless it has been cancelled
    pub fn finish<R>(&self, effect: impl FnOnce() -> R) -> Result<R> {
        self.ensure_active()?;
        Ok(effect())
    }

    /// Drive `body` on its own task, returning a handle that can cancel it
    pub fn spawn<T, F, Fut>(label: impl Into<String>, body: F) -> FlowHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(Flow) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let flow = Flow::new(label);
        let task = tokio::spawn(body(flow.clone()));
        FlowHandle { flow, task }
    }
}

/// Externally cancellable, awaitable flow
#[derive(Debug)]
pub struct FlowHandle<T> {
    flow: Flow,
    task: JoinHandle<Result<T>>,
}

impl<T> FlowHandle<T> {
    pub fn cancel(&self) {
        debug!(flow = %self.flow.label, "Cancelling flow");
        self.flow.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flow.is_cancelled()
    }

    /// Wait for the flow to finish or observe its cancellation
    pub async fn join(self) -> Result<T> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ActorError::handler(
                self.flow.label.clone(),
                format!("flow task failed: {}", e),
            )),
        }
    }
}
