//! Per-child invocation wrapper and per-call merge state.
//!
//! Each command call creates one [`Execution`] holding the merged outcome,
//! and one [`Invocation`] per child it reaches. An invocation races the
//! child's reply against a timer; whichever finishes first delivers, and
//! the other one finds the delivered guard already set and is dropped.

use futures::FutureExt;
use multiredis_common::{CommandKind, FanoutError, Result, Value};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::connection::ChildConnection;

/// Outcome of one child for one command call.
pub type ChildOutcome = Result<Value>;

/// Single-delivery guard around one child's command invocation.
pub struct Invocation {
    child_index: usize,
    delivered: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<ChildOutcome>>>,
    timer: Mutex<Option<AbortHandle>>,
}

impl Invocation {
    /// Creates an invocation and the receiver its outcome is delivered to.
    pub fn new(child_index: usize) -> (Arc<Self>, oneshot::Receiver<ChildOutcome>) {
        let (tx, rx) = oneshot::channel();
        let invocation = Arc::new(Self {
            child_index,
            delivered: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
            timer: Mutex::new(None),
        });
        (invocation, rx)
    }

    /// Sends `command` to `child` and starts the timeout timer.
    ///
    /// Both run as spawned tasks, so the child keeps its request even after
    /// the timer wins; its reply is then discarded. A panic inside the child
    /// is delivered as [`FanoutError::ChildPanicked`].
    pub fn start(
        self: &Arc<Self>,
        child: Arc<dyn ChildConnection>,
        command: Arc<str>,
        args: Arc<[Value]>,
        timeout: Duration,
    ) {
        let timer = {
            let invocation = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if invocation.deliver(Err(FanoutError::Timeout(timeout.as_millis() as u64))) {
                    warn!(
                        "Child {} did not answer within {}ms",
                        invocation.child_index,
                        timeout.as_millis()
                    );
                }
            })
        };
        *self.timer.lock().unwrap_or_else(PoisonError::into_inner) = Some(timer.abort_handle());

        let invocation = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(child.send_command(&command, &args))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(FanoutError::ChildPanicked(panic_message(&*panic))));

            match &outcome {
                Ok(value) => debug!(
                    "Command {} {:?} on {}: {}",
                    command,
                    args,
                    child.name(),
                    value
                ),
                Err(e) => debug!(
                    "Error while running command {} {:?} on {}: {}",
                    command,
                    args,
                    child.name(),
                    e
                ),
            }

            if !invocation.deliver(outcome) {
                debug!(
                    "Discarding late reply from child {} for {}",
                    invocation.child_index, command
                );
            }
        });
    }

    /// Hands `outcome` to the merge step unless something already did.
    ///
    /// Returns false when the guard was already set; the outcome is dropped.
    pub fn deliver(&self, outcome: ChildOutcome) -> bool {
        if self
            .delivered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if let Some(timer) = self.timer.lock().unwrap_or_else(PoisonError::into_inner).take() {
            timer.abort();
        }
        if let Some(tx) = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
            // The receiver is gone once the call settled without this child.
            let _ = tx.send(outcome);
        }
        true
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }

    pub fn child_index(&self) -> usize {
        self.child_index
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Merge state of one command call.
///
/// The first qualifying value is stored in a set-once cell. Until then the
/// last error and the last empty value are kept apart, so an error is never
/// masked by an empty read reply.
pub struct Execution {
    kind: CommandKind,
    winner: OnceLock<Value>,
    last_error: Mutex<Option<FanoutError>>,
    last_empty: Mutex<Option<Value>>,
    invoked: AtomicUsize,
}

impl Execution {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            winner: OnceLock::new(),
            last_error: Mutex::new(None),
            last_empty: Mutex::new(None),
            invoked: AtomicUsize::new(0),
        }
    }

    /// True once a value has been accepted as the call's result.
    pub fn is_settled(&self) -> bool {
        self.winner.get().is_some()
    }

    pub fn mark_invoked(&self) {
        self.invoked.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of children this call was sent to.
    pub fn invoked(&self) -> usize {
        self.invoked.load(Ordering::Relaxed)
    }

    /// Records one child's outcome. Returns true if it settled the call.
    ///
    /// Reads qualify with a non-empty value, writes with any success.
    pub fn record(&self, outcome: ChildOutcome) -> bool {
        match outcome {
            Ok(value) => {
                let qualifies = match self.kind {
                    CommandKind::Read => !value.is_empty(),
                    CommandKind::Write => true,
                };
                if qualifies {
                    return self.winner.set(value).is_ok();
                }
                if !self.is_settled() {
                    *self.last_empty.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
                }
            }
            Err(e) => {
                if !self.is_settled() {
                    *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(e);
                }
            }
        }
        false
    }

    /// Final result: the winning value, else the last error, else the last
    /// empty value.
    pub fn finish(&self) -> Result<Value> {
        if let Some(value) = self.winner.get() {
            return Ok(value.clone());
        }
        if let Some(e) = self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(e);
        }
        self.last_empty
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(FanoutError::NoTargets)
    }
}
