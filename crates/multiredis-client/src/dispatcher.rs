//! Command dispatch: scheduling one call across the children and merging
//! their outcomes.
//!
//! Sequential writes resolve at the first success; the children not yet
//! reached are then sent the command in order from a background task.

use futures::stream::{FuturesUnordered, StreamExt};
use multiredis_common::{CommandKind, CommandTable, FanoutError, Result, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

use crate::connection::ChildConnection;
use crate::invocation::{ChildOutcome, Execution, Invocation};

/// How the children of one call are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// One child at a time, in child order
    Sequential,
    /// Every child at once
    Parallel,
}

/// Execution plan for one command, fixed by its class and `force_parallel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub kind: CommandKind,
    pub schedule: Schedule,
    /// Stop (or stop waiting) once the call is settled
    pub short_circuit: bool,
}

impl Plan {
    pub fn for_kind(kind: CommandKind, force_parallel: bool) -> Self {
        let schedule = if force_parallel {
            Schedule::Parallel
        } else {
            Schedule::Sequential
        };
        Self {
            kind,
            schedule,
            short_circuit: kind == CommandKind::Read,
        }
    }
}

/// Runs commands against every child and merges the outcomes.
pub struct Dispatcher {
    children: Vec<Arc<dyn ChildConnection>>,
    table: CommandTable,
    child_timeout: Duration,
    force_parallel: bool,
}

impl Dispatcher {
    pub fn new(
        children: Vec<Arc<dyn ChildConnection>>,
        table: CommandTable,
        child_timeout: Duration,
        force_parallel: bool,
    ) -> Self {
        Self {
            children,
            table,
            child_timeout,
            force_parallel,
        }
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Looks up the execution plan of `command`.
    ///
    /// # Errors
    ///
    /// `UnknownCommand` when the command is not in the table.
    pub fn plan(&self, command: &str) -> Result<Plan> {
        let kind = self
            .table
            .kind(command)
            .ok_or_else(|| FanoutError::UnknownCommand(command.to_string()))?;
        Ok(Plan::for_kind(kind, self.force_parallel))
    }

    /// Runs `command` on the children and returns the merged outcome.
    ///
    /// The command name is sent to the children lower-cased, whatever case
    /// the caller used.
    pub async fn dispatch(&self, command: &str, args: Vec<Value>) -> Result<Value> {
        let plan = self.plan(command)?;
        let command: Arc<str> = Arc::from(command.to_ascii_lowercase());
        let args: Arc<[Value]> = Arc::from(args);
        let execution = Execution::new(plan.kind);

        match plan.schedule {
            Schedule::Sequential => self.run_sequential(&plan, &execution, &command, &args).await,
            Schedule::Parallel => self.run_parallel(&plan, &execution, &command, &args).await,
        }

        debug!(
            "Command {} settled={} after {}/{} children",
            command,
            execution.is_settled(),
            execution.invoked(),
            self.children.len()
        );
        execution.finish()
    }

    fn launch(
        &self,
        index: usize,
        execution: &Execution,
        command: &Arc<str>,
        args: &Arc<[Value]>,
    ) -> oneshot::Receiver<ChildOutcome> {
        let (invocation, rx) = Invocation::new(index);
        execution.mark_invoked();
        invocation.start(
            Arc::clone(&self.children[index]),
            Arc::clone(command),
            Arc::clone(args),
            self.child_timeout,
        );
        rx
    }

    async fn run_sequential(
        &self,
        plan: &Plan,
        execution: &Execution,
        command: &Arc<str>,
        args: &Arc<[Value]>,
    ) {
        for index in 0..self.children.len() {
            let outcome = receive(self.launch(index, execution, command, args)).await;
            execution.record(outcome);

            if execution.is_settled() {
                if !plan.short_circuit {
                    self.finish_in_background(index + 1, command, args);
                }
                break;
            }
        }
    }

    /// Sends `command` to the children from `from` onward, one after another,
    /// after the caller already has its result. Outcomes are only logged.
    fn finish_in_background(&self, from: usize, command: &Arc<str>, args: &Arc<[Value]>) {
        if from >= self.children.len() {
            return;
        }

        let remaining: Vec<(usize, Arc<dyn ChildConnection>)> = self
            .children
            .iter()
            .enumerate()
            .skip(from)
            .map(|(index, child)| (index, Arc::clone(child)))
            .collect();
        let command = Arc::clone(command);
        let args = Arc::clone(args);
        let timeout = self.child_timeout;

        tokio::spawn(async move {
            for (index, child) in remaining {
                let (invocation, rx) = Invocation::new(index);
                invocation.start(child, Arc::clone(&command), Arc::clone(&args), timeout);
                if let Err(e) = receive(rx).await {
                    debug!("Child {} failed {} after the call settled: {}", index, command, e);
                }
            }
        });
    }

    async fn run_parallel(
        &self,
        plan: &Plan,
        execution: &Execution,
        command: &Arc<str>,
        args: &Arc<[Value]>,
    ) {
        let mut pending: FuturesUnordered<_> = (0..self.children.len())
            .map(|index| receive(self.launch(index, execution, command, args)))
            .collect();

        while let Some(outcome) = pending.next().await {
            if execution.record(outcome) && plan.short_circuit {
                break;
            }
        }
    }
}

/// Waits for an invocation's single delivery.
async fn receive(rx: oneshot::Receiver<ChildOutcome>) -> ChildOutcome {
    rx.await.unwrap_or_else(|_| {
        Err(FanoutError::Connection(
            "child invocation dropped without an outcome".to_string(),
        ))
    })
}
