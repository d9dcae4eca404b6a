// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

pub(crate) mod state_machine;

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use reprise_partition_store::PartitionStore;
use reprise_storage_api::invocation_status_table::{InvocationStatus, ReadInvocationStatusTable};
use reprise_storage_api::{Storage, StorageError, Transaction};
use reprise_timer_queue::TimerQueue;
use reprise_types::errors::NOT_FOUND_INVOCATION_ERROR;
use reprise_types::identifiers::{AwakeableIdentifier, InvocationId};
use reprise_types::invocation::ServiceInvocation;
use reprise_types::journal::CompletionResult;

use self::state_machine::{
    Action, ActionCollector, Command, Error, StateMachine, StateMachineApplyContext, TimerKind,
};
use crate::error::{PurgeError, ResolveError};
use crate::handle::{InvocationResponse, ResolveOutcome};
use crate::invoker::{Effect, Invoker};

/// Requests sent by [`crate::RuntimeHandle`]s to the processor.
pub(crate) enum Request {
    Invoke {
        service_invocation: ServiceInvocation,
        response: ResponseSink,
    },
    Attach {
        invocation_id: InvocationId,
        response_tx: oneshot::Sender<InvocationResponse>,
    },
    CompleteAwakeable {
        awakeable_id: AwakeableIdentifier,
        result: CompletionResult,
        response_tx: oneshot::Sender<Result<ResolveOutcome, ResolveError>>,
    },
    Purge {
        invocation_id: InvocationId,
        response_tx: oneshot::Sender<Result<(), PurgeError>>,
    },
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Invoke {
                service_invocation, ..
            } => write!(f, "Invoke({})", service_invocation.invocation_id),
            Request::Attach { invocation_id, .. } => write!(f, "Attach({invocation_id})"),
            Request::CompleteAwakeable { awakeable_id, .. } => {
                write!(f, "CompleteAwakeable({awakeable_id})")
            }
            Request::Purge { invocation_id, .. } => write!(f, "Purge({invocation_id})"),
        }
    }
}

pub(crate) enum ResponseSink {
    /// Notified once the invocation is durably accepted.
    Submitted(oneshot::Sender<()>),
    /// Notified with the outcome of the invocation, or with its suspension if
    /// `notify_suspension` is set.
    Outcome {
        response_tx: oneshot::Sender<InvocationResponse>,
        notify_suspension: bool,
    },
}

struct Waiter {
    response_tx: oneshot::Sender<InvocationResponse>,
    notify_suspension: bool,
}

/// Owns the lifecycle of every invocation. Requests, attempt effects and timers are applied one
/// at a time, each in its own storage transaction; actions run after the commit.
pub(crate) struct PartitionProcessor {
    storage: PartitionStore,
    state_machine: StateMachine,
    invoker: Invoker,
    requests_rx: mpsc::Receiver<Request>,
    effects_rx: mpsc::Receiver<Effect>,
    timer_queue: TimerQueue<TimerKind>,
    waiters: HashMap<InvocationId, Vec<Waiter>>,
}

impl PartitionProcessor {
    pub(crate) fn new(
        storage: PartitionStore,
        state_machine: StateMachine,
        invoker: Invoker,
        requests_rx: mpsc::Receiver<Request>,
        effects_rx: mpsc::Receiver<Effect>,
    ) -> Self {
        Self {
            storage,
            state_machine,
            invoker,
            requests_rx,
            effects_rx,
            timer_queue: TimerQueue::new(),
            waiters: HashMap::new(),
        }
    }

    pub(crate) async fn recover(&mut self) -> Result<(), StorageError> {
        let mut txn = self.storage.transaction().await;
        let mut actions = ActionCollector::new();
        self.state_machine
            .recover(&mut StateMachineApplyContext::new(&mut txn, &mut actions))
            .await
            .map_err(|Error::Storage(err)| err)?;
        txn.commit().await?;

        info!(recovered_actions = actions.len(), "Recovered partition state");
        self.perform_actions(actions);
        Ok(())
    }

    pub(crate) async fn run(mut self, cancellation: CancellationToken) -> anyhow::Result<()> {
        debug!("Starting partition processor");
        let result = self.run_loop(cancellation).await;
        self.invoker.shutdown().await;
        debug!("Partition processor stopped");
        result
    }

    async fn run_loop(&mut self, cancellation: CancellationToken) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => return Ok(()),
                Some(effect) = self.effects_rx.recv() => {
                    trace!(?effect, "Received effect");
                    self.apply(Command::InvokerEffect(effect)).await?;
                }
                timer = self.timer_queue.await_timer() => {
                    self.apply(Command::Timer(timer.into_inner())).await?;
                }
                request = self.requests_rx.recv() => match request {
                    Some(request) => {
                        trace!(?request, "Received request");
                        self.on_request(request).await?;
                    }
                    // every handle is gone
                    None => return Ok(()),
                },
                _ = self.invoker.join_next() => {}
            }
        }
    }

    async fn on_request(&mut self, request: Request) -> Result<(), Error> {
        match request {
            Request::Invoke {
                service_invocation,
                response,
            } => {
                let invocation_id = service_invocation.invocation_id;
                let submitted_tx = match response {
                    ResponseSink::Submitted(tx) => Some(tx),
                    ResponseSink::Outcome {
                        response_tx,
                        notify_suspension,
                    } => {
                        self.add_waiter(invocation_id, response_tx, notify_suspension);
                        None
                    }
                };
                self.apply(Command::Invoke(service_invocation)).await?;
                if let Some(tx) = submitted_tx {
                    let _ = tx.send(());
                }
            }
            Request::Attach {
                invocation_id,
                response_tx,
            } => {
                let status = {
                    let mut txn = self.storage.transaction().await;
                    txn.get_invocation_status(&invocation_id).await?
                };
                match status {
                    InvocationStatus::Completed(completed) => {
                        let _ = response_tx.send(completed.response_result.into());
                    }
                    InvocationStatus::Free => {
                        let _ = response_tx
                            .send(InvocationResponse::Failed(NOT_FOUND_INVOCATION_ERROR));
                    }
                    _ => self.add_waiter(invocation_id, response_tx, false),
                }
            }
            Request::CompleteAwakeable {
                awakeable_id,
                result,
                response_tx,
            } => {
                let mut txn = self.storage.transaction().await;
                let mut actions = ActionCollector::new();
                let outcome = self
                    .state_machine
                    .complete_awakeable(
                        &mut StateMachineApplyContext::new(&mut txn, &mut actions),
                        awakeable_id,
                        result,
                    )
                    .await?;
                txn.commit().await?;
                self.perform_actions(actions);
                let _ = response_tx.send(outcome);
            }
            Request::Purge {
                invocation_id,
                response_tx,
            } => {
                let mut txn = self.storage.transaction().await;
                let mut actions = ActionCollector::new();
                let outcome = self
                    .state_machine
                    .purge_invocation(
                        &mut StateMachineApplyContext::new(&mut txn, &mut actions),
                        invocation_id,
                    )
                    .await?;
                txn.commit().await?;
                self.perform_actions(actions);
                let _ = response_tx.send(outcome);
            }
        }
        Ok(())
    }

    async fn apply(&mut self, command: Command) -> Result<(), Error> {
        let mut txn = self.storage.transaction().await;
        let mut actions = ActionCollector::new();
        self.state_machine
            .apply(
                &mut StateMachineApplyContext::new(&mut txn, &mut actions),
                command,
            )
            .await?;
        txn.commit().await?;
        self.perform_actions(actions);
        Ok(())
    }

    fn perform_actions(&mut self, actions: ActionCollector) {
        for action in actions {
            match action {
                Action::Invoke {
                    invocation_id,
                    invocation_epoch,
                    invocation_target,
                    argument,
                } => self.invoker.invoke(
                    invocation_id,
                    invocation_epoch,
                    invocation_target,
                    argument,
                ),
                Action::RegisterTimer {
                    wake_up_time,
                    timer,
                } => {
                    trace!(%wake_up_time, ?timer, "Registering timer");
                    self.timer_queue.sleep_until(wake_up_time, timer);
                }
                Action::DeleteTimer(timer) => {
                    trace!(?timer, "Deleting timer");
                    self.timer_queue.remove_if(|registered| *registered == timer);
                }
                Action::IngressResponse {
                    invocation_id,
                    result,
                } => {
                    for waiter in self.waiters.remove(&invocation_id).unwrap_or_default() {
                        let _ = waiter.response_tx.send(result.clone().into());
                    }
                }
                Action::IngressSuspended {
                    invocation_id,
                    awaiting,
                } => {
                    let Some(waiters) = self.waiters.remove(&invocation_id) else {
                        continue;
                    };
                    let (notified, remaining): (Vec<_>, Vec<_>) =
                        waiters.into_iter().partition(|w| w.notify_suspension);
                    for waiter in notified {
                        let _ = waiter.response_tx.send(InvocationResponse::Suspended {
                            invocation_id,
                            awaiting: awaiting.clone(),
                        });
                    }
                    if !remaining.is_empty() {
                        self.waiters.insert(invocation_id, remaining);
                    }
                }
            }
        }
    }

    fn add_waiter(
        &mut self,
        invocation_id: InvocationId,
        response_tx: oneshot::Sender<InvocationResponse>,
        notify_suspension: bool,
    ) {
        self.waiters.entry(invocation_id).or_default().push(Waiter {
            response_tx,
            notify_suspension,
        });
    }
}
