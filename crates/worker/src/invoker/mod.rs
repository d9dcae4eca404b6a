// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Runs handler attempts.
//!
//! Every attempt is an independent task. It loads the journal, replays and then executes the
//! handler, and reports how it ended as an [`Effect`]. Attempts never touch the lifecycle state
//! of an invocation: that is left to the state machine consuming the effects.

mod invocation_task;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{Instrument, error, trace};

use reprise_partition_store::PartitionStore;
use reprise_tracing_instrumentation::info_invocation_span;
use reprise_types::config::InvokerOptions;
use reprise_types::errors::InvocationError;
use reprise_types::identifiers::{CommandIndex, InvocationId};
use reprise_types::invocation::InvocationTarget;

use self::invocation_task::InvocationTask;
use crate::service::ServiceRegistry;

/// Outcome of one attempt, tagged with the epoch it was dispatched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effect {
    pub invocation_id: InvocationId,
    pub invocation_epoch: u32,
    pub kind: EffectKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectKind {
    /// The attempt awaited awakeables that are not completed.
    Suspended {
        waiting_for_awakeables: BTreeSet<CommandIndex>,
    },
    End(Bytes),
    Failed {
        error: InvocationError,
        retryable: bool,
    },
}

pub(crate) struct Invoker {
    registry: Arc<ServiceRegistry>,
    storage: PartitionStore,
    effects_tx: mpsc::Sender<Effect>,
    concurrency_limit: Option<Arc<Semaphore>>,
    default_awakeable_timeout: Option<Duration>,
    tasks: JoinSet<()>,
}

impl Invoker {
    pub(crate) fn new(
        options: &InvokerOptions,
        registry: ServiceRegistry,
        storage: PartitionStore,
        effects_tx: mpsc::Sender<Effect>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            storage,
            effects_tx,
            concurrency_limit: options
                .concurrent_invocations_limit
                .map(|limit| Arc::new(Semaphore::new(limit.get()))),
            default_awakeable_timeout: options.default_awakeable_timeout(),
            tasks: JoinSet::new(),
        }
    }

    pub(crate) fn invoke(
        &mut self,
        invocation_id: InvocationId,
        invocation_epoch: u32,
        invocation_target: InvocationTarget,
        argument: Bytes,
    ) {
        trace!(%invocation_id, invocation_epoch, "Spawning invocation task");
        let span = info_invocation_span!(
            id = invocation_id,
            target = invocation_target,
            reprise.invocation.epoch = invocation_epoch
        );
        let task = InvocationTask {
            invocation_id,
            invocation_epoch,
            invocation_target,
            argument,
            registry: Arc::clone(&self.registry),
            storage: self.storage.clone(),
            effects_tx: self.effects_tx.clone(),
            concurrency_limit: self.concurrency_limit.clone(),
            default_awakeable_timeout: self.default_awakeable_timeout,
        };
        self.tasks.spawn(task.run().instrument(span));
    }

    /// Reaps finished tasks. Pending while no task is running.
    pub(crate) async fn join_next(&mut self) {
        if self.tasks.is_empty() {
            std::future::pending::<()>().await;
        }
        if let Some(Err(err)) = self.tasks.join_next().await {
            if err.is_panic() {
                error!("Invocation task panicked outside of the handler: {err}");
            }
        }
    }

    /// Aborts every running attempt and waits for them to be dropped.
    pub(crate) async fn shutdown(&mut self) {
        self.tasks.shutdown().await;
    }
}
