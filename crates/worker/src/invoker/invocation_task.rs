// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, trace, warn};

use reprise_partition_store::PartitionStore;
use reprise_storage_api::Storage;
use reprise_storage_api::journal_table::ReadJournalTable;
use reprise_types::errors::{InvocationError, MaybeRetryableError};
use reprise_types::identifiers::InvocationId;
use reprise_types::invocation::InvocationTarget;

use super::{Effect, EffectKind};
use crate::context::{JournalCursor, ObjectContext, SuspensionSignal};
use crate::service::ServiceRegistry;

pub(super) struct InvocationTask {
    pub(super) invocation_id: InvocationId,
    pub(super) invocation_epoch: u32,
    pub(super) invocation_target: InvocationTarget,
    pub(super) argument: Bytes,
    pub(super) registry: Arc<ServiceRegistry>,
    pub(super) storage: PartitionStore,
    pub(super) effects_tx: mpsc::Sender<Effect>,
    pub(super) concurrency_limit: Option<Arc<Semaphore>>,
    pub(super) default_awakeable_timeout: Option<Duration>,
}

impl InvocationTask {
    pub(super) async fn run(self) {
        let _permit = match &self.concurrency_limit {
            // the semaphore is never closed
            Some(limit) => Arc::clone(limit).acquire_owned().await.ok(),
            None => None,
        };

        let kind = self.run_attempt().await;
        let effect = Effect {
            invocation_id: self.invocation_id,
            invocation_epoch: self.invocation_epoch,
            kind,
        };
        if self.effects_tx.send(effect).await.is_err() {
            trace!("Processor is gone, dropping effect");
        }
    }

    async fn run_attempt(&self) -> EffectKind {
        let journal = {
            let mut txn = self.storage.transaction().await;
            match txn.get_journal(&self.invocation_id).await {
                Ok(journal) => journal,
                Err(err) => {
                    warn!(%err, "Cannot load journal");
                    return EffectKind::Failed {
                        error: InvocationError::internal(err.to_string()),
                        retryable: err.retryable(),
                    };
                }
            }
        };
        let cursor = JournalCursor::new(journal);
        let replaying = cursor.is_replaying();

        let suspension = Arc::new(SuspensionSignal::default());
        let ctx = ObjectContext::new(
            self.invocation_id,
            self.invocation_target.clone(),
            self.storage.clone(),
            cursor,
            Arc::clone(&suspension),
            self.default_awakeable_timeout,
        );
        let handler = match self
            .registry
            .invoke(&self.invocation_target, ctx, self.argument.clone())
        {
            Ok(handler) => handler,
            Err(error) => {
                warn!(%error, "Cannot resolve handler");
                return EffectKind::Failed {
                    error,
                    retryable: false,
                };
            }
        };

        debug!(replaying, "Running handler");
        tokio::select! {
            biased;
            result = AssertUnwindSafe(handler).catch_unwind() => match result {
                Ok(Ok(value)) => {
                    debug!("Handler completed");
                    EffectKind::End(value)
                }
                Ok(Err(err)) => {
                    let retryable = err.retryable();
                    if retryable {
                        warn!(%err, "Handler failed with a retryable error");
                    } else {
                        debug!(%err, "Handler failed");
                    }
                    EffectKind::Failed {
                        error: err.into_invocation_error(),
                        retryable,
                    }
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!(%message, "Handler panicked");
                    EffectKind::Failed {
                        error: InvocationError::internal(format!("handler panicked: {message}")),
                        retryable: true,
                    }
                }
            },
            waiting_for_awakeables = suspension.suspended() => {
                debug!(?waiting_for_awakeables, "Handler suspended");
                EffectKind::Suspended { waiting_for_awakeables }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
