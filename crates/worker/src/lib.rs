// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Durable execution of keyed virtual objects.
//!
//! A [`Runtime`] runs the handlers registered in a [`ServiceRegistry`] on top of a
//! [`PartitionStore`]. Handlers get an [`ObjectContext`] whose durable calls are journaled, so
//! that an invocation interrupted by a crash, a restart or a suspension on an [`Awakeable`]
//! continues where it left off by replaying its journal.

mod context;
mod error;
mod handle;
mod invoker;
mod partition;
mod service;
mod tool;

pub use context::{Awakeable, ObjectContext};
pub use error::*;
pub use handle::*;
pub use service::{ServiceRegistry, VirtualObject};
pub use tool::{FnTool, Tool, ToolContext, ToolRegistry};

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span};

use reprise_partition_store::PartitionStore;
use reprise_types::config::{Configuration, InvalidConfigurationError, WorkerOptions};

use crate::invoker::Invoker;
use crate::partition::PartitionProcessor;
use crate::partition::state_machine::StateMachine;

/// A running runtime. Dropping it leaves the processor running until every
/// [`RuntimeHandle`] is dropped; use [`Runtime::shutdown`] to stop it.
pub struct Runtime {
    handle: RuntimeHandle,
    cancellation: CancellationToken,
    processor: JoinHandle<anyhow::Result<()>>,
}

impl Runtime {
    /// Recovers the state persisted in `storage` and starts processing.
    pub async fn start(
        options: &WorkerOptions,
        storage: PartitionStore,
        registry: ServiceRegistry,
    ) -> Result<Self, BuildError> {
        if options.internal_queue_length == 0 {
            return Err(InvalidConfigurationError::ZeroQueueLength.into());
        }

        let (requests_tx, requests_rx) = mpsc::channel(options.internal_queue_length);
        let (effects_tx, effects_rx) = mpsc::channel(options.internal_queue_length);
        let invoker = Invoker::new(&options.invoker, registry, storage.clone(), effects_tx);
        let mut processor = PartitionProcessor::new(
            storage.clone(),
            StateMachine::new(options.invoker.retry_policy.clone()),
            invoker,
            requests_rx,
            effects_rx,
        );
        processor.recover().await?;

        let cancellation = CancellationToken::new();
        let processor = tokio::spawn(
            processor
                .run(cancellation.clone())
                .instrument(info_span!("partition-processor")),
        );
        info!(persistent = storage.path().is_some(), "Runtime started");

        Ok(Self {
            handle: RuntimeHandle::new(requests_tx, storage),
            cancellation,
            processor,
        })
    }

    /// Opens the store configured in `configuration` (in memory if no path is set) and starts.
    pub async fn start_with_configuration(
        configuration: &Configuration,
        registry: ServiceRegistry,
    ) -> Result<Self, BuildError> {
        configuration.validate()?;
        let storage = match &configuration.storage.path {
            Some(path) => PartitionStore::open(path)?,
            None => PartitionStore::in_memory(),
        };
        Self::start(&configuration.worker, storage, registry).await
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Stops processing. Running attempts are cancelled; their invocations are dispatched again
    /// on the next start.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.cancellation.cancel();
        let result = self
            .processor
            .await
            .context("partition processor panicked")?;
        info!("Runtime stopped");
        result
    }

    /// Kills the runtime without letting it stop in an orderly fashion, the way a crash would.
    /// Only what was committed to the store survives.
    pub async fn abort(self) {
        self.processor.abort();
        let _ = self.processor.await;
    }
}
