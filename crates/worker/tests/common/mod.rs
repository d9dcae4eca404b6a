// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

#![allow(dead_code)]

use std::time::Duration;

use reprise_partition_store::PartitionStore;
use reprise_storage_api::invocation_status_table::InvocationStatusDiscriminants;
use reprise_types::config::WorkerOptions;
use reprise_types::identifiers::InvocationId;
use reprise_types::invocation::InvocationTarget;
use reprise_types::retries::RetryPolicy;
use reprise_worker::{Runtime, RuntimeHandle, ServiceRegistry};

pub const SERVICE: &str = "Agent";

pub fn worker_options() -> WorkerOptions {
    let mut options = WorkerOptions::default();
    options.invoker.retry_policy = RetryPolicy::fixed_delay(Duration::from_millis(10), Some(3));
    options
}

pub async fn start(storage: PartitionStore, registry: ServiceRegistry) -> Runtime {
    start_with_options(&worker_options(), storage, registry).await
}

pub async fn start_with_options(
    options: &WorkerOptions,
    storage: PartitionStore,
    registry: ServiceRegistry,
) -> Runtime {
    Runtime::start(options, storage, registry)
        .await
        .expect("runtime must start")
}

pub fn target(key: &str, handler: &str) -> InvocationTarget {
    InvocationTarget::virtual_object(SERVICE, key.to_owned(), handler.to_owned())
}

/// Polls until the invocation reaches `expected`, failing after a few seconds.
pub async fn wait_for_status(
    handle: &RuntimeHandle,
    invocation_id: InvocationId,
    expected: InvocationStatusDiscriminants,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let status = handle
                .get_invocation_status(&invocation_id)
                .await
                .expect("status must be readable");
            if status.discriminant() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("invocation {invocation_id} never reached {expected}"));
}
