// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::retries::RetryPolicy;

/// # Worker options
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case")]
#[serde(default)]
#[builder(default)]
pub struct WorkerOptions {
    /// # Internal queue for processor communication
    ///
    /// Capacity of the channels between the runtime handles, the processor and the invoker.
    pub internal_queue_length: usize,

    pub invoker: InvokerOptions,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            internal_queue_length: 64,
            invoker: Default::default(),
        }
    }
}

/// # Invoker options
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[builder(default)]
#[serde(rename_all = "kebab-case")]
#[serde(default)]
pub struct InvokerOptions {
    /// # Retry policy
    ///
    /// Retry policy to use when a handler crashes. Failures returned by a handler or recorded
    /// by a step are never retried.
    pub retry_policy: RetryPolicy,

    /// # Limit number of concurrent invocations
    ///
    /// Number of concurrent handler executions across all keys. Unlimited if unset.
    pub concurrent_invocations_limit: Option<NonZeroUsize>,

    /// # Default awakeable timeout
    ///
    /// Deadline applied to awakeables created without an explicit timeout. Awakeables never
    /// expire if unset.
    ///
    /// Can be configured using the [`humantime`][humantime] format.
    ///
    /// [humantime]: https://docs.rs/humantime/latest/humantime/fn.parse_duration.html
    #[serde_as(as = "Option<serde_with::DisplayFromStr>")]
    pub default_awakeable_timeout: Option<humantime::Duration>,
}

impl Default for InvokerOptions {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::exponential(
                Duration::from_millis(50),
                2.0,
                Some(10),
                Some(Duration::from_secs(10)),
            ),
            concurrent_invocations_limit: None,
            default_awakeable_timeout: None,
        }
    }
}

impl InvokerOptions {
    pub fn default_awakeable_timeout(&self) -> Option<Duration> {
        self.default_awakeable_timeout.map(Into::into)
    }
}
