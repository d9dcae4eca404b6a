// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

mod common;
mod worker;

pub use common::*;
pub use worker::*;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum InvalidConfigurationError {
    #[error("worker.internal-queue-length must be greater than zero")]
    ZeroQueueLength,
    #[error("storage.path '{0}' points to a directory, expected a file")]
    StoragePathIsDirectory(PathBuf),
}

/// Where the partition store keeps its tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case")]
#[serde(default)]
#[builder(default)]
pub struct StorageOptions {
    /// # Persistence file
    ///
    /// When set, every committed transaction is written to this file and the store is reloaded
    /// from it on start. Otherwise all state lives in memory.
    #[builder(setter(strip_option))]
    pub path: Option<PathBuf>,
}

/// Root of the runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case")]
#[serde(default)]
#[builder(default)]
pub struct Configuration {
    #[serde(flatten)]
    pub common: CommonOptions,
    pub worker: WorkerOptions,
    pub storage: StorageOptions,
}

impl Configuration {
    pub fn validate(&self) -> Result<(), InvalidConfigurationError> {
        if self.worker.internal_queue_length == 0 {
            return Err(InvalidConfigurationError::ZeroQueueLength);
        }
        if let Some(path) = &self.storage.path {
            if path.is_dir() {
                return Err(InvalidConfigurationError::StoragePathIsDirectory(
                    path.clone(),
                ));
            }
        }
        Ok(())
    }
}
