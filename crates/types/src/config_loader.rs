// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::path::PathBuf;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};

use crate::config::{Configuration, InvalidConfigurationError};

#[derive(thiserror::Error, Debug)]
pub enum ConfigLoadError {
    #[error("configuration loading error: {0}")]
    Figment(Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] InvalidConfigurationError),
}

// Because thiserror doesn't support auto-boxing or auto implements From with boxing.
impl From<figment::Error> for ConfigLoadError {
    fn from(value: figment::Error) -> Self {
        Self::Figment(Box::new(value))
    }
}

/// Layers defaults, an optional TOML file and `REPRISE_` environment variables, in that order.
#[derive(Debug, Default, derive_builder::Builder)]
#[builder(default)]
pub struct ConfigLoader {
    #[builder(setter(strip_option))]
    path: Option<PathBuf>,
    load_env: bool,
    #[builder(setter(strip_option))]
    custom_default: Option<Configuration>,
}

impl ConfigLoader {
    pub fn load_once(&self) -> Result<Configuration, ConfigLoadError> {
        let defaults = self.custom_default.clone().unwrap_or_default();

        let mut figment = Figment::from(Serialized::defaults(defaults));
        if let Some(path) = &self.path {
            figment = figment.merge(Toml::file_exact(path.as_path()));
        }

        if self.load_env {
            figment = Self::merge_with_env(figment);
        }

        let config: Configuration = figment.extract()?;
        config.validate()?;

        Ok(config)
    }

    fn merge_with_env(figment: Figment) -> Figment {
        figment
            .merge(
                Env::prefixed("REPRISE_")
                    .split("__")
                    .map(|k| k.as_str().replace('_', "-").into()),
            )
            // Override log-filter with RUST_LOG, if present
            .merge(Env::raw().only(&["RUST_LOG"]).map(|_| "log-filter".into()))
    }
}
