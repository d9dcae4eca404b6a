// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt::Display;

use tracing::{Level, info};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use reprise_types::config::{CommonOptions, LogFormat};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot parse log filter: {0}")]
    LogDirectiveParseError(#[from] ParseError),
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

fn build_logging_layer<S>(common_opts: &CommonOptions) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    match common_opts.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(
                std::io::stderr
                    .with_max_level(Level::WARN)
                    .or_else(std::io::stdout),
            )
            .with_ansi(!common_opts.log_disable_ansi_codes)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_ansi(!common_opts.log_disable_ansi_codes)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_ansi(!common_opts.log_disable_ansi_codes)
            .boxed(),
    }
}

/// Installs the global subscriber: one fmt layer in the configured [`LogFormat`], filtered by a
/// reloadable [`EnvFilter`] built from `log-filter`.
pub fn init_tracing_and_logging(
    common_opts: &CommonOptions,
    service_name: impl Display,
) -> Result<TracingGuard, Error> {
    let filter = EnvFilter::try_new(&common_opts.log_filter)?;
    let (filter, reload_handle) = tracing_subscriber::reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(build_logging_layer(common_opts).with_filter(filter))
        .try_init()?;

    info!(
        service = %service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Logging initialized"
    );

    Ok(TracingGuard { reload_handle })
}

#[derive(Debug)]
pub struct TracingGuard {
    reload_handle: Handle<EnvFilter, Registry>,
}

impl TracingGuard {
    pub fn reload_log_filter(&self, common_opts: &CommonOptions) -> Result<(), Error> {
        let new_filter = EnvFilter::try_new(&common_opts.log_filter)?;
        info!("Setting log filter to '{}'", common_opts.log_filter);
        // only fails if the subscriber is gone
        let _ = self.reload_handle.modify(|f| *f = new_filter);
        Ok(())
    }
}

/// Span wrapping one attempt of an invocation.
#[macro_export]
macro_rules! invocation_span {
    (level = $lvl:expr, id = $id:expr, target = $target:expr $(, $($field:tt)*)?) => {
        ::tracing::span!(
            $lvl,
            "invoke",
            reprise.invocation.id = %$id,
            reprise.invocation.target = %$target,
            rpc.service = %$target.service_name(),
            rpc.method = %$target.handler_name()
            $(, $($field)*)?
        )
    };
}

#[macro_export]
macro_rules! info_invocation_span {
    (id = $id:expr, target = $target:expr $(, $($field:tt)*)?) => {
        $crate::invocation_span!(
            level = ::tracing::Level::INFO,
            id = $id,
            target = $target
            $(, $($field)*)?
        )
    };
}
