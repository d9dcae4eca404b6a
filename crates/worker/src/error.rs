// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use bytestring::ByteString;

use reprise_storage_api::StorageError;
use reprise_types::errors::{InvocationError, InvocationErrorCode, MaybeRetryableError, codes};
use reprise_types::identifiers::{AwakeableIdentifier, CommandIndex, InvocationId};

/// A failure that ends the current operation for good. When returned by a step it is recorded
/// in the journal; when returned by a handler it completes the invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(transparent)]
pub struct TerminalError(InvocationError);

impl TerminalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(InvocationError::internal(message))
    }

    pub fn new_with_code(code: impl Into<InvocationErrorCode>, message: impl Into<String>) -> Self {
        Self(InvocationError::new(code, message))
    }

    pub fn code(&self) -> InvocationErrorCode {
        self.0.code()
    }

    pub fn message(&self) -> &str {
        self.0.message()
    }

    pub fn into_inner(self) -> InvocationError {
        self.0
    }
}

impl From<InvocationError> for TerminalError {
    fn from(value: InvocationError) -> Self {
        Self(value)
    }
}

impl From<TerminalError> for InvocationError {
    fn from(value: TerminalError) -> Self {
        value.0
    }
}

impl From<anyhow::Error> for TerminalError {
    fn from(value: anyhow::Error) -> Self {
        Self(InvocationError::from(value))
    }
}

/// Error returned by durable calls and handlers.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Terminal(#[from] TerminalError),
    #[error(
        "journal mismatch at command {command_index}: code expects {expected}, journal has {actual}"
    )]
    JournalMismatch {
        command_index: CommandIndex,
        expected: String,
        actual: String,
    },
    #[error("cannot encode or decode journaled value: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("durable call issued from inside the function of step '{0}'")]
    NestedDurableCall(ByteString),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("transient failure: {0}")]
    Transient(#[source] anyhow::Error),
}

impl HandlerError {
    /// A failure after which the invocation is retried following the configured retry policy.
    pub fn transient(error: impl Into<anyhow::Error>) -> Self {
        HandlerError::Transient(error.into())
    }

    pub(crate) fn into_invocation_error(self) -> InvocationError {
        match self {
            HandlerError::Terminal(e) => e.into_inner(),
            e @ HandlerError::JournalMismatch { .. } => {
                InvocationError::new(codes::JOURNAL_MISMATCH, e.to_string())
            }
            e @ HandlerError::NestedDurableCall(_) => {
                InvocationError::new(codes::BAD_REQUEST, e.to_string())
            }
            e => InvocationError::internal(e.to_string()),
        }
    }
}

impl From<InvocationError> for HandlerError {
    fn from(value: InvocationError) -> Self {
        HandlerError::Terminal(TerminalError(value))
    }
}

impl MaybeRetryableError for HandlerError {
    fn retryable(&self) -> bool {
        matches!(self, HandlerError::Storage(_) | HandlerError::Transient(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("runtime is shut down")]
    Shutdown,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("cannot encode or decode payload: {0}")]
    Codec(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid awakeable token: {0}")]
    InvalidToken(#[from] reprise_types::errors::IdDecodeError),
    #[error("cannot encode awakeable payload: {0}")]
    InvalidPayload(String),
    #[error("awakeable '{0}' not found")]
    NotFound(AwakeableIdentifier),
    #[error("invocation owning awakeable '{0}' already completed")]
    InvocationCompleted(AwakeableIdentifier),
    #[error("runtime is shut down")]
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PurgeError {
    #[error("invocation '{0}' not found")]
    NotFound(InvocationId),
    #[error("invocation '{0}' is not completed yet")]
    NotCompleted(InvocationId),
    #[error("runtime is shut down")]
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed recovering the partition store: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    InvalidConfiguration(#[from] reprise_types::config::InvalidConfigurationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_and_storage_errors_are_retried() {
        assert!(HandlerError::transient(anyhow::anyhow!("connection reset")).retryable());
        assert!(HandlerError::Storage(StorageError::OperationalError).retryable());
        assert!(!HandlerError::from(TerminalError::new("no")).retryable());
        assert!(
            !HandlerError::JournalMismatch {
                command_index: 0,
                expected: "step 'A'".to_owned(),
                actual: "step 'B'".to_owned(),
            }
            .retryable()
        );
    }

    #[test]
    fn journal_mismatch_maps_to_its_code() {
        let error = HandlerError::JournalMismatch {
            command_index: 3,
            expected: "step 'A'".to_owned(),
            actual: "promise-created".to_owned(),
        }
        .into_invocation_error();
        assert_eq!(error.code(), codes::JOURNAL_MISMATCH);
        assert!(error.message().contains("command 3"));
    }

    #[test]
    fn terminal_error_keeps_code_and_message() {
        let error = HandlerError::from(TerminalError::new_with_code(codes::BAD_REQUEST, "nope"))
            .into_invocation_error();
        assert_eq!(error, InvocationError::new(codes::BAD_REQUEST, "nope"));
    }
}
