// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::borrow::Cow;
use std::fmt;
use std::fmt::Formatter;

/// Error type which abstracts away the actual [`std::error::Error`] type. Use this type
/// if you don't know the actual error type or if it is not important.
pub type GenericError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Tells whether an error should be retried by upper layers or not.
pub trait MaybeRetryableError: std::error::Error + 'static {
    /// Signal upper layers whether this error should be retried or not.
    fn retryable(&self) -> bool {
        false
    }
}

static_assertions::assert_obj_safe!(MaybeRetryableError);

#[derive(Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct InvocationErrorCode(u16);

impl InvocationErrorCode {
    pub const fn new(code: u16) -> Self {
        InvocationErrorCode(code)
    }
}

impl From<u16> for InvocationErrorCode {
    fn from(value: u16) -> Self {
        InvocationErrorCode(value)
    }
}

impl From<u32> for InvocationErrorCode {
    fn from(value: u32) -> Self {
        value
            .try_into()
            .map(InvocationErrorCode)
            .unwrap_or(codes::INTERNAL)
    }
}

impl From<InvocationErrorCode> for u16 {
    fn from(value: InvocationErrorCode) -> Self {
        value.0
    }
}

impl fmt::Display for InvocationErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(display_str) = self.display_str() {
            write!(f, "{} {}", self.0, display_str)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Debug for InvocationErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

pub mod codes {
    use super::InvocationErrorCode;

    macro_rules! codes {
        ($($name:ident $num:literal $str_name:literal,)*) => {
            $(pub const $name: InvocationErrorCode = InvocationErrorCode($num);)*

            impl InvocationErrorCode {
                pub(super) fn display_str(&self) -> Option<&'static str> {
                    $(if self.0 == $name.0 { return Some($str_name) })*
                    None
                }
            }
        };
    }

    codes!(
        BAD_REQUEST 400 "Bad request",
        NOT_FOUND 404 "Not found",
        TIMEOUT 408 "Timeout",
        ABORTED 409 "Aborted",
        GONE 410 "Gone",
        INTERNAL 500 "Internal",
        JOURNAL_MISMATCH 570 "Journal mismatch",
    );
}

/// Durable representation of a failure: what gets recorded in the journal for failed steps,
/// rejected awakeables and failed invocations.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InvocationError {
    code: InvocationErrorCode,
    message: Cow<'static, str>,
}

pub const UNKNOWN_INVOCATION_ERROR: InvocationError =
    InvocationError::new_static(codes::INTERNAL, "unknown");

impl Default for InvocationError {
    fn default() -> Self {
        UNKNOWN_INVOCATION_ERROR
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message())
    }
}

impl std::error::Error for InvocationError {}

impl InvocationError {
    pub const fn new_static(code: InvocationErrorCode, message: &'static str) -> Self {
        Self {
            code,
            message: Cow::Borrowed(message),
        }
    }

    pub fn new(code: impl Into<InvocationErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: Cow::Owned(message.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL, message)
    }

    pub fn service_not_found(service: impl fmt::Display) -> Self {
        Self {
            code: codes::NOT_FOUND,
            message: Cow::Owned(format!(
                "Virtual object '{service}' not found. Check whether it is registered with the runtime."
            )),
        }
    }

    pub fn service_handler_not_found(
        service: impl fmt::Display,
        handler: impl fmt::Display,
    ) -> Self {
        Self {
            code: codes::NOT_FOUND,
            message: Cow::Owned(format!("Handler '{service}/{handler}' not found.")),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> InvocationError {
        self.message = Cow::Owned(message.into());
        self
    }

    pub fn code(&self) -> InvocationErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for InvocationError {
    fn from(error: anyhow::Error) -> Self {
        InvocationError::internal(error.to_string())
    }
}

// -- Some known errors

pub const AWAKEABLE_TIMEOUT_ERROR: InvocationError =
    InvocationError::new_static(codes::TIMEOUT, "awakeable was not resolved before its deadline");

pub const RETRIES_EXHAUSTED_INVOCATION_ERROR: InvocationError =
    InvocationError::new_static(codes::ABORTED, "invocation retries exhausted");

pub const NOT_FOUND_INVOCATION_ERROR: InvocationError =
    InvocationError::new_static(codes::NOT_FOUND, "not found");

/// Error parsing/decoding a resource ID.
#[derive(Debug, thiserror::Error, Clone, Eq, PartialEq)]
pub enum IdDecodeError {
    #[error("bad length")]
    Length,
    #[error("decode error")]
    Codec,
    #[error("bad format")]
    Format,
    #[error("unrecognized codec version")]
    Version,
    #[error("id doesn't match the expected type")]
    TypeMismatch,
    #[error("unrecognized resource type: {0}")]
    UnrecognizedType(String),
}
