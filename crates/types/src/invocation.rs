// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! This module contains all the core types representing a service invocation.

use std::fmt;

use bytes::Bytes;
use bytestring::ByteString;

use crate::identifiers::{InvocationId, ServiceId};

/// The handler of a keyed virtual object an invocation is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct InvocationTarget {
    service_name: ByteString,
    key: ByteString,
    handler: ByteString,
}

impl InvocationTarget {
    pub fn virtual_object(
        service_name: impl Into<ByteString>,
        key: impl Into<ByteString>,
        handler: impl Into<ByteString>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            key: key.into(),
            handler: handler.into(),
        }
    }

    pub fn service_name(&self) -> &ByteString {
        &self.service_name
    }

    pub fn key(&self) -> &ByteString {
        &self.key
    }

    pub fn handler_name(&self) -> &ByteString {
        &self.handler
    }

    pub fn as_service_id(&self) -> ServiceId {
        ServiceId::new(self.service_name.clone(), self.key.clone())
    }
}

impl fmt::Display for InvocationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.service_name, self.key, self.handler)
    }
}

/// A request to run `target` with `argument`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServiceInvocation {
    pub invocation_id: InvocationId,
    pub invocation_target: InvocationTarget,
    pub argument: Bytes,
}

impl ServiceInvocation {
    pub fn initialize(invocation_target: InvocationTarget, argument: impl Into<Bytes>) -> Self {
        Self {
            invocation_id: InvocationId::generate(),
            invocation_target,
            argument: argument.into(),
        }
    }
}
