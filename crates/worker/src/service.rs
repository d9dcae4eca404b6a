// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use bytestring::ByteString;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;

use reprise_types::errors::{InvocationError, codes};
use reprise_types::invocation::InvocationTarget;

use crate::context::ObjectContext;
use crate::error::{HandlerError, TerminalError};

pub(crate) type HandlerFuture = BoxFuture<'static, Result<Bytes, HandlerError>>;

type BoxedHandler = Arc<dyn Fn(ObjectContext, Bytes) -> HandlerFuture + Send + Sync>;

/// A keyed virtual object: a named set of handlers. Invocations of one key run one at a time.
pub struct VirtualObject {
    name: ByteString,
    handlers: HashMap<ByteString, BoxedHandler>,
}

impl fmt::Debug for VirtualObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualObject")
            .field("name", &self.name)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VirtualObject {
    pub fn new(name: impl Into<ByteString>) -> Self {
        Self {
            name: name.into(),
            handlers: HashMap::new(),
        }
    }

    pub fn name(&self) -> &ByteString {
        &self.name
    }

    /// Registers a handler taking and returning JSON. An argument that cannot be decoded as `I`
    /// fails the invocation with `BAD_REQUEST`.
    pub fn handler<I, O, F, Fut>(mut self, name: impl Into<ByteString>, handler: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(ObjectContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, HandlerError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let boxed: BoxedHandler = Arc::new(move |ctx, argument: Bytes| {
            let handler = Arc::clone(&handler);
            async move {
                let input: I = serde_json::from_slice(&argument).map_err(|e| {
                    TerminalError::new_with_code(
                        codes::BAD_REQUEST,
                        format!("cannot decode handler argument: {e}"),
                    )
                })?;
                let output = (*handler)(ctx, input).await?;
                Ok::<_, HandlerError>(Bytes::from(serde_json::to_vec(&output)?))
            }
            .boxed()
        });
        self.handlers.insert(name.into(), boxed);
        self
    }
}

/// Every virtual object known to a runtime.
#[derive(Debug, Default, Clone)]
pub struct ServiceRegistry {
    objects: HashMap<ByteString, Arc<VirtualObject>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, object: VirtualObject) -> Self {
        self.register(object);
        self
    }

    pub fn register(&mut self, object: VirtualObject) -> &mut Self {
        self.objects.insert(object.name.clone(), Arc::new(object));
        self
    }

    pub(crate) fn invoke(
        &self,
        target: &InvocationTarget,
        ctx: ObjectContext,
        argument: Bytes,
    ) -> Result<HandlerFuture, InvocationError> {
        let object = self
            .objects
            .get(target.service_name())
            .ok_or_else(|| InvocationError::service_not_found(target.service_name()))?;
        let handler = object.handlers.get(target.handler_name()).ok_or_else(|| {
            InvocationError::service_handler_not_found(
                target.service_name(),
                target.handler_name(),
            )
        })?;
        Ok(handler(ctx, argument))
    }
}
