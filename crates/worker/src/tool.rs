// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Adapter between agent tools and the durable context.
//!
//! Tools never see the journal. Whatever they do through [`ToolContext`] is recorded in the
//! journal of the invocation that called them, in call order.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytestring::ByteString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use reprise_types::errors::codes;
use reprise_types::identifiers::{AwakeableIdentifier, InvocationId};

use crate::context::{Awakeable, ObjectContext};
use crate::error::{HandlerError, TerminalError};

/// Durable capabilities offered to tools, bound to the calling invocation.
#[derive(Clone)]
pub struct ToolContext {
    ctx: ObjectContext,
}

impl ToolContext {
    pub(crate) fn new(ctx: ObjectContext) -> Self {
        Self { ctx }
    }

    pub fn key(&self) -> &str {
        self.ctx.key()
    }

    pub fn invocation_id(&self) -> InvocationId {
        self.ctx.invocation_id()
    }

    /// See [`ObjectContext::run`].
    pub async fn run_step<T, E, F, Fut>(
        &self,
        name: impl Into<ByteString>,
        step: F,
    ) -> Result<T, HandlerError>
    where
        T: Serialize + DeserializeOwned,
        E: Into<TerminalError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.ctx.run(name, step).await
    }

    /// Creates a promise that expires after the configured default awakeable timeout, if any.
    pub async fn create_promise<T>(
        &self,
        name: impl Into<ByteString>,
    ) -> Result<(AwakeableIdentifier, Awakeable<T>), HandlerError> {
        self.ctx
            .named_awakeable(name, self.ctx.default_awakeable_timeout())
            .await
    }

    pub async fn create_promise_with_timeout<T>(
        &self,
        name: impl Into<ByteString>,
        timeout: Duration,
    ) -> Result<(AwakeableIdentifier, Awakeable<T>), HandlerError> {
        self.ctx.named_awakeable(name, Some(timeout)).await
    }

    pub fn object_context(&self) -> &ObjectContext {
        &self.ctx
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Description offered to the agent when it picks a tool.
    fn description(&self) -> &str;

    async fn call(&self, ctx: ToolContext, input: Value) -> Result<Value, HandlerError>;
}

/// A [`Tool`] backed by a closure.
pub struct FnTool<F> {
    name: String,
    description: String,
    f: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(ToolContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(ToolContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, ctx: ToolContext, input: Value) -> Result<Value, HandlerError> {
        (self.f)(ctx, input).await
    }
}

/// Tools available to an agent, looked up by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `tool`, replacing any tool registered under the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) -> &mut Self {
        self.tools.insert(tool.name().to_owned(), Arc::new(tool));
        self
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// `(name, description)` of every tool, sorted by name.
    pub fn descriptions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tools
            .values()
            .map(|tool| (tool.name(), tool.description()))
    }

    /// Calls the tool registered as `name`. Unknown tools fail with a terminal `NOT_FOUND`.
    pub async fn call(
        &self,
        ctx: &ToolContext,
        name: &str,
        input: Value,
    ) -> Result<Value, HandlerError> {
        let Some(tool) = self.tools.get(name) else {
            return Err(TerminalError::new_with_code(
                codes::NOT_FOUND,
                format!("tool '{name}' is not registered"),
            )
            .into());
        };
        debug!(reprise.invocation.id = %ctx.invocation_id(), "Calling tool '{name}'");
        tool.call(ctx.clone(), input).await
    }
}
