// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::BTreeSet;
use std::fmt;
use std::future::IntoFuture;
use std::marker::PhantomData;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tokio::sync::Notify;

use reprise_types::identifiers::{AwakeableIdentifier, CommandIndex};
use reprise_types::journal::CompletionResult;

use super::ObjectContext;
use crate::error::{HandlerError, TerminalError};

/// A durable promise created by an invocation and completed from the outside through its
/// [`AwakeableIdentifier`].
///
/// Awaiting it returns the resolved value, or the rejection as [`HandlerError::Terminal`]. If the
/// promise is still pending the attempt suspends: the handler future is dropped and the
/// invocation is resumed (replaying its journal) once the promise is completed.
#[must_use = "awakeables do nothing unless awaited"]
pub struct Awakeable<T> {
    ctx: ObjectContext,
    id: AwakeableIdentifier,
    _value: PhantomData<fn() -> T>,
}

impl<T> Awakeable<T> {
    pub(super) fn new(ctx: ObjectContext, id: AwakeableIdentifier) -> Self {
        Self {
            ctx,
            id,
            _value: PhantomData,
        }
    }

    pub fn id(&self) -> AwakeableIdentifier {
        self.id
    }
}

impl<T> fmt::Debug for Awakeable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Awakeable").field("id", &self.id).finish()
    }
}

impl<T: DeserializeOwned> Awakeable<T> {
    async fn wait(self) -> Result<T, HandlerError> {
        let command_index = self.id.command_index();
        match self.ctx.awakeable_completion(command_index).await? {
            Some(CompletionResult::Success(value)) => Ok(serde_json::from_slice(&value)?),
            Some(CompletionResult::Failure(error)) => Err(TerminalError::from(error).into()),
            None => self.ctx.suspend(command_index).await,
        }
    }
}

impl<T: DeserializeOwned + 'static> IntoFuture for Awakeable<T> {
    type Output = Result<T, HandlerError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait().boxed()
    }
}

/// Raised by an attempt that cannot make progress until one of the awakeables is completed.
#[derive(Debug, Default)]
pub(crate) struct SuspensionSignal {
    waiting_for: parking_lot::Mutex<BTreeSet<CommandIndex>>,
    notify: Notify,
}

impl SuspensionSignal {
    pub(crate) fn suspend(&self, command_index: CommandIndex) {
        self.waiting_for.lock().insert(command_index);
        self.notify.notify_one();
    }

    /// Resolves once the attempt suspended, with the awakeables it waits for.
    pub(crate) async fn suspended(&self) -> BTreeSet<CommandIndex> {
        self.notify.notified().await;
        self.waiting_for.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test(tokio::test)]
    async fn suspension_collects_every_awaited_awakeable() {
        let signal = SuspensionSignal::default();
        signal.suspend(3);
        signal.suspend(1);
        assert_eq!(signal.suspended().await, BTreeSet::from([1, 3]));
    }
}
