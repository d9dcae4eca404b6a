// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The durable context handed to handlers.
//!
//! Every durable call (steps, awakeables, state access) is a *command* of the invocation's
//! journal. On replay the recorded command at the same ordinal is returned instead of doing the
//! work again; once replay is over the command is performed and appended.

mod awakeable;
mod journal_cursor;

pub use awakeable::Awakeable;
pub(crate) use awakeable::SuspensionSignal;
pub(crate) use journal_cursor::JournalCursor;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use bytestring::ByteString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::trace;

use reprise_partition_store::{PartitionStore, PartitionStoreTransaction};
use reprise_storage_api::journal_table::{ReadJournalTable, WriteJournalTable};
use reprise_storage_api::state_table::{ReadStateTable, WriteStateTable};
use reprise_storage_api::{Storage, StorageError, Transaction};
use reprise_types::identifiers::{AwakeableIdentifier, CommandIndex, InvocationId, ServiceId};
use reprise_types::invocation::InvocationTarget;
use reprise_types::journal::{
    CompletionResult, Entry, EntryType, JournalEntry, find_awakeable_completion,
};
use reprise_types::time::MillisSinceEpoch;

use crate::error::{HandlerError, TerminalError};
use crate::tool::ToolContext;

tokio::task_local! {
    /// Name of the step whose function is being polled.
    static CURRENT_STEP: ByteString;
}

/// Handle to the running invocation of a virtual object. Cheap to clone; all clones share the
/// replay cursor, so durable calls issued from clones are still ordered.
#[derive(Clone)]
pub struct ObjectContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    invocation_id: InvocationId,
    invocation_target: InvocationTarget,
    service_id: ServiceId,
    storage: PartitionStore,
    cursor: Mutex<JournalCursor>,
    suspension: Arc<SuspensionSignal>,
    default_awakeable_timeout: Option<Duration>,
}

impl ObjectContext {
    pub(crate) fn new(
        invocation_id: InvocationId,
        invocation_target: InvocationTarget,
        storage: PartitionStore,
        cursor: JournalCursor,
        suspension: Arc<SuspensionSignal>,
        default_awakeable_timeout: Option<Duration>,
    ) -> Self {
        let service_id = invocation_target.as_service_id();
        Self {
            inner: Arc::new(ContextInner {
                invocation_id,
                invocation_target,
                service_id,
                storage,
                cursor: Mutex::new(cursor),
                suspension,
                default_awakeable_timeout,
            }),
        }
    }

    /// Key of the virtual object this invocation runs on.
    pub fn key(&self) -> &str {
        &self.inner.service_id.key
    }

    pub fn invocation_id(&self) -> InvocationId {
        self.inner.invocation_id
    }

    pub fn invocation_target(&self) -> &InvocationTarget {
        &self.inner.invocation_target
    }

    /// Deadline applied to awakeables created without an explicit timeout.
    pub fn default_awakeable_timeout(&self) -> Option<Duration> {
        self.inner.default_awakeable_timeout
    }

    pub fn tool_context(&self) -> ToolContext {
        ToolContext::new(self.clone())
    }

    /// Runs `step` at most once to completion.
    ///
    /// If a previous attempt recorded the outcome of this step, the recorded value or failure is
    /// returned and `step` is not called. Otherwise `step` runs, its outcome is appended to the
    /// journal and returned. A failure returned by `step` is recorded as well and surfaces as
    /// [`HandlerError::Terminal`]; it is not retried.
    ///
    /// `step` must not issue durable calls itself.
    pub async fn run<T, E, F, Fut>(
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
        check_not_in_step()?;
        let name = name.into();
        let mut cursor = self.inner.cursor.lock().await;

        if let Some(recorded) = cursor.take_recorded(EntryType::Run, Some(&name))? {
            let Entry::Run { result, .. } = recorded else {
                unreachable!("take_recorded checks the entry type");
            };
            trace!(
                reprise.journal.command = cursor.next_command_index() - 1,
                "Replaying step '{name}'"
            );
            return match result {
                CompletionResult::Success(value) => Ok(serde_json::from_slice(&value)?),
                CompletionResult::Failure(error) => Err(TerminalError::from(error).into()),
            };
        }

        trace!(
            reprise.journal.command = cursor.next_command_index(),
            "Executing step '{name}'"
        );
        let (result, output) = match CURRENT_STEP.scope(name.clone(), step()).await {
            Ok(value) => {
                let serialized = serde_json::to_vec(&value)?;
                (CompletionResult::Success(Bytes::from(serialized)), Ok(value))
            }
            Err(error) => {
                let error = error.into();
                (
                    CompletionResult::Failure(error.clone().into_inner()),
                    Err(HandlerError::Terminal(error)),
                )
            }
        };

        self.append_command(Entry::Run { name, result }, |_, _| Ok(()))
            .await?;
        cursor.advance();
        output
    }

    /// Creates an awakeable without deadline, unless a default awakeable timeout is configured.
    pub async fn awakeable<T>(&self) -> Result<(AwakeableIdentifier, Awakeable<T>), HandlerError> {
        self.named_awakeable(ByteString::new(), self.default_awakeable_timeout())
            .await
    }

    /// Creates an awakeable that is rejected with a timeout failure if it is not completed
    /// within `timeout`.
    pub async fn awakeable_with_timeout<T>(
        &self,
        timeout: Duration,
    ) -> Result<(AwakeableIdentifier, Awakeable<T>), HandlerError> {
        self.named_awakeable(ByteString::new(), Some(timeout)).await
    }

    /// Creates an awakeable. The returned identifier is the token to hand to whoever will
    /// complete it with [`crate::RuntimeHandle::resolve_awakeable`].
    pub async fn named_awakeable<T>(
        &self,
        name: impl Into<ByteString>,
        timeout: Option<Duration>,
    ) -> Result<(AwakeableIdentifier, Awakeable<T>), HandlerError> {
        check_not_in_step()?;
        let name = name.into();
        let mut cursor = self.inner.cursor.lock().await;
        let command_index = cursor.next_command_index();

        if cursor
            .take_recorded(EntryType::Awakeable, Some(&name))?
            .is_none()
        {
            let deadline = timeout.map(|timeout| MillisSinceEpoch::now() + timeout);
            self.append_command(Entry::Awakeable { name, deadline }, |_, _| Ok(()))
                .await?;
            cursor.advance();
        }

        let id = AwakeableIdentifier::new(self.inner.invocation_id, command_index);
        trace!(reprise.journal.command = command_index, %id, "Created awakeable");
        Ok((id, Awakeable::new(self.clone(), id)))
    }

    /// Reads the state entry `name` of this virtual object. The observed value is journaled,
    /// replays observe the same value.
    pub async fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, HandlerError> {
        check_not_in_step()?;
        let mut cursor = self.inner.cursor.lock().await;

        let value = match cursor.take_recorded(EntryType::GetState, Some(name))? {
            Some(Entry::GetState { value, .. }) => value,
            Some(_) => unreachable!("take_recorded checks the entry type"),
            None => {
                let mut txn = self.inner.storage.transaction().await;
                let value = txn.get_user_state(&self.inner.service_id, name).await?;
                self.append_in_txn(
                    &mut txn,
                    Entry::GetState {
                        key: ByteString::from(name),
                        value: value.clone(),
                    },
                )
                .await?;
                txn.commit().await?;
                cursor.advance();
                value
            }
        };

        value
            .map(|value| serde_json::from_slice(&value))
            .transpose()
            .map_err(Into::into)
    }

    /// Sets the state entry `name`. Applied together with its journal entry, so a replayed `set`
    /// is never applied twice.
    pub async fn set<T: Serialize>(&self, name: &str, value: &T) -> Result<(), HandlerError> {
        check_not_in_step()?;
        let value = Bytes::from(serde_json::to_vec(value)?);
        let mut cursor = self.inner.cursor.lock().await;

        if cursor
            .take_recorded(EntryType::SetState, Some(name))?
            .is_none()
        {
            let key = ByteString::from(name);
            let state_value = value.clone();
            let state_key = key.clone();
            self.append_command(Entry::SetState { key, value }, move |txn, service_id| {
                txn.put_user_state(service_id, state_key, state_value)
            })
            .await?;
            cursor.advance();
        }
        Ok(())
    }

    pub async fn clear(&self, name: &str) -> Result<(), HandlerError> {
        check_not_in_step()?;
        let mut cursor = self.inner.cursor.lock().await;

        if cursor
            .take_recorded(EntryType::ClearState, Some(name))?
            .is_none()
        {
            self.append_command(
                Entry::ClearState {
                    key: ByteString::from(name),
                },
                |txn, service_id| txn.delete_user_state(service_id, name),
            )
            .await?;
            cursor.advance();
        }
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<(), HandlerError> {
        check_not_in_step()?;
        let mut cursor = self.inner.cursor.lock().await;

        if cursor
            .take_recorded(EntryType::ClearAllState, None)?
            .is_none()
        {
            self.append_command(Entry::ClearAllState, |txn, service_id| {
                txn.delete_all_user_state(service_id)
            })
            .await?;
            cursor.advance();
        }
        Ok(())
    }

    /// Completion of the awakeable created at `command_index`, looking at the store if it was not
    /// known when the attempt started.
    async fn awakeable_completion(
        &self,
        command_index: CommandIndex,
    ) -> Result<Option<CompletionResult>, HandlerError> {
        check_not_in_step()?;
        let mut cursor = self.inner.cursor.lock().await;
        if let Some(result) = cursor.completion(command_index) {
            return Ok(Some(result.clone()));
        }

        let journal = {
            let mut txn = self.inner.storage.transaction().await;
            txn.get_journal(&self.inner.invocation_id).await?
        };
        let result = find_awakeable_completion(&journal, command_index).cloned();
        if let Some(result) = &result {
            cursor.record_completion(command_index, result.clone());
        }
        Ok(result)
    }

    async fn suspend<T>(&self, command_index: CommandIndex) -> Result<T, HandlerError> {
        trace!(
            reprise.journal.command = command_index,
            "Awakeable is pending, suspending"
        );
        self.inner.suspension.suspend(command_index);
        // the invoker drops this attempt as soon as it sees the signal
        std::future::pending().await
    }

    async fn append_command<F>(&self, entry: Entry, apply: F) -> Result<(), HandlerError>
    where
        F: FnOnce(&mut PartitionStoreTransaction, &ServiceId) -> Result<(), StorageError>,
    {
        let mut txn = self.inner.storage.transaction().await;
        apply(&mut txn, &self.inner.service_id)?;
        self.append_in_txn(&mut txn, entry).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn append_in_txn(
        &self,
        txn: &mut PartitionStoreTransaction,
        entry: Entry,
    ) -> Result<(), StorageError> {
        let index = txn.get_journal_length(&self.inner.invocation_id).await?;
        txn.append_journal_entry(&self.inner.invocation_id, JournalEntry::new(index, entry))
    }
}

fn check_not_in_step() -> Result<(), HandlerError> {
    match CURRENT_STEP.try_with(ByteString::clone) {
        Ok(step) => Err(HandlerError::NestedDurableCall(step)),
        Err(_) => Ok(()),
    }
}
