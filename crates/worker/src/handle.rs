// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};

use reprise_partition_store::PartitionStore;
use reprise_storage_api::Storage;
use reprise_storage_api::invocation_status_table::{InvocationStatus, ReadInvocationStatusTable};
use reprise_storage_api::journal_table::ReadJournalTable;
use reprise_storage_api::state_table::ReadStateTable;
use reprise_types::errors::InvocationError;
use reprise_types::identifiers::{AwakeableIdentifier, InvocationId, ServiceId};
use reprise_types::invocation::{InvocationTarget, ServiceInvocation};
use reprise_types::journal::{CompletionResult, JournalEntry};

use crate::error::{PurgeError, ResolveError, RuntimeError};
use crate::partition::{Request, ResponseSink};

/// What a caller of [`RuntimeHandle::invoke`] gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationResponse {
    Completed(Bytes),
    Failed(InvocationError),
    /// The invocation is durably suspended waiting for `awaiting`. Use
    /// [`RuntimeHandle::attach`] to wait for its final outcome.
    Suspended {
        invocation_id: InvocationId,
        awaiting: Vec<AwakeableIdentifier>,
    },
}

impl InvocationResponse {
    /// Decodes the value of a completed invocation. `None` if the invocation did not complete
    /// successfully.
    pub fn completed_json<T: DeserializeOwned>(&self) -> Option<serde_json::Result<T>> {
        match self {
            InvocationResponse::Completed(value) => Some(serde_json::from_slice(value)),
            _ => None,
        }
    }
}

impl From<CompletionResult> for InvocationResponse {
    fn from(value: CompletionResult) -> Self {
        match value {
            CompletionResult::Success(value) => InvocationResponse::Completed(value),
            CompletionResult::Failure(error) => InvocationResponse::Failed(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// This call completed the awakeable.
    Resolved,
    /// The awakeable was completed before; this call changed nothing.
    AlreadyResolved,
}

/// Entry point into a running [`crate::Runtime`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    requests_tx: mpsc::Sender<Request>,
    storage: PartitionStore,
}

impl RuntimeHandle {
    pub(crate) fn new(requests_tx: mpsc::Sender<Request>, storage: PartitionStore) -> Self {
        Self {
            requests_tx,
            storage,
        }
    }

    /// Invokes `target` and waits until the invocation completes or durably suspends.
    pub async fn invoke(
        &self,
        target: InvocationTarget,
        payload: impl Into<Bytes>,
    ) -> Result<InvocationResponse, RuntimeError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request(Request::Invoke {
            service_invocation: ServiceInvocation::initialize(target, payload),
            response: ResponseSink::Outcome {
                response_tx,
                notify_suspension: true,
            },
        })
        .await?;
        response_rx.await.map_err(|_| RuntimeError::Shutdown)
    }

    pub async fn invoke_json<I: Serialize>(
        &self,
        target: InvocationTarget,
        input: &I,
    ) -> Result<InvocationResponse, RuntimeError> {
        self.invoke(target, serde_json::to_vec(input)?).await
    }

    /// Submits an invocation without waiting for it to run. Returns once it is durably accepted.
    pub async fn send(
        &self,
        target: InvocationTarget,
        payload: impl Into<Bytes>,
    ) -> Result<InvocationId, RuntimeError> {
        let service_invocation = ServiceInvocation::initialize(target, payload);
        let invocation_id = service_invocation.invocation_id;
        let (submitted_tx, submitted_rx) = oneshot::channel();
        self.request(Request::Invoke {
            service_invocation,
            response: ResponseSink::Submitted(submitted_tx),
        })
        .await?;
        submitted_rx.await.map_err(|_| RuntimeError::Shutdown)?;
        Ok(invocation_id)
    }

    /// Waits for the final outcome of an invocation. Unknown or purged invocations fail with
    /// `NOT_FOUND`.
    pub async fn attach(
        &self,
        invocation_id: InvocationId,
    ) -> Result<InvocationResponse, RuntimeError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request(Request::Attach {
            invocation_id,
            response_tx,
        })
        .await?;
        response_rx.await.map_err(|_| RuntimeError::Shutdown)
    }

    /// Completes the awakeable identified by `token` with `payload`.
    pub async fn resolve_awakeable(
        &self,
        token: &str,
        payload: impl Into<Bytes>,
    ) -> Result<ResolveOutcome, ResolveError> {
        self.complete_awakeable(token, CompletionResult::Success(payload.into()))
            .await
    }

    pub async fn resolve_awakeable_json<T: Serialize>(
        &self,
        token: &str,
        value: &T,
    ) -> Result<ResolveOutcome, ResolveError> {
        let payload = serde_json::to_vec(value)
            .map_err(|err| ResolveError::InvalidPayload(err.to_string()))?;
        self.resolve_awakeable(token, payload).await
    }

    /// Completes the awakeable identified by `token` with a failure. Awaiting it returns
    /// `error` as a terminal error.
    pub async fn reject_awakeable(
        &self,
        token: &str,
        error: impl Into<InvocationError>,
    ) -> Result<ResolveOutcome, ResolveError> {
        self.complete_awakeable(token, CompletionResult::Failure(error.into()))
            .await
    }

    async fn complete_awakeable(
        &self,
        token: &str,
        result: CompletionResult,
    ) -> Result<ResolveOutcome, ResolveError> {
        let awakeable_id: AwakeableIdentifier = token.parse()?;
        let (response_tx, response_rx) = oneshot::channel();
        self.requests_tx
            .send(Request::CompleteAwakeable {
                awakeable_id,
                result,
                response_tx,
            })
            .await
            .map_err(|_| ResolveError::Shutdown)?;
        response_rx.await.map_err(|_| ResolveError::Shutdown)?
    }

    /// Removes journal and status of a completed invocation. Its id becomes unknown.
    pub async fn purge_invocation(&self, invocation_id: InvocationId) -> Result<(), PurgeError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.requests_tx
            .send(Request::Purge {
                invocation_id,
                response_tx,
            })
            .await
            .map_err(|_| PurgeError::Shutdown)?;
        response_rx.await.map_err(|_| PurgeError::Shutdown)?
    }

    /// Reads the state entry `name` of a virtual object.
    pub async fn get_state(
        &self,
        service_id: &ServiceId,
        name: &str,
    ) -> Result<Option<Bytes>, RuntimeError> {
        let mut txn = self.storage.transaction().await;
        Ok(txn.get_user_state(service_id, name).await?)
    }

    pub async fn get_state_json<T: DeserializeOwned>(
        &self,
        service_id: &ServiceId,
        name: &str,
    ) -> Result<Option<T>, RuntimeError> {
        self.get_state(service_id, name)
            .await?
            .map(|value| serde_json::from_slice(&value))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn get_invocation_status(
        &self,
        invocation_id: &InvocationId,
    ) -> Result<InvocationStatus, RuntimeError> {
        let mut txn = self.storage.transaction().await;
        Ok(txn.get_invocation_status(invocation_id).await?)
    }

    pub async fn get_journal(
        &self,
        invocation_id: &InvocationId,
    ) -> Result<Vec<JournalEntry>, RuntimeError> {
        let mut txn = self.storage.transaction().await;
        Ok(txn.get_journal(invocation_id).await?)
    }

    async fn request(&self, request: Request) -> Result<(), RuntimeError> {
        self.requests_tx
            .send(request)
            .await
            .map_err(|_| RuntimeError::Shutdown)
    }
}
