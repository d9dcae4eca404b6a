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
use std::future::Future;

use bytes::Bytes;

use reprise_types::identifiers::{CommandIndex, InvocationId};
use reprise_types::invocation::{InvocationTarget, ServiceInvocation};
use reprise_types::journal::CompletionResult;
use reprise_types::time::MillisSinceEpoch;

use crate::Result;

/// Holds timestamps of the [`InvocationStatus`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StatusTimestamps {
    creation_time: MillisSinceEpoch,
    modification_time: MillisSinceEpoch,

    inboxed_transition_time: Option<MillisSinceEpoch>,
    running_transition_time: Option<MillisSinceEpoch>,
    completed_transition_time: Option<MillisSinceEpoch>,
}

impl StatusTimestamps {
    pub fn init(created_at: MillisSinceEpoch) -> Self {
        Self {
            creation_time: created_at,
            modification_time: created_at,
            inboxed_transition_time: None,
            running_transition_time: None,
            completed_transition_time: None,
        }
    }

    /// Update the statistics with an updated [`Self::modification_time()`].
    pub fn update(&mut self, timestamp: MillisSinceEpoch) {
        self.modification_time = self.modification_time.max(timestamp);
    }

    pub fn record_inboxed_transition_time(&mut self, timestamp: MillisSinceEpoch) {
        self.update(timestamp);
        self.inboxed_transition_time = Some(self.modification_time)
    }

    pub fn record_running_transition_time(&mut self, timestamp: MillisSinceEpoch) {
        self.update(timestamp);
        self.running_transition_time = Some(self.modification_time)
    }

    pub fn record_completed_transition_time(&mut self, timestamp: MillisSinceEpoch) {
        self.update(timestamp);
        self.completed_transition_time = Some(self.modification_time)
    }

    pub fn creation_time(&self) -> MillisSinceEpoch {
        self.creation_time
    }

    pub fn modification_time(&self) -> MillisSinceEpoch {
        self.modification_time
    }

    pub fn inboxed_transition_time(&self) -> Option<MillisSinceEpoch> {
        self.inboxed_transition_time
    }

    pub fn running_transition_time(&self) -> Option<MillisSinceEpoch> {
        self.running_transition_time
    }

    pub fn completed_transition_time(&self) -> Option<MillisSinceEpoch> {
        self.completed_transition_time
    }
}

/// Status of an invocation.
#[derive(
    Debug,
    Default,
    Clone,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::EnumDiscriminants,
)]
#[strum_discriminants(derive(strum::Display))]
#[strum_discriminants(name(InvocationStatusDiscriminants))]
pub enum InvocationStatus {
    /// Waiting in the inbox of its virtual object for the lock.
    Inboxed(InboxedInvocation),
    /// Owns the lock and a handler attempt is (or is about to be) running.
    Invoked(InFlightInvocationMetadata),
    /// Owns the lock, no attempt is running until one of the awakeables is completed.
    Suspended {
        metadata: InFlightInvocationMetadata,
        waiting_for_awakeables: BTreeSet<CommandIndex>,
    },
    Completed(CompletedInvocation),
    /// Unknown invocation, or one whose state was purged.
    #[default]
    Free,
}

impl InvocationStatus {
    #[inline]
    pub fn invocation_target(&self) -> Option<&InvocationTarget> {
        match self {
            InvocationStatus::Inboxed(inboxed) => Some(&inboxed.invocation_target),
            InvocationStatus::Invoked(metadata) => Some(&metadata.invocation_target),
            InvocationStatus::Suspended { metadata, .. } => Some(&metadata.invocation_target),
            InvocationStatus::Completed(completed) => Some(&completed.invocation_target),
            InvocationStatus::Free => None,
        }
    }

    pub fn get_invocation_metadata(&self) -> Option<&InFlightInvocationMetadata> {
        match self {
            InvocationStatus::Invoked(metadata) => Some(metadata),
            InvocationStatus::Suspended { metadata, .. } => Some(metadata),
            _ => None,
        }
    }

    pub fn into_invocation_metadata(self) -> Option<InFlightInvocationMetadata> {
        match self {
            InvocationStatus::Invoked(metadata) => Some(metadata),
            InvocationStatus::Suspended { metadata, .. } => Some(metadata),
            _ => None,
        }
    }

    pub fn get_timestamps(&self) -> Option<&StatusTimestamps> {
        match self {
            InvocationStatus::Inboxed(inboxed) => Some(&inboxed.timestamps),
            InvocationStatus::Invoked(metadata) => Some(&metadata.timestamps),
            InvocationStatus::Suspended { metadata, .. } => Some(&metadata.timestamps),
            InvocationStatus::Completed(completed) => Some(&completed.timestamps),
            InvocationStatus::Free => None,
        }
    }

    pub fn discriminant(&self) -> InvocationStatusDiscriminants {
        self.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InboxedInvocation {
    pub inbox_sequence_number: u64,
    pub invocation_target: InvocationTarget,
    pub argument: Bytes,
    pub timestamps: StatusTimestamps,
}

impl InboxedInvocation {
    pub fn from_service_invocation(
        service_invocation: ServiceInvocation,
        inbox_sequence_number: u64,
        timestamp: MillisSinceEpoch,
    ) -> Self {
        let mut timestamps = StatusTimestamps::init(timestamp);
        timestamps.record_inboxed_transition_time(timestamp);
        Self {
            inbox_sequence_number,
            invocation_target: service_invocation.invocation_target,
            argument: service_invocation.argument,
            timestamps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InFlightInvocationMetadata {
    pub invocation_target: InvocationTarget,
    pub argument: Bytes,
    /// Number of attempts that crashed so far.
    pub retry_count: u32,
    /// Bumped on every dispatch. Effects carrying an older epoch come from an attempt that was
    /// superseded and are ignored.
    pub current_invocation_epoch: u32,
    pub timestamps: StatusTimestamps,
}

impl InFlightInvocationMetadata {
    pub fn from_service_invocation(
        service_invocation: ServiceInvocation,
        timestamp: MillisSinceEpoch,
    ) -> Self {
        let mut timestamps = StatusTimestamps::init(timestamp);
        timestamps.record_running_transition_time(timestamp);
        Self {
            invocation_target: service_invocation.invocation_target,
            argument: service_invocation.argument,
            retry_count: 0,
            current_invocation_epoch: 0,
            timestamps,
        }
    }

    pub fn from_inboxed_invocation(
        inboxed_invocation: InboxedInvocation,
        timestamp: MillisSinceEpoch,
    ) -> Self {
        let mut timestamps = inboxed_invocation.timestamps;
        timestamps.record_running_transition_time(timestamp);
        Self {
            invocation_target: inboxed_invocation.invocation_target,
            argument: inboxed_invocation.argument,
            retry_count: 0,
            current_invocation_epoch: 0,
            timestamps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompletedInvocation {
    pub invocation_target: InvocationTarget,
    pub timestamps: StatusTimestamps,
    pub response_result: CompletionResult,
}

impl CompletedInvocation {
    pub fn from_in_flight_invocation_metadata(
        mut metadata: InFlightInvocationMetadata,
        response_result: CompletionResult,
        timestamp: MillisSinceEpoch,
    ) -> Self {
        metadata.timestamps.record_completed_transition_time(timestamp);
        Self {
            invocation_target: metadata.invocation_target,
            timestamps: metadata.timestamps,
            response_result,
        }
    }
}

pub trait ReadInvocationStatusTable {
    /// Returns [`InvocationStatus::Free`] for unknown invocations.
    fn get_invocation_status(
        &mut self,
        invocation_id: &InvocationId,
    ) -> impl Future<Output = Result<InvocationStatus>> + Send;

    /// Every invocation that is not [`InvocationStatus::Free`], in id order.
    fn all_invocation_statuses(
        &mut self,
    ) -> impl Future<Output = Result<Vec<(InvocationId, InvocationStatus)>>> + Send;
}

pub trait WriteInvocationStatusTable {
    fn put_invocation_status(
        &mut self,
        invocation_id: &InvocationId,
        status: &InvocationStatus,
    ) -> Result<()>;

    fn delete_invocation_status(&mut self, invocation_id: &InvocationId) -> Result<()>;
}
