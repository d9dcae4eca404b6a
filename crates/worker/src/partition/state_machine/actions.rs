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

use reprise_types::identifiers::{AwakeableIdentifier, InvocationId};
use reprise_types::invocation::InvocationTarget;
use reprise_types::journal::CompletionResult;
use reprise_types::time::MillisSinceEpoch;

pub type ActionCollector = Vec<Action>;

/// Timers owned by the processor. They are not persisted, see [`super::StateMachine::recover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Dispatch the next attempt of an invocation whose previous attempt crashed.
    RetryInvocation {
        invocation_id: InvocationId,
        invocation_epoch: u32,
    },
    /// Reject the awakeable with a timeout unless it was completed in the meantime.
    AwakeableExpiry(AwakeableIdentifier),
}

/// Side effects of applying a command. Executed by the processor once the transaction that
/// produced them is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Invoke {
        invocation_id: InvocationId,
        invocation_epoch: u32,
        invocation_target: InvocationTarget,
        argument: Bytes,
    },
    RegisterTimer {
        wake_up_time: MillisSinceEpoch,
        timer: TimerKind,
    },
    DeleteTimer(TimerKind),
    IngressResponse {
        invocation_id: InvocationId,
        result: CompletionResult,
    },
    /// The invocation is durably suspended.
    IngressSuspended {
        invocation_id: InvocationId,
        awaiting: Vec<AwakeableIdentifier>,
    },
}
