// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tracing::{debug, warn};

use reprise_storage_api::inbox_table::InboxTable;
use reprise_storage_api::invocation_status_table::{
    InFlightInvocationMetadata, InvocationStatus, ReadInvocationStatusTable,
    WriteInvocationStatusTable,
};
use reprise_storage_api::service_status_table::WriteVirtualObjectStatusTable;
use reprise_types::errors::{InvocationError, RETRIES_EXHAUSTED_INVOCATION_ERROR};
use reprise_types::identifiers::InvocationId;
use reprise_types::journal::CompletionResult;
use reprise_types::retries::RetryPolicy;

use super::EndInvocationCommand;
use crate::partition::state_machine::{
    Action, CommandHandler, Error, StateMachineApplyContext, TimerKind,
};

/// An attempt crashed or failed with a retryable error. Schedules the next attempt, or fails the
/// invocation once the retry policy is exhausted.
pub struct OnCrashCommand<'p> {
    pub invocation_id: InvocationId,
    pub metadata: InFlightInvocationMetadata,
    pub error: InvocationError,
    pub retry_policy: &'p RetryPolicy,
}

impl<'p, 'ctx, 's: 'ctx, S> CommandHandler<&'ctx mut StateMachineApplyContext<'s, S>>
    for OnCrashCommand<'p>
where
    S: ReadInvocationStatusTable
        + WriteInvocationStatusTable
        + WriteVirtualObjectStatusTable
        + InboxTable
        + Send,
{
    async fn apply(self, ctx: &'ctx mut StateMachineApplyContext<'s, S>) -> Result<(), Error> {
        let mut metadata = self.metadata;
        metadata.retry_count += 1;

        let Some(delay) = self
            .retry_policy
            .delay_for_attempt(metadata.retry_count as usize)
        else {
            warn!(
                invocation_id = %self.invocation_id,
                retry_count = metadata.retry_count,
                error = %self.error,
                "Invocation retries exhausted"
            );
            let error = RETRIES_EXHAUSTED_INVOCATION_ERROR.with_message(format!(
                "{}, last failure: {}",
                RETRIES_EXHAUSTED_INVOCATION_ERROR.message(),
                self.error
            ));
            return EndInvocationCommand {
                invocation_id: self.invocation_id,
                metadata,
                result: CompletionResult::Failure(error),
            }
            .apply(ctx)
            .await;
        };

        // attempts of the old epoch are gone, the timer carries the new one
        metadata.current_invocation_epoch += 1;
        debug!(
            invocation_id = %self.invocation_id,
            retry_count = metadata.retry_count,
            delay = ?delay,
            error = %self.error,
            "Effect: Schedule retry"
        );
        ctx.action_collector.push(Action::RegisterTimer {
            wake_up_time: ctx.record_created_at + delay,
            timer: TimerKind::RetryInvocation {
                invocation_id: self.invocation_id,
                invocation_epoch: metadata.current_invocation_epoch,
            },
        });
        metadata.timestamps.update(ctx.record_created_at);
        ctx.storage
            .put_invocation_status(&self.invocation_id, &InvocationStatus::Invoked(metadata))?;
        Ok(())
    }
}
