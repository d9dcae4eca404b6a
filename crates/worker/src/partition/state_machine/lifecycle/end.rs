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
    CompletedInvocation, InFlightInvocationMetadata, InvocationStatus, ReadInvocationStatusTable,
    WriteInvocationStatusTable,
};
use reprise_storage_api::service_status_table::{
    VirtualObjectStatus, WriteVirtualObjectStatusTable,
};
use reprise_types::identifiers::InvocationId;
use reprise_types::journal::CompletionResult;

use crate::partition::state_machine::{
    Action, CommandHandler, Error, StateMachineApplyContext, invoke,
};

/// Completes an invocation and hands the lock of its virtual object to the head of the inbox.
/// The journal is kept until the invocation is purged.
pub struct EndInvocationCommand {
    pub invocation_id: InvocationId,
    pub metadata: InFlightInvocationMetadata,
    pub result: CompletionResult,
}

impl<'ctx, 's: 'ctx, S> CommandHandler<&'ctx mut StateMachineApplyContext<'s, S>>
    for EndInvocationCommand
where
    S: ReadInvocationStatusTable
        + WriteInvocationStatusTable
        + WriteVirtualObjectStatusTable
        + InboxTable
        + Send,
{
    async fn apply(self, ctx: &'ctx mut StateMachineApplyContext<'s, S>) -> Result<(), Error> {
        let service_id = self.metadata.invocation_target.as_service_id();
        debug!(
            invocation_id = %self.invocation_id,
            success = matches!(self.result, CompletionResult::Success(_)),
            "Effect: End invocation"
        );

        ctx.action_collector.push(Action::IngressResponse {
            invocation_id: self.invocation_id,
            result: self.result.clone(),
        });
        ctx.storage.put_invocation_status(
            &self.invocation_id,
            &InvocationStatus::Completed(CompletedInvocation::from_in_flight_invocation_metadata(
                self.metadata,
                self.result,
                ctx.record_created_at,
            )),
        )?;

        while let Some(inbox_entry) = ctx.storage.pop_inbox(&service_id).await? {
            let next_invocation_id = inbox_entry.invocation_id;
            match ctx.storage.get_invocation_status(&next_invocation_id).await? {
                InvocationStatus::Inboxed(inboxed) => {
                    debug!(
                        invocation_id = %next_invocation_id,
                        %service_id,
                        "Effect: Invoke inboxed invocation"
                    );
                    ctx.storage.put_virtual_object_status(
                        &service_id,
                        &VirtualObjectStatus::Locked(next_invocation_id),
                    )?;
                    let metadata = InFlightInvocationMetadata::from_inboxed_invocation(
                        inboxed,
                        ctx.record_created_at,
                    );
                    return invoke(ctx, next_invocation_id, metadata);
                }
                status => warn!(
                    invocation_id = %next_invocation_id,
                    status = %status.discriminant(),
                    "Dropping inbox entry of an invocation that is not inboxed"
                ),
            }
        }

        ctx.storage
            .put_virtual_object_status(&service_id, &VirtualObjectStatus::Unlocked)?;
        Ok(())
    }
}
