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

use tracing::{debug, trace};

use reprise_storage_api::invocation_status_table::{
    InFlightInvocationMetadata, InvocationStatus, WriteInvocationStatusTable,
};
use reprise_storage_api::journal_table::ReadJournalTable;
use reprise_types::identifiers::{AwakeableIdentifier, CommandIndex, InvocationId};

use super::ResumeInvocationCommand;
use crate::partition::state_machine::{
    Action, CommandHandler, Error, StateMachineApplyContext, any_completed,
    register_expiry_timers,
};

pub struct OnSuspendCommand {
    pub invocation_id: InvocationId,
    pub metadata: InFlightInvocationMetadata,
    pub waiting_for_awakeables: BTreeSet<CommandIndex>,
}

impl<'ctx, 's: 'ctx, S> CommandHandler<&'ctx mut StateMachineApplyContext<'s, S>>
    for OnSuspendCommand
where
    S: ReadJournalTable + WriteInvocationStatusTable + Send,
{
    async fn apply(self, ctx: &'ctx mut StateMachineApplyContext<'s, S>) -> Result<(), Error> {
        debug_assert!(
            !self.waiting_for_awakeables.is_empty(),
            "Expecting at least one awakeable on which the invocation {} is waiting.",
            self.invocation_id
        );

        // The awakeable may have been completed after the attempt last looked at the journal
        let journal = ctx.storage.get_journal(&self.invocation_id).await?;
        if any_completed(&journal, &self.waiting_for_awakeables) {
            trace!(
                invocation_id = %self.invocation_id,
                "Resuming instead of suspending because an awakeable is already completed"
            );
            return ResumeInvocationCommand {
                invocation_id: self.invocation_id,
                metadata: self.metadata,
            }
            .apply(ctx)
            .await;
        }

        debug!(
            invocation_id = %self.invocation_id,
            waiting_for = ?self.waiting_for_awakeables,
            "Effect: Suspend invocation"
        );
        register_expiry_timers(
            ctx.action_collector,
            self.invocation_id,
            &journal,
            &self.waiting_for_awakeables,
        );
        ctx.action_collector.push(Action::IngressSuspended {
            invocation_id: self.invocation_id,
            awaiting: self
                .waiting_for_awakeables
                .iter()
                .map(|idx| AwakeableIdentifier::new(self.invocation_id, *idx))
                .collect(),
        });

        let mut metadata = self.metadata;
        metadata.timestamps.update(ctx.record_created_at);
        ctx.storage.put_invocation_status(
            &self.invocation_id,
            &InvocationStatus::Suspended {
                metadata,
                waiting_for_awakeables: self.waiting_for_awakeables,
            },
        )?;
        Ok(())
    }
}
