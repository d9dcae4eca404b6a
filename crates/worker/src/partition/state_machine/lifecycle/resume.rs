// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tracing::debug;

use reprise_storage_api::invocation_status_table::{
    InFlightInvocationMetadata, WriteInvocationStatusTable,
};
use reprise_types::identifiers::InvocationId;

use crate::partition::state_machine::{CommandHandler, Error, StateMachineApplyContext, invoke};

pub struct ResumeInvocationCommand {
    pub invocation_id: InvocationId,
    pub metadata: InFlightInvocationMetadata,
}

impl<'ctx, 's: 'ctx, S> CommandHandler<&'ctx mut StateMachineApplyContext<'s, S>>
    for ResumeInvocationCommand
where
    S: WriteInvocationStatusTable,
{
    async fn apply(self, ctx: &'ctx mut StateMachineApplyContext<'s, S>) -> Result<(), Error> {
        let mut metadata = self.metadata;
        metadata.current_invocation_epoch += 1;
        metadata
            .timestamps
            .record_running_transition_time(ctx.record_created_at);

        debug!(
            invocation_id = %self.invocation_id,
            invocation_epoch = metadata.current_invocation_epoch,
            "Effect: Resume invocation"
        );
        invoke(ctx, self.invocation_id, metadata)
    }
}
