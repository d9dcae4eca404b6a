// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Lifecycle of invocations.
//!
//! The state machine is the only writer of invocation statuses, virtual object locks, inboxes
//! and awakeable completions. Each input is applied within one storage transaction; side
//! effects are collected as [`Action`]s and executed by the caller after commit.

mod actions;
mod lifecycle;

#[cfg(test)]
mod tests;

pub use actions::{Action, ActionCollector, TimerKind};

use std::collections::BTreeSet;

use tracing::{debug, trace};

use reprise_storage_api::StorageError;
use reprise_storage_api::fsm_table::FsmTable;
use reprise_storage_api::inbox_table::{InboxEntry, InboxTable};
use reprise_storage_api::invocation_status_table::{
    InFlightInvocationMetadata, InboxedInvocation, InvocationStatus, ReadInvocationStatusTable,
    WriteInvocationStatusTable,
};
use reprise_storage_api::journal_table::{ReadJournalTable, WriteJournalTable};
use reprise_storage_api::service_status_table::{
    ReadVirtualObjectStatusTable, VirtualObjectStatus, WriteVirtualObjectStatusTable,
};
use reprise_types::errors::AWAKEABLE_TIMEOUT_ERROR;
use reprise_types::identifiers::{AwakeableIdentifier, CommandIndex, InvocationId};
use reprise_types::invocation::ServiceInvocation;
use reprise_types::journal::{
    CompletionResult, Entry, JournalEntry, find_awakeable_completion, find_command,
};
use reprise_types::retries::RetryPolicy;
use reprise_types::time::MillisSinceEpoch;

use self::lifecycle::{
    EndInvocationCommand, OnCrashCommand, OnSuspendCommand, ResumeInvocationCommand,
};
use crate::error::{PurgeError, ResolveError};
use crate::handle::ResolveOutcome;
use crate::invoker::{Effect, EffectKind};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Inputs of the state machine that do not answer to a caller.
#[derive(Debug)]
pub enum Command {
    Invoke(ServiceInvocation),
    InvokerEffect(Effect),
    Timer(TimerKind),
}

pub(crate) trait CommandHandler<CTX> {
    async fn apply(self, ctx: CTX) -> Result<(), Error>;
}

pub struct StateMachineApplyContext<'a, S> {
    storage: &'a mut S,
    action_collector: &'a mut ActionCollector,
    record_created_at: MillisSinceEpoch,
}

impl<'a, S> StateMachineApplyContext<'a, S> {
    pub fn new(storage: &'a mut S, action_collector: &'a mut ActionCollector) -> Self {
        Self {
            storage,
            action_collector,
            record_created_at: MillisSinceEpoch::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    retry_policy: RetryPolicy,
}

impl StateMachine {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub async fn apply<S>(
        &self,
        ctx: &mut StateMachineApplyContext<'_, S>,
        command: Command,
    ) -> Result<(), Error>
    where
        S: ReadInvocationStatusTable
            + WriteInvocationStatusTable
            + ReadVirtualObjectStatusTable
            + WriteVirtualObjectStatusTable
            + InboxTable
            + FsmTable
            + ReadJournalTable
            + WriteJournalTable
            + Send,
    {
        match command {
            Command::Invoke(service_invocation) => {
                self.on_service_invocation(ctx, service_invocation).await
            }
            Command::InvokerEffect(effect) => self.on_invoker_effect(ctx, effect).await,
            Command::Timer(TimerKind::RetryInvocation {
                invocation_id,
                invocation_epoch,
            }) => self.on_retry_timer(ctx, invocation_id, invocation_epoch).await,
            Command::Timer(TimerKind::AwakeableExpiry(awakeable_id)) => {
                let outcome = self
                    .complete_awakeable(
                        ctx,
                        awakeable_id,
                        CompletionResult::Failure(AWAKEABLE_TIMEOUT_ERROR),
                    )
                    .await?;
                trace!(%awakeable_id, ?outcome, "Awakeable deadline fired");
                Ok(())
            }
        }
    }

    async fn on_service_invocation<S>(
        &self,
        ctx: &mut StateMachineApplyContext<'_, S>,
        service_invocation: ServiceInvocation,
    ) -> Result<(), Error>
    where
        S: ReadInvocationStatusTable
            + WriteInvocationStatusTable
            + ReadVirtualObjectStatusTable
            + WriteVirtualObjectStatusTable
            + InboxTable
            + FsmTable
            + Send,
    {
        let invocation_id = service_invocation.invocation_id;
        match ctx.storage.get_invocation_status(&invocation_id).await? {
            InvocationStatus::Free => {}
            InvocationStatus::Completed(completed) => {
                trace!(%invocation_id, "Invocation already completed, replying with its result");
                ctx.action_collector.push(Action::IngressResponse {
                    invocation_id,
                    result: completed.response_result,
                });
                return Ok(());
            }
            status => {
                trace!(
                    %invocation_id,
                    status = %status.discriminant(),
                    "Ignoring duplicate invocation"
                );
                return Ok(());
            }
        }

        let service_id = service_invocation.invocation_target.as_service_id();
        match ctx.storage.get_virtual_object_status(&service_id).await? {
            VirtualObjectStatus::Unlocked => {
                debug!(%invocation_id, %service_id, "Effect: Invoke service");
                ctx.storage.put_virtual_object_status(
                    &service_id,
                    &VirtualObjectStatus::Locked(invocation_id),
                )?;
                let metadata = InFlightInvocationMetadata::from_service_invocation(
                    service_invocation,
                    ctx.record_created_at,
                );
                invoke(ctx, invocation_id, metadata)?;
            }
            VirtualObjectStatus::Locked(owner) => {
                let inbox_sequence_number = ctx.storage.get_inbox_seq_number().await?;
                debug!(
                    %invocation_id,
                    %service_id,
                    locked_by = %owner,
                    inbox_sequence_number,
                    "Effect: Enqueue invocation in inbox"
                );
                ctx.storage.put_inbox_entry(
                    &service_id,
                    InboxEntry::new(inbox_sequence_number, invocation_id),
                )?;
                ctx.storage.put_invocation_status(
                    &invocation_id,
                    &InvocationStatus::Inboxed(InboxedInvocation::from_service_invocation(
                        service_invocation,
                        inbox_sequence_number,
                        ctx.record_created_at,
                    )),
                )?;
                ctx.storage
                    .put_inbox_seq_number(inbox_sequence_number + 1)?;
            }
        }
        Ok(())
    }

    async fn on_invoker_effect<S>(
        &self,
        ctx: &mut StateMachineApplyContext<'_, S>,
        effect: Effect,
    ) -> Result<(), Error>
    where
        S: ReadInvocationStatusTable
            + WriteInvocationStatusTable
            + ReadVirtualObjectStatusTable
            + WriteVirtualObjectStatusTable
            + InboxTable
            + ReadJournalTable
            + Send,
    {
        let invocation_id = effect.invocation_id;
        let metadata = match ctx.storage.get_invocation_status(&invocation_id).await? {
            InvocationStatus::Invoked(metadata)
                if metadata.current_invocation_epoch == effect.invocation_epoch =>
            {
                metadata
            }
            status => {
                trace!(
                    %invocation_id,
                    invocation_epoch = effect.invocation_epoch,
                    status = %status.discriminant(),
                    "Ignoring effect of a superseded attempt"
                );
                return Ok(());
            }
        };

        match effect.kind {
            EffectKind::Suspended {
                waiting_for_awakeables,
            } => {
                OnSuspendCommand {
                    invocation_id,
                    metadata,
                    waiting_for_awakeables,
                }
                .apply(ctx)
                .await
            }
            EffectKind::End(value) => {
                EndInvocationCommand {
                    invocation_id,
                    metadata,
                    result: CompletionResult::Success(value),
                }
                .apply(ctx)
                .await
            }
            EffectKind::Failed {
                error,
                retryable: false,
            } => {
                EndInvocationCommand {
                    invocation_id,
                    metadata,
                    result: CompletionResult::Failure(error),
                }
                .apply(ctx)
                .await
            }
            EffectKind::Failed {
                error,
                retryable: true,
            } => {
                OnCrashCommand {
                    invocation_id,
                    metadata,
                    error,
                    retry_policy: &self.retry_policy,
                }
                .apply(ctx)
                .await
            }
        }
    }

    async fn on_retry_timer<S>(
        &self,
        ctx: &mut StateMachineApplyContext<'_, S>,
        invocation_id: InvocationId,
        invocation_epoch: u32,
    ) -> Result<(), Error>
    where
        S: ReadInvocationStatusTable + Send,
    {
        match ctx.storage.get_invocation_status(&invocation_id).await? {
            InvocationStatus::Invoked(metadata)
                if metadata.current_invocation_epoch == invocation_epoch =>
            {
                debug!(
                    %invocation_id,
                    retry_count = metadata.retry_count,
                    "Effect: Retry invocation"
                );
                ctx.action_collector.push(Action::Invoke {
                    invocation_id,
                    invocation_epoch,
                    invocation_target: metadata.invocation_target,
                    argument: metadata.argument,
                });
            }
            _ => trace!(%invocation_id, "Ignoring stale retry timer"),
        }
        Ok(())
    }

    /// Completes the awakeable `awakeable_id`. Only the first completion is recorded; a suspended
    /// invocation waiting for it is resumed.
    pub async fn complete_awakeable<S>(
        &self,
        ctx: &mut StateMachineApplyContext<'_, S>,
        awakeable_id: AwakeableIdentifier,
        result: CompletionResult,
    ) -> Result<Result<ResolveOutcome, ResolveError>, Error>
    where
        S: ReadInvocationStatusTable
            + WriteInvocationStatusTable
            + ReadJournalTable
            + WriteJournalTable
            + Send,
    {
        let (invocation_id, command_index) = awakeable_id.into_inner();
        let status = ctx.storage.get_invocation_status(&invocation_id).await?;
        if matches!(status, InvocationStatus::Free) {
            return Ok(Err(ResolveError::NotFound(awakeable_id)));
        }

        let journal = ctx.storage.get_journal(&invocation_id).await?;
        let Some(JournalEntry {
            entry: Entry::Awakeable { deadline, .. },
            ..
        }) = find_command(&journal, command_index)
        else {
            return Ok(Err(ResolveError::NotFound(awakeable_id)));
        };
        let has_deadline = deadline.is_some();
        if find_awakeable_completion(&journal, command_index).is_some() {
            trace!(%awakeable_id, "Awakeable already completed");
            return Ok(Ok(ResolveOutcome::AlreadyResolved));
        }

        if matches!(status, InvocationStatus::Completed(_)) {
            return Ok(Err(ResolveError::InvocationCompleted(awakeable_id)));
        }

        debug!(
            %invocation_id,
            reprise.journal.command = command_index,
            success = matches!(result, CompletionResult::Success(_)),
            "Effect: Complete awakeable"
        );
        ctx.storage.append_journal_entry(
            &invocation_id,
            JournalEntry::new(
                journal.len() as u32,
                Entry::AwakeableCompletion {
                    command_index,
                    result,
                },
            ),
        )?;
        if has_deadline {
            ctx.action_collector
                .push(Action::DeleteTimer(TimerKind::AwakeableExpiry(awakeable_id)));
        }

        if let InvocationStatus::Suspended {
            metadata,
            waiting_for_awakeables,
        } = status
        {
            if waiting_for_awakeables.contains(&command_index) {
                ResumeInvocationCommand {
                    invocation_id,
                    metadata,
                }
                .apply(ctx)
                .await?;
            }
        }

        Ok(Ok(ResolveOutcome::Resolved))
    }

    /// Removes the journal and the status of a completed invocation.
    pub async fn purge_invocation<S>(
        &self,
        ctx: &mut StateMachineApplyContext<'_, S>,
        invocation_id: InvocationId,
    ) -> Result<Result<(), PurgeError>, Error>
    where
        S: ReadInvocationStatusTable + WriteInvocationStatusTable + WriteJournalTable + Send,
    {
        match ctx.storage.get_invocation_status(&invocation_id).await? {
            InvocationStatus::Completed(_) => {
                debug!(%invocation_id, "Effect: Purge invocation");
                ctx.storage.delete_journal(&invocation_id)?;
                ctx.storage.delete_invocation_status(&invocation_id)?;
                Ok(Ok(()))
            }
            InvocationStatus::Free => Ok(Err(PurgeError::NotFound(invocation_id))),
            _ => Ok(Err(PurgeError::NotCompleted(invocation_id))),
        }
    }

    /// Rebuilds the in-memory side of the persisted state after a (re)start: running invocations
    /// are dispatched again, suspended ones resumed if they were completed meanwhile, and
    /// awakeable deadlines are armed again.
    pub async fn recover<S>(&self, ctx: &mut StateMachineApplyContext<'_, S>) -> Result<(), Error>
    where
        S: ReadInvocationStatusTable + WriteInvocationStatusTable + ReadJournalTable + Send,
    {
        for (invocation_id, status) in ctx.storage.all_invocation_statuses().await? {
            match status {
                InvocationStatus::Invoked(mut metadata) => {
                    debug!(%invocation_id, "Recovery: dispatching running invocation again");
                    metadata.current_invocation_epoch += 1;
                    invoke(ctx, invocation_id, metadata)?;
                }
                InvocationStatus::Suspended {
                    metadata,
                    waiting_for_awakeables,
                } => {
                    let journal = ctx.storage.get_journal(&invocation_id).await?;
                    if any_completed(&journal, &waiting_for_awakeables) {
                        debug!(%invocation_id, "Recovery: resuming suspended invocation");
                        ResumeInvocationCommand {
                            invocation_id,
                            metadata,
                        }
                        .apply(ctx)
                        .await?;
                    } else {
                        trace!(%invocation_id, "Recovery: invocation stays suspended");
                        register_expiry_timers(
                            ctx.action_collector,
                            invocation_id,
                            &journal,
                            &waiting_for_awakeables,
                        );
                    }
                }
                InvocationStatus::Inboxed(_)
                | InvocationStatus::Completed(_)
                | InvocationStatus::Free => {}
            }
        }
        Ok(())
    }
}

/// Stores `metadata` as the running attempt of `invocation_id` and asks for it to be dispatched.
fn invoke<S>(
    ctx: &mut StateMachineApplyContext<'_, S>,
    invocation_id: InvocationId,
    metadata: InFlightInvocationMetadata,
) -> Result<(), Error>
where
    S: WriteInvocationStatusTable,
{
    ctx.action_collector.push(Action::Invoke {
        invocation_id,
        invocation_epoch: metadata.current_invocation_epoch,
        invocation_target: metadata.invocation_target.clone(),
        argument: metadata.argument.clone(),
    });
    ctx.storage
        .put_invocation_status(&invocation_id, &InvocationStatus::Invoked(metadata))?;
    Ok(())
}

fn any_completed(journal: &[JournalEntry], waiting_for: &BTreeSet<CommandIndex>) -> bool {
    waiting_for
        .iter()
        .any(|idx| find_awakeable_completion(journal, *idx).is_some())
}

fn register_expiry_timers(
    action_collector: &mut ActionCollector,
    invocation_id: InvocationId,
    journal: &[JournalEntry],
    waiting_for: &BTreeSet<CommandIndex>,
) {
    for command_index in waiting_for {
        if let Some(JournalEntry {
            entry:
                Entry::Awakeable {
                    deadline: Some(deadline),
                    ..
                },
            ..
        }) = find_command(journal, *command_index)
        {
            action_collector.push(Action::RegisterTimer {
                wake_up_time: *deadline,
                timer: TimerKind::AwakeableExpiry(AwakeableIdentifier::new(
                    invocation_id,
                    *command_index,
                )),
            });
        }
    }
}
