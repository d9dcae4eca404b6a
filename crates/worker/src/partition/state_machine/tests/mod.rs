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
use std::time::Duration;

use bytes::Bytes;
use bytestring::ByteString;
use googletest::prelude::*;
use test_log::test;

use reprise_partition_store::PartitionStore;
use reprise_storage_api::invocation_status_table::{
    InvocationStatus, InvocationStatusDiscriminants, ReadInvocationStatusTable,
};
use reprise_storage_api::journal_table::{ReadJournalTable, WriteJournalTable};
use reprise_storage_api::service_status_table::{
    ReadVirtualObjectStatusTable, VirtualObjectStatus,
};
use reprise_storage_api::{Storage, Transaction};
use reprise_test_util::let_assert;
use reprise_types::errors::{InvocationError, codes};
use reprise_types::identifiers::{AwakeableIdentifier, InvocationId, ServiceId};
use reprise_types::invocation::{InvocationTarget, ServiceInvocation};
use reprise_types::journal::{CompletionResult, Entry, JournalEntry};
use reprise_types::retries::RetryPolicy;
use reprise_types::time::MillisSinceEpoch;

use super::*;
use crate::error::{PurgeError, ResolveError};
use crate::handle::ResolveOutcome;
use crate::invoker::{Effect, EffectKind};

struct TestEnv {
    storage: PartitionStore,
    state_machine: StateMachine,
}

impl TestEnv {
    fn create() -> Self {
        Self::with_retry_policy(RetryPolicy::fixed_delay(Duration::from_millis(10), Some(2)))
    }

    fn with_retry_policy(retry_policy: RetryPolicy) -> Self {
        Self {
            storage: PartitionStore::in_memory(),
            state_machine: StateMachine::new(retry_policy),
        }
    }

    async fn apply(&mut self, command: Command) -> Vec<Action> {
        let mut txn = self.storage.transaction().await;
        let mut actions = ActionCollector::new();
        self.state_machine
            .apply(
                &mut StateMachineApplyContext::new(&mut txn, &mut actions),
                command,
            )
            .await
            .unwrap();
        txn.commit().await.unwrap();
        actions
    }

    async fn complete_awakeable(
        &mut self,
        awakeable_id: AwakeableIdentifier,
        result: CompletionResult,
    ) -> (std::result::Result<ResolveOutcome, ResolveError>, Vec<Action>) {
        let mut txn = self.storage.transaction().await;
        let mut actions = ActionCollector::new();
        let outcome = self
            .state_machine
            .complete_awakeable(
                &mut StateMachineApplyContext::new(&mut txn, &mut actions),
                awakeable_id,
                result,
            )
            .await
            .unwrap();
        txn.commit().await.unwrap();
        (outcome, actions)
    }

    async fn purge(
        &mut self,
        invocation_id: InvocationId,
    ) -> std::result::Result<(), PurgeError> {
        let mut txn = self.storage.transaction().await;
        let mut actions = ActionCollector::new();
        let outcome = self
            .state_machine
            .purge_invocation(
                &mut StateMachineApplyContext::new(&mut txn, &mut actions),
                invocation_id,
            )
            .await
            .unwrap();
        txn.commit().await.unwrap();
        outcome
    }

    async fn recover(&mut self) -> Vec<Action> {
        let mut txn = self.storage.transaction().await;
        let mut actions = ActionCollector::new();
        self.state_machine
            .recover(&mut StateMachineApplyContext::new(&mut txn, &mut actions))
            .await
            .unwrap();
        txn.commit().await.unwrap();
        actions
    }

    async fn invoke(&mut self, key: &str) -> (InvocationId, Vec<Action>) {
        let service_invocation = ServiceInvocation::initialize(
            InvocationTarget::virtual_object("ClaimAgent", key.to_owned(), "run"),
            Bytes::from_static(b"{}"),
        );
        let invocation_id = service_invocation.invocation_id;
        let actions = self.apply(Command::Invoke(service_invocation)).await;
        (invocation_id, actions)
    }

    async fn effect(
        &mut self,
        invocation_id: InvocationId,
        invocation_epoch: u32,
        kind: EffectKind,
    ) -> Vec<Action> {
        self.apply(Command::InvokerEffect(Effect {
            invocation_id,
            invocation_epoch,
            kind,
        }))
        .await
    }

    /// Writes a command the way a running attempt does.
    async fn append_command(&self, invocation_id: InvocationId, entry: Entry) {
        let mut txn = self.storage.transaction().await;
        let index = txn.get_journal_length(&invocation_id).await.unwrap();
        txn.append_journal_entry(&invocation_id, JournalEntry::new(index, entry))
            .unwrap();
        txn.commit().await.unwrap();
    }

    async fn status(&self, invocation_id: InvocationId) -> InvocationStatus {
        let mut txn = self.storage.transaction().await;
        txn.get_invocation_status(&invocation_id).await.unwrap()
    }
}

fn awakeable(deadline: Option<MillisSinceEpoch>) -> Entry {
    Entry::Awakeable {
        name: ByteString::new(),
        deadline,
    }
}

fn invoked(actions: &[Action]) -> Vec<(InvocationId, u32)> {
    actions
        .iter()
        .filter_map(|action| match action {
            Action::Invoke {
                invocation_id,
                invocation_epoch,
                ..
            } => Some((*invocation_id, *invocation_epoch)),
            _ => None,
        })
        .collect()
}

fn responses(actions: &[Action]) -> Vec<(InvocationId, CompletionResult)> {
    actions
        .iter()
        .filter_map(|action| match action {
            Action::IngressResponse {
                invocation_id,
                result,
            } => Some((*invocation_id, result.clone())),
            _ => None,
        })
        .collect()
}

fn timers(actions: &[Action]) -> Vec<TimerKind> {
    actions
        .iter()
        .filter_map(|action| match action {
            Action::RegisterTimer { timer, .. } => Some(*timer),
            _ => None,
        })
        .collect()
}

fn suspended(command_index: u32) -> EffectKind {
    EffectKind::Suspended {
        waiting_for_awakeables: BTreeSet::from([command_index]),
    }
}

#[test(tokio::test)]
async fn invocations_on_the_same_key_are_queued() {
    let mut env = TestEnv::create();

    let (first, actions) = env.invoke("alice").await;
    assert_that!(invoked(&actions), eq(&vec![(first, 0)]));

    let (second, actions) = env.invoke("alice").await;
    assert!(actions.is_empty());
    assert_that!(
        env.status(second).await.discriminant(),
        eq(InvocationStatusDiscriminants::Inboxed)
    );

    // other keys are not affected
    let (other, actions) = env.invoke("bob").await;
    assert_that!(invoked(&actions), eq(&vec![(other, 0)]));

    let actions = env
        .effect(first, 0, EffectKind::End(Bytes::from_static(b"1")))
        .await;
    assert_that!(
        responses(&actions),
        eq(&vec![(first, CompletionResult::Success(Bytes::from_static(b"1")))])
    );
    assert_that!(invoked(&actions), eq(&vec![(second, 0)]));

    let mut txn = env.storage.transaction().await;
    assert_that!(
        txn.get_virtual_object_status(&ServiceId::new("ClaimAgent", "alice"))
            .await
            .unwrap(),
        eq(&VirtualObjectStatus::Locked(second))
    );
}

#[test(tokio::test)]
async fn lock_is_released_when_inbox_is_empty() {
    let mut env = TestEnv::create();
    let (invocation_id, _) = env.invoke("alice").await;

    env.effect(
        invocation_id,
        0,
        EffectKind::Failed {
            error: InvocationError::new(codes::BAD_REQUEST, "invalid claim"),
            retryable: false,
        },
    )
    .await;

    let_assert!(InvocationStatus::Completed(completed) = env.status(invocation_id).await);
    assert_that!(
        completed.response_result,
        eq(&CompletionResult::Failure(InvocationError::new(
            codes::BAD_REQUEST,
            "invalid claim"
        )))
    );
    let mut txn = env.storage.transaction().await;
    assert_that!(
        txn.get_virtual_object_status(&ServiceId::new("ClaimAgent", "alice"))
            .await
            .unwrap(),
        eq(&VirtualObjectStatus::Unlocked)
    );
}

#[test(tokio::test)]
async fn suspend_then_complete_awakeable_resumes() {
    let mut env = TestEnv::create();
    let (invocation_id, _) = env.invoke("alice").await;
    env.append_command(invocation_id, awakeable(None)).await;

    let actions = env
        .effect(invocation_id, 0, suspended(0))
        .await;
    let awakeable_id = AwakeableIdentifier::new(invocation_id, 0);
    assert_that!(
        actions,
        eq(&vec![Action::IngressSuspended {
            invocation_id,
            awaiting: vec![awakeable_id],
        }])
    );
    let_assert!(
        InvocationStatus::Suspended {
            waiting_for_awakeables,
            ..
        } = env.status(invocation_id).await
    );
    assert_that!(waiting_for_awakeables, eq(&BTreeSet::from([0])));

    let approved = CompletionResult::Success(Bytes::from_static(b"\"approved\""));
    let (outcome, actions) = env
        .complete_awakeable(awakeable_id, approved.clone())
        .await;
    assert_that!(outcome, eq(&Ok(ResolveOutcome::Resolved)));
    assert_that!(invoked(&actions), eq(&vec![(invocation_id, 1)]));

    // later completions change nothing
    let (outcome, actions) = env
        .complete_awakeable(
            awakeable_id,
            CompletionResult::Success(Bytes::from_static(b"\"rejected\"")),
        )
        .await;
    assert_that!(outcome, eq(&Ok(ResolveOutcome::AlreadyResolved)));
    assert!(actions.is_empty());

    let mut txn = env.storage.transaction().await;
    let journal = txn.get_journal(&invocation_id).await.unwrap();
    assert_that!(journal.len(), eq(2));
    assert_that!(
        journal[1].entry,
        eq(&Entry::AwakeableCompletion {
            command_index: 0,
            result: approved,
        })
    );
}

#[test(tokio::test)]
async fn suspension_is_skipped_if_awakeable_completed_meanwhile() {
    let mut env = TestEnv::create();
    let (invocation_id, _) = env.invoke("alice").await;
    env.append_command(invocation_id, awakeable(None)).await;

    // completed while the attempt is still running
    let (outcome, actions) = env
        .complete_awakeable(
            AwakeableIdentifier::new(invocation_id, 0),
            CompletionResult::Success(Bytes::from_static(b"true")),
        )
        .await;
    assert_that!(outcome, eq(&Ok(ResolveOutcome::Resolved)));
    assert!(actions.is_empty());

    let actions = env
        .effect(invocation_id, 0, suspended(0))
        .await;
    assert_that!(invoked(&actions), eq(&vec![(invocation_id, 1)]));
    assert_that!(
        env.status(invocation_id).await.discriminant(),
        eq(InvocationStatusDiscriminants::Invoked)
    );
}

#[test(tokio::test)]
async fn effects_of_superseded_attempts_are_ignored() {
    let mut env = TestEnv::create();
    let (invocation_id, _) = env.invoke("alice").await;

    let actions = env
        .effect(invocation_id, 7, EffectKind::End(Bytes::from_static(b"1")))
        .await;
    assert!(actions.is_empty());
    assert_that!(
        env.status(invocation_id).await.discriminant(),
        eq(InvocationStatusDiscriminants::Invoked)
    );
}

#[test(tokio::test)]
async fn awakeable_deadline_rejects_with_timeout() {
    let mut env = TestEnv::create();
    let (invocation_id, _) = env.invoke("alice").await;
    let deadline = MillisSinceEpoch::now() + Duration::from_secs(60);
    env.append_command(invocation_id, awakeable(Some(deadline)))
        .await;

    let actions = env
        .effect(invocation_id, 0, suspended(0))
        .await;
    let awakeable_id = AwakeableIdentifier::new(invocation_id, 0);
    assert_that!(
        timers(&actions),
        eq(&vec![TimerKind::AwakeableExpiry(awakeable_id)])
    );

    let actions = env
        .apply(Command::Timer(TimerKind::AwakeableExpiry(awakeable_id)))
        .await;
    assert_that!(invoked(&actions), eq(&vec![(invocation_id, 1)]));

    let mut txn = env.storage.transaction().await;
    let journal = txn.get_journal(&invocation_id).await.unwrap();
    let_assert!(
        Entry::AwakeableCompletion {
            result: CompletionResult::Failure(error),
            ..
        } = &journal[1].entry
    );
    assert_that!(error.code(), eq(codes::TIMEOUT));
    drop(txn);

    // a late resolution loses
    let (outcome, _) = env
        .complete_awakeable(
            awakeable_id,
            CompletionResult::Success(Bytes::from_static(b"\"approved\"")),
        )
        .await;
    assert_that!(outcome, eq(&Ok(ResolveOutcome::AlreadyResolved)));
}

#[test(tokio::test)]
async fn resolving_an_awakeable_deletes_its_deadline() {
    let mut env = TestEnv::create();
    let (invocation_id, _) = env.invoke("alice").await;
    let deadline = MillisSinceEpoch::now() + Duration::from_secs(60);
    env.append_command(invocation_id, awakeable(Some(deadline)))
        .await;
    env.append_command(invocation_id, awakeable(None)).await;
    env.effect(invocation_id, 0, suspended(0)).await;

    let awakeable_id = AwakeableIdentifier::new(invocation_id, 0);
    let (outcome, actions) = env
        .complete_awakeable(
            awakeable_id,
            CompletionResult::Success(Bytes::from_static(b"true")),
        )
        .await;
    assert_that!(outcome, eq(&Ok(ResolveOutcome::Resolved)));
    assert!(actions.contains(&Action::DeleteTimer(TimerKind::AwakeableExpiry(
        awakeable_id
    ))));

    // no deadline, nothing to delete
    let (_, actions) = env
        .complete_awakeable(
            AwakeableIdentifier::new(invocation_id, 1),
            CompletionResult::Success(Bytes::from_static(b"true")),
        )
        .await;
    assert!(
        !actions
            .iter()
            .any(|action| matches!(action, Action::DeleteTimer(_)))
    );
}

#[test(tokio::test)]
async fn crashed_attempts_are_retried_until_exhausted() {
    let mut env = TestEnv::create();
    let (invocation_id, _) = env.invoke("alice").await;
    let crash = || EffectKind::Failed {
        error: InvocationError::internal("handler panicked: boom"),
        retryable: true,
    };

    let actions = env.effect(invocation_id, 0, crash()).await;
    assert_that!(
        timers(&actions),
        eq(&vec![TimerKind::RetryInvocation {
            invocation_id,
            invocation_epoch: 1
        }])
    );
    let actions = env
        .apply(Command::Timer(TimerKind::RetryInvocation {
            invocation_id,
            invocation_epoch: 1,
        }))
        .await;
    assert_that!(invoked(&actions), eq(&vec![(invocation_id, 1)]));

    let actions = env.effect(invocation_id, 1, crash()).await;
    assert_that!(timers(&actions).len(), eq(1));
    env.apply(Command::Timer(TimerKind::RetryInvocation {
        invocation_id,
        invocation_epoch: 2,
    }))
    .await;

    // the policy allows two retries
    let actions = env.effect(invocation_id, 2, crash()).await;
    let responses = responses(&actions);
    assert_that!(responses.len(), eq(1));
    let_assert!(CompletionResult::Failure(error) = &responses[0].1);
    assert_that!(error.code(), eq(codes::ABORTED));
    assert!(error.message().contains("boom"));
}

#[test(tokio::test)]
async fn stale_retry_timer_is_ignored() {
    let mut env = TestEnv::with_retry_policy(RetryPolicy::None);
    let (invocation_id, _) = env.invoke("alice").await;

    let actions = env
        .apply(Command::Timer(TimerKind::RetryInvocation {
            invocation_id,
            invocation_epoch: 3,
        }))
        .await;
    assert!(actions.is_empty());
}

#[test(tokio::test)]
async fn complete_awakeable_errors() {
    let mut env = TestEnv::create();

    let unknown = AwakeableIdentifier::new(InvocationId::generate(), 0);
    let (outcome, _) = env
        .complete_awakeable(unknown, CompletionResult::Success(Bytes::new()))
        .await;
    assert_that!(outcome, eq(&Err(ResolveError::NotFound(unknown))));

    let (invocation_id, _) = env.invoke("alice").await;
    env.append_command(
        invocation_id,
        Entry::Run {
            name: ByteString::from_static("A"),
            result: CompletionResult::Success(Bytes::from_static(b"1")),
        },
    )
    .await;
    env.append_command(invocation_id, awakeable(None)).await;

    // command 0 is a step, not an awakeable
    let not_an_awakeable = AwakeableIdentifier::new(invocation_id, 0);
    let (outcome, _) = env
        .complete_awakeable(not_an_awakeable, CompletionResult::Success(Bytes::new()))
        .await;
    assert_that!(outcome, eq(&Err(ResolveError::NotFound(not_an_awakeable))));

    env.effect(invocation_id, 0, EffectKind::End(Bytes::new()))
        .await;
    let awakeable_id = AwakeableIdentifier::new(invocation_id, 1);
    let (outcome, _) = env
        .complete_awakeable(awakeable_id, CompletionResult::Success(Bytes::new()))
        .await;
    assert_that!(
        outcome,
        eq(&Err(ResolveError::InvocationCompleted(awakeable_id)))
    );
}

#[test(tokio::test)]
async fn purge_removes_completed_invocations_only() {
    let mut env = TestEnv::create();
    let (invocation_id, _) = env.invoke("alice").await;
    env.append_command(invocation_id, awakeable(None)).await;

    assert_that!(
        env.purge(invocation_id).await,
        eq(&Err(PurgeError::NotCompleted(invocation_id)))
    );

    env.effect(invocation_id, 0, EffectKind::End(Bytes::new()))
        .await;
    assert_that!(env.purge(invocation_id).await, eq(&Ok(())));
    assert_that!(env.status(invocation_id).await, eq(&InvocationStatus::Free));

    let mut txn = env.storage.transaction().await;
    assert_that!(txn.get_journal_length(&invocation_id).await.unwrap(), eq(0));
    drop(txn);

    assert_that!(
        env.purge(invocation_id).await,
        eq(&Err(PurgeError::NotFound(invocation_id)))
    );
    // awakeables of purged invocations are unreachable
    let (outcome, _) = env
        .complete_awakeable(
            AwakeableIdentifier::new(invocation_id, 0),
            CompletionResult::Success(Bytes::new()),
        )
        .await;
    assert_that!(
        outcome,
        eq(&Err(ResolveError::NotFound(AwakeableIdentifier::new(
            invocation_id,
            0
        ))))
    );
}

#[test(tokio::test)]
async fn recovery_redispatches_and_rearms_timers() {
    let mut env = TestEnv::create();
    let (running, _) = env.invoke("alice").await;
    let (waiting, _) = env.invoke("bob").await;
    let (resolved, _) = env.invoke("carol").await;
    let deadline = MillisSinceEpoch::now() + Duration::from_secs(60);

    env.append_command(waiting, awakeable(Some(deadline))).await;
    env.effect(waiting, 0, suspended(0)).await;

    env.append_command(resolved, awakeable(None)).await;
    env.effect(resolved, 0, suspended(0)).await;
    // completion committed, but the resume action was lost with the process
    env.complete_awakeable(
        AwakeableIdentifier::new(resolved, 0),
        CompletionResult::Success(Bytes::from_static(b"1")),
    )
    .await;

    let mut env = TestEnv {
        storage: env.storage.clone(),
        state_machine: StateMachine::new(RetryPolicy::None),
    };
    let actions = env.recover().await;

    let mut invoked = invoked(&actions);
    invoked.sort();
    let mut expected = vec![(running, 1), (resolved, 2)];
    expected.sort();
    assert_that!(invoked, eq(&expected));
    assert_that!(
        timers(&actions),
        eq(&vec![TimerKind::AwakeableExpiry(AwakeableIdentifier::new(
            waiting, 0
        ))])
    );
}
