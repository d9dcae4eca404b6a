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
use bytestring::ByteString;
use googletest::prelude::*;
use test_log::test;

use reprise_storage_api::inbox_table::{InboxEntry, InboxTable};
use reprise_storage_api::invocation_status_table::{
    InFlightInvocationMetadata, InvocationStatus, ReadInvocationStatusTable,
    WriteInvocationStatusTable,
};
use reprise_storage_api::journal_table::{ReadJournalTable, WriteJournalTable};
use reprise_storage_api::service_status_table::{
    ReadVirtualObjectStatusTable, VirtualObjectStatus, WriteVirtualObjectStatusTable,
};
use reprise_storage_api::state_table::{ReadStateTable, WriteStateTable};
use reprise_storage_api::fsm_table::FsmTable;
use reprise_storage_api::{Storage, StorageError, Transaction};
use reprise_types::identifiers::{InvocationId, ServiceId};
use reprise_types::invocation::{InvocationTarget, ServiceInvocation};
use reprise_types::journal::{CompletionResult, Entry, JournalEntry};
use reprise_types::time::MillisSinceEpoch;

use crate::PartitionStore;

fn run_entry(index: u32, name: &'static str, value: &'static [u8]) -> JournalEntry {
    JournalEntry::new(
        index,
        Entry::Run {
            name: ByteString::from_static(name),
            result: CompletionResult::Success(Bytes::from_static(value)),
        },
    )
}

fn invoked_status() -> InvocationStatus {
    InvocationStatus::Invoked(InFlightInvocationMetadata::from_service_invocation(
        ServiceInvocation::initialize(
            InvocationTarget::virtual_object("ClaimAgent", "alice", "run"),
            Bytes::from_static(b"{}"),
        ),
        MillisSinceEpoch::now(),
    ))
}

#[test(tokio::test)]
async fn journal_is_dense_and_append_only() {
    let store = PartitionStore::in_memory();
    let invocation_id = InvocationId::generate();

    let mut txn = store.transaction().await;
    txn.append_journal_entry(&invocation_id, run_entry(0, "A", b"1"))
        .unwrap();
    let err = txn
        .append_journal_entry(&invocation_id, run_entry(2, "B", b"2"))
        .unwrap_err();
    assert_that!(err, pat!(StorageError::PreconditionFailed(_)));
    let err = txn
        .append_journal_entry(&invocation_id, run_entry(0, "B", b"2"))
        .unwrap_err();
    assert_that!(err, pat!(StorageError::PreconditionFailed(_)));
    txn.append_journal_entry(&invocation_id, run_entry(1, "B", b"2"))
        .unwrap();
    txn.commit().await.unwrap();

    let mut txn = store.transaction().await;
    assert_that!(txn.get_journal_length(&invocation_id).await.unwrap(), eq(2));
    let journal = txn.get_journal(&invocation_id).await.unwrap();
    assert_eq!(
        journal.iter().map(|e| e.entry.name()).collect::<Vec<_>>(),
        vec![Some("A"), Some("B")]
    );

    txn.delete_journal(&invocation_id).unwrap();
    assert_that!(txn.get_journal_length(&invocation_id).await.unwrap(), eq(0));
}

#[test(tokio::test)]
async fn dropped_transaction_rolls_back() {
    let store = PartitionStore::in_memory();
    let service_id = ServiceId::new("ClaimAgent", "alice");
    let invocation_id = InvocationId::generate();

    {
        let mut txn = store.transaction().await;
        txn.put_user_state(&service_id, "claim".into(), Bytes::from_static(b"1"))
            .unwrap();
        txn.append_journal_entry(&invocation_id, run_entry(0, "A", b"1"))
            .unwrap();
        txn.put_virtual_object_status(&service_id, &VirtualObjectStatus::Locked(invocation_id))
            .unwrap();
        // dropped without commit
    }

    let mut txn = store.transaction().await;
    assert_that!(
        txn.get_user_state(&service_id, "claim").await.unwrap(),
        none()
    );
    assert_that!(txn.get_journal_length(&invocation_id).await.unwrap(), eq(0));
    assert_that!(
        txn.get_virtual_object_status(&service_id).await.unwrap(),
        eq(&VirtualObjectStatus::Unlocked)
    );
}

#[test(tokio::test)]
async fn rollback_restores_overwritten_and_deleted_entries() {
    let store = PartitionStore::in_memory();
    let alice = ServiceId::new("ClaimAgent", "alice");
    let invocation_id = InvocationId::generate();
    let inbox_entry = InboxEntry::new(0, InvocationId::generate());

    let mut txn = store.transaction().await;
    txn.put_user_state(&alice, "k1".into(), Bytes::from_static(b"v1"))
        .unwrap();
    txn.put_user_state(&alice, "k2".into(), Bytes::from_static(b"v2"))
        .unwrap();
    txn.append_journal_entry(&invocation_id, run_entry(0, "A", b"1"))
        .unwrap();
    txn.put_invocation_status(&invocation_id, &invoked_status())
        .unwrap();
    txn.put_inbox_entry(&alice, inbox_entry.clone()).unwrap();
    txn.put_inbox_seq_number(1).unwrap();
    txn.commit().await.unwrap();

    {
        let mut txn = store.transaction().await;
        txn.put_user_state(&alice, "k1".into(), Bytes::from_static(b"changed"))
            .unwrap();
        txn.delete_user_state(&alice, "k2").unwrap();
        txn.put_user_state(&alice, "k3".into(), Bytes::from_static(b"new"))
            .unwrap();
        txn.delete_all_user_state(&alice).unwrap();
        txn.append_journal_entry(&invocation_id, run_entry(1, "B", b"2"))
            .unwrap();
        txn.delete_journal(&invocation_id).unwrap();
        txn.put_invocation_status(&invocation_id, &InvocationStatus::Free)
            .unwrap();
        txn.delete_inbox_entry(&alice, 0).unwrap();
        txn.put_inbox_seq_number(7).unwrap();
        // dropped without commit
    }

    let mut txn = store.transaction().await;
    assert_that!(
        txn.get_all_user_states_for_service(&alice).await.unwrap(),
        eq(&vec![
            (ByteString::from_static("k1"), Bytes::from_static(b"v1")),
            (ByteString::from_static("k2"), Bytes::from_static(b"v2")),
        ])
    );
    let journal = txn.get_journal(&invocation_id).await.unwrap();
    assert_eq!(
        journal.iter().map(|e| e.entry.name()).collect::<Vec<_>>(),
        vec![Some("A")]
    );
    assert_that!(
        txn.get_invocation_status(&invocation_id).await.unwrap(),
        pat!(InvocationStatus::Invoked(_))
    );
    assert_that!(txn.inbox(&alice).await.unwrap(), eq(&vec![inbox_entry]));
    assert_that!(txn.get_inbox_seq_number().await.unwrap(), eq(1));
}

#[test(tokio::test)]
async fn failed_file_write_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = PartitionStore::open(dir.path().join("missing").join("store.json")).unwrap();
    let alice = ServiceId::new("ClaimAgent", "alice");

    let mut txn = store.transaction().await;
    txn.put_user_state(&alice, "k1".into(), Bytes::from_static(b"v1"))
        .unwrap();
    let err = txn.commit().await.unwrap_err();
    assert_that!(err, pat!(StorageError::Generic(_)));

    let mut txn = store.transaction().await;
    assert_that!(txn.get_user_state(&alice, "k1").await.unwrap(), none());
}

#[test(tokio::test)]
async fn user_state_read_write() {
    let store = PartitionStore::in_memory();
    let alice = ServiceId::new("ClaimAgent", "alice");
    let bob = ServiceId::new("ClaimAgent", "bob");

    let mut txn = store.transaction().await;
    txn.put_user_state(&alice, "k1".into(), Bytes::from_static(b"v1"))
        .unwrap();
    txn.put_user_state(&alice, "k2".into(), Bytes::from_static(b"v2"))
        .unwrap();
    txn.put_user_state(&bob, "k1".into(), Bytes::from_static(b"other"))
        .unwrap();
    txn.commit().await.unwrap();

    let mut txn = store.transaction().await;
    assert_that!(
        txn.get_user_state(&alice, "k1").await.unwrap(),
        some(eq(&Bytes::from_static(b"v1")))
    );
    assert_eq!(
        txn.get_all_user_states_for_service(&alice).await.unwrap(),
        vec![
            (ByteString::from_static("k1"), Bytes::from_static(b"v1")),
            (ByteString::from_static("k2"), Bytes::from_static(b"v2")),
        ]
    );

    txn.delete_user_state(&alice, "k2").unwrap();
    assert_that!(txn.get_user_state(&alice, "k2").await.unwrap(), none());

    txn.delete_all_user_state(&alice).unwrap();
    assert!(
        txn.get_all_user_states_for_service(&alice)
            .await
            .unwrap()
            .is_empty()
    );
    assert_that!(
        txn.get_user_state(&bob, "k1").await.unwrap(),
        some(eq(&Bytes::from_static(b"other")))
    );
}

#[test(tokio::test)]
async fn inbox_is_fifo_per_service() {
    let store = PartitionStore::in_memory();
    let alice = ServiceId::new("ClaimAgent", "alice");
    let bob = ServiceId::new("ClaimAgent", "bob");
    let (first, second, third) = (
        InvocationId::generate(),
        InvocationId::generate(),
        InvocationId::generate(),
    );

    let mut txn = store.transaction().await;
    txn.put_inbox_entry(&alice, InboxEntry::new(7, second)).unwrap();
    txn.put_inbox_entry(&alice, InboxEntry::new(3, first)).unwrap();
    txn.put_inbox_entry(&bob, InboxEntry::new(5, third)).unwrap();

    assert_that!(
        txn.inbox(&alice)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.invocation_id)
            .collect::<Vec<_>>(),
        eq(&vec![first, second])
    );
    assert_that!(
        txn.pop_inbox(&alice).await.unwrap(),
        some(eq(&InboxEntry::new(3, first)))
    );
    assert_that!(
        txn.peek_inbox(&alice).await.unwrap(),
        some(eq(&InboxEntry::new(7, second)))
    );
    txn.delete_inbox_entry(&alice, 7).unwrap();
    assert_that!(txn.pop_inbox(&alice).await.unwrap(), none());
    assert_that!(
        txn.peek_inbox(&bob).await.unwrap(),
        some(eq(&InboxEntry::new(5, third)))
    );
}

#[test(tokio::test)]
async fn free_status_is_not_stored() {
    let store = PartitionStore::in_memory();
    let invocation_id = InvocationId::generate();

    let mut txn = store.transaction().await;
    txn.put_invocation_status(&invocation_id, &invoked_status())
        .unwrap();
    assert_that!(txn.all_invocation_statuses().await.unwrap().len(), eq(1));

    txn.put_invocation_status(&invocation_id, &InvocationStatus::Free)
        .unwrap();
    assert!(txn.all_invocation_statuses().await.unwrap().is_empty());
    assert_that!(
        txn.get_invocation_status(&invocation_id).await.unwrap(),
        eq(&InvocationStatus::Free)
    );
}

#[test(tokio::test)]
async fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let service_id = ServiceId::new("ClaimAgent", "alice");
    let invocation_id = InvocationId::generate();
    let status = invoked_status();

    {
        let store = PartitionStore::open(&path).unwrap();
        let mut txn = store.transaction().await;
        txn.append_journal_entry(&invocation_id, run_entry(0, "A", b"1"))
            .unwrap();
        txn.put_invocation_status(&invocation_id, &status).unwrap();
        txn.put_virtual_object_status(&service_id, &VirtualObjectStatus::Locked(invocation_id))
            .unwrap();
        txn.put_inbox_entry(&service_id, InboxEntry::new(0, InvocationId::generate()))
            .unwrap();
        txn.put_user_state(&service_id, "claim".into(), Bytes::from_static(b"{\"amount\":5}"))
            .unwrap();
        txn.put_inbox_seq_number(1).unwrap();
        txn.commit().await.unwrap();

        // uncommitted writes never reach the file
        let mut txn = store.transaction().await;
        txn.append_journal_entry(&invocation_id, run_entry(1, "B", b"2"))
            .unwrap();
    }

    let store = PartitionStore::open(&path).unwrap();
    let mut txn = store.transaction().await;
    let journal = txn.get_journal(&invocation_id).await.unwrap();
    assert_that!(journal.len(), eq(1));
    assert_that!(journal[0].entry.name(), some(eq("A")));
    assert_that!(
        txn.get_invocation_status(&invocation_id).await.unwrap(),
        eq(&status)
    );
    assert_that!(
        txn.get_virtual_object_status(&service_id).await.unwrap(),
        eq(&VirtualObjectStatus::Locked(invocation_id))
    );
    assert_that!(txn.inbox(&service_id).await.unwrap().len(), eq(1));
    assert_that!(txn.get_inbox_seq_number().await.unwrap(), eq(1));
    assert_that!(
        txn.get_user_state(&service_id, "claim").await.unwrap(),
        some(eq(&Bytes::from_static(b"{\"amount\":5}")))
    );
}

#[test(tokio::test)]
async fn corrupted_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    std::fs::write(&path, b"not json").unwrap();

    assert_that!(
        PartitionStore::open(&path),
        err(pat!(StorageError::Conversion(_)))
    );
}
