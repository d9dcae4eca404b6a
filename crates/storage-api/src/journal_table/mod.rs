// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::future::Future;

use reprise_types::identifiers::{EntryIndex, InvocationId};
use reprise_types::journal::JournalEntry;

use crate::Result;

pub trait ReadJournalTable {
    /// Entries of the journal in index order, empty if the invocation has no journal.
    fn get_journal(
        &mut self,
        invocation_id: &InvocationId,
    ) -> impl Future<Output = Result<Vec<JournalEntry>>> + Send;

    fn get_journal_length(
        &mut self,
        invocation_id: &InvocationId,
    ) -> impl Future<Output = Result<EntryIndex>> + Send;
}

pub trait WriteJournalTable {
    /// Appends `entry`. Fails with [`crate::StorageError::PreconditionFailed`] unless
    /// `entry.index` equals the current journal length: journals are dense and immutable.
    fn append_journal_entry(
        &mut self,
        invocation_id: &InvocationId,
        entry: JournalEntry,
    ) -> Result<()>;

    fn delete_journal(&mut self, invocation_id: &InvocationId) -> Result<()>;
}
