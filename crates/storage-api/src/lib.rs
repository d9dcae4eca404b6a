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

use reprise_types::errors::MaybeRetryableError;

/// Storage error
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("generic storage error: {0}")]
    Generic(#[from] anyhow::Error),
    #[error("failed to convert Rust objects to/from their persisted form: {0}")]
    Conversion(anyhow::Error),
    #[error("integrity constraint is violated")]
    DataIntegrityError,
    #[error("operational error that can be caused during a graceful shutdown")]
    OperationalError,
    #[error("precondition failed: {0}")]
    PreconditionFailed(anyhow::Error),
}

impl MaybeRetryableError for StorageError {
    fn retryable(&self) -> bool {
        matches!(self, StorageError::Generic(_) | StorageError::OperationalError)
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub mod fsm_table;
pub mod inbox_table;
pub mod invocation_status_table;
pub mod journal_table;
pub mod service_status_table;
pub mod state_table;

pub trait Storage {
    type TransactionType: Transaction + 'static;

    /// Starts a transaction. Transactions are isolated from each other: a transaction that is
    /// alive excludes every other one until it is committed or dropped. Dropping a transaction
    /// without committing discards its writes.
    fn transaction(&self) -> impl Future<Output = Self::TransactionType> + Send;
}

pub trait Transaction:
    state_table::ReadStateTable
    + state_table::WriteStateTable
    + invocation_status_table::ReadInvocationStatusTable
    + invocation_status_table::WriteInvocationStatusTable
    + service_status_table::ReadVirtualObjectStatusTable
    + service_status_table::WriteVirtualObjectStatusTable
    + inbox_table::InboxTable
    + journal_table::ReadJournalTable
    + journal_table::WriteJournalTable
    + fsm_table::FsmTable
    + Send
{
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}
