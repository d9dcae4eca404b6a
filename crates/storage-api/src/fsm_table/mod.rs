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

use crate::Result;

/// Variables of the state machine itself.
pub trait FsmTable {
    /// Next sequence number to hand out to an inboxed invocation.
    fn get_inbox_seq_number(&mut self) -> impl Future<Output = Result<u64>> + Send;

    fn put_inbox_seq_number(&mut self, seq_number: u64) -> Result<()>;
}

