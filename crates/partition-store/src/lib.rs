// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

pub mod fsm_table;
pub mod inbox_table;
pub mod invocation_status_table;
pub mod journal_table;
mod partition_store;
pub mod service_status_table;
pub mod state_table;

pub use partition_store::*;

#[cfg(test)]
mod tests;
