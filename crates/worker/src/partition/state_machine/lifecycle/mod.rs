// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

mod crash;
mod end;
mod resume;
mod suspend;

pub(super) use crash::OnCrashCommand;
pub(super) use end::EndInvocationCommand;
pub(super) use resume::ResumeInvocationCommand;
pub(super) use suspend::OnSuspendCommand;
