// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use reprise_types::errors::codes;
use reprise_worker::{HandlerError, TerminalError, Tool, ToolContext};

use crate::agent::{CHECK_ELIGIBILITY, HUMAN_APPROVAL, InsuranceClaim};

fn claim_input(mut input: Value) -> Result<InsuranceClaim, HandlerError> {
    serde_json::from_value(input["claim"].take()).map_err(|err| {
        TerminalError::new_with_code(
            codes::BAD_REQUEST,
            format!("tool input is not a claim: {err}"),
        )
        .into()
    })
}

/// Checks eligibility against the policy. Claims without a reason or with a non-positive
/// amount are not eligible.
#[derive(Debug, Default)]
pub struct CheckEligibility;

#[async_trait]
impl Tool for CheckEligibility {
    fn name(&self) -> &str {
        CHECK_ELIGIBILITY
    }

    fn description(&self) -> &str {
        "Check claim eligibility"
    }

    async fn call(&self, ctx: ToolContext, input: Value) -> Result<Value, HandlerError> {
        let claim = claim_input(input)?;
        let eligible: bool = ctx
            .run_step("Check eligibility", || async move {
                Ok::<_, TerminalError>(claim.amount > 0.0 && !claim.reason.trim().is_empty())
            })
            .await?;
        Ok(Value::Bool(eligible))
    }
}

/// Asks a human reviewer and suspends until they answer with `true` or `false`.
#[derive(Debug, Default)]
pub struct HumanApproval;

#[async_trait]
impl Tool for HumanApproval {
    fn name(&self) -> &str {
        HUMAN_APPROVAL
    }

    fn description(&self) -> &str {
        "Ask for human approval for high-value claims"
    }

    async fn call(&self, ctx: ToolContext, input: Value) -> Result<Value, HandlerError> {
        let claim = claim_input(input)?;
        let (approval_id, approval) = ctx.create_promise::<bool>("human approval").await?;

        ctx.run_step("Request review", || async move {
            info!(%approval_id, amount = claim.amount, "Review requested");
            println!(
                "Review requested for {} claim of {:.2} ({}).",
                claim.category, claim.amount, claim.reason
            );
            println!("Submit via:");
            println!("  claim-agent approve {approval_id}");
            println!("  claim-agent reject {approval_id}");
            Ok::<_, TerminalError>(())
        })
        .await?;

        Ok(Value::Bool(approval.await?))
    }
}
