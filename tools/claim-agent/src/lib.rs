// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Insurance claim approval agent.
//!
//! The `ClaimAgent` virtual object holds the chat sessions of one user. Each message continues
//! the session it names, restored from object state. Every agent turn and every tool side
//! effect is journaled, so a claim waiting for a human reviewer survives the process exiting
//! and continues when the reviewer answers.

mod agent;
mod session;
mod tools;
mod weather;

pub use agent::{AgentStep, ClaimApprovalAgent, ClaimDecision, InsuranceClaim, Observation};
pub use session::{AgentSession, ChatMessage, DEFAULT_SESSION_ID, SessionEvent, session_state_key};
pub use tools::{CheckEligibility, HumanApproval};
pub use weather::{
    GET_WEATHER, GetWeather, WEATHER_SERVICE_NAME, WEATHER_SESSION_ID, weather_agent,
    weather_target,
};

use once_cell::sync::Lazy;
use tracing::debug;

use reprise_types::identifiers::ServiceId;
use reprise_types::invocation::InvocationTarget;
use reprise_worker::{
    HandlerError, ObjectContext, ServiceRegistry, TerminalError, ToolRegistry, VirtualObject,
};

pub const SERVICE_NAME: &str = "ClaimAgent";
/// Last claim the agent worked on.
pub const CLAIM_STATE: &str = "claim";
/// Last decision taken, in any session.
pub const DECISION_STATE: &str = "decision";

static AGENT: Lazy<ClaimApprovalAgent> = Lazy::new(ClaimApprovalAgent::default);

static TOOLS: Lazy<ToolRegistry> = Lazy::new(|| {
    ToolRegistry::new()
        .with_tool(HumanApproval)
        .with_tool(CheckEligibility)
});

pub fn run_target(user_id: &str) -> InvocationTarget {
    InvocationTarget::virtual_object(SERVICE_NAME, user_id.to_owned(), "run")
}

pub fn service_id(user_id: &str) -> ServiceId {
    ServiceId::new(SERVICE_NAME, user_id.to_owned())
}

pub fn claim_agent() -> VirtualObject {
    VirtualObject::new(SERVICE_NAME).handler("run", run)
}

pub fn registry() -> ServiceRegistry {
    ServiceRegistry::new()
        .with_object(claim_agent())
        .with_object(weather_agent())
}

async fn run(ctx: ObjectContext, message: ChatMessage) -> Result<String, HandlerError> {
    let session_key = session_state_key(&message.session_id);
    let mut session: AgentSession = ctx.get(&session_key).await?.unwrap_or_default();
    session.push(SessionEvent::User {
        message: message.message,
    });
    ctx.set(&session_key, &session).await?;
    if let Some(claim) = AGENT.pending_claim(&session) {
        ctx.set(CLAIM_STATE, &claim).await?;
    }
    let tool_ctx = ctx.tool_context();

    let mut turn = 0u32;
    loop {
        let step: AgentStep = ctx
            .run(format!("Agent turn {turn}"), || async {
                Ok::<_, TerminalError>(AGENT.next_step(&session))
            })
            .await?;

        match step {
            AgentStep::CallTool { tool, input } => {
                debug!(
                    user = %ctx.key(),
                    session = %message.session_id,
                    turn,
                    "Agent calls tool '{tool}'"
                );
                let output = TOOLS.call(&tool_ctx, &tool, input).await?;
                session.push(SessionEvent::Tool(Observation { tool, output }));
                ctx.set(&session_key, &session).await?;
            }
            AgentStep::Respond { message } => {
                session.push(SessionEvent::Agent {
                    message: message.clone(),
                });
                ctx.set(&session_key, &session).await?;
                return Ok(message);
            }
            AgentStep::Finish(decision) => {
                let explanation = decision.explanation().to_owned();
                ctx.set(DECISION_STATE, &decision).await?;
                session.push(SessionEvent::Decision(decision));
                ctx.set(&session_key, &session).await?;
                return Ok(explanation);
            }
        }
        turn += 1;
    }
}
