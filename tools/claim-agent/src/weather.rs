// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Minimal agent with a single durable tool.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{Value, json};
use tracing::debug;

use reprise_types::errors::codes;
use reprise_types::invocation::InvocationTarget;
use reprise_worker::{
    HandlerError, ObjectContext, TerminalError, Tool, ToolContext, ToolRegistry, VirtualObject,
};

use crate::agent::{AgentStep, Observation};
use crate::session::{AgentSession, SessionEvent, observations, session_state_key, user_text};

pub const WEATHER_SERVICE_NAME: &str = "WeatherAgent";
pub const GET_WEATHER: &str = "get_weather";
/// The weather agent keeps one conversation per key.
pub const WEATHER_SESSION_ID: &str = "session";

static WEATHER_TOOLS: Lazy<ToolRegistry> = Lazy::new(|| ToolRegistry::new().with_tool(GetWeather));

pub fn weather_target(key: &str) -> InvocationTarget {
    InvocationTarget::virtual_object(WEATHER_SERVICE_NAME, key.to_owned(), "run")
}

pub fn weather_agent() -> VirtualObject {
    VirtualObject::new(WEATHER_SERVICE_NAME).handler("run", run)
}

#[derive(Debug, Default)]
pub struct GetWeather;

#[async_trait]
impl Tool for GetWeather {
    fn name(&self) -> &str {
        GET_WEATHER
    }

    fn description(&self) -> &str {
        "Get the current weather for a city"
    }

    async fn call(&self, ctx: ToolContext, input: Value) -> Result<Value, HandlerError> {
        let Some(city) = input["city"].as_str().map(str::to_owned) else {
            return Err(
                TerminalError::new_with_code(codes::BAD_REQUEST, "tool input has no city").into(),
            );
        };
        let report: String = ctx
            .run_step("Get weather", || async move {
                Ok::<_, TerminalError>(format!("The weather in {city} is sunny, 72°F"))
            })
            .await?;
        Ok(Value::String(report))
    }
}

/// The city a message asks about: whatever follows its last " in ".
pub fn city_of(message: &str) -> Option<String> {
    let lowercase = message.to_lowercase();
    let start = lowercase.rfind(" in ")? + " in ".len();
    let city = message
        .get(start..)?
        .trim()
        .trim_end_matches(['?', '.', '!']);
    (!city.is_empty()).then(|| city.to_owned())
}

pub fn next_weather_step(session: &AgentSession) -> AgentStep {
    let open = session.since(|event| matches!(event, SessionEvent::Agent { .. }));
    if let Some(Observation { output, .. }) = observations(open).last() {
        return AgentStep::Respond {
            message: output.as_str().unwrap_or_default().to_owned(),
        };
    }
    match city_of(&user_text(open)) {
        Some(city) => AgentStep::CallTool {
            tool: GET_WEATHER.to_owned(),
            input: json!({ "city": city }),
        },
        None => AgentStep::Respond {
            message: "Which city would you like the weather for?".to_owned(),
        },
    }
}

async fn run(ctx: ObjectContext, message: String) -> Result<String, HandlerError> {
    let session_key = session_state_key(WEATHER_SESSION_ID);
    let mut session: AgentSession = ctx.get(&session_key).await?.unwrap_or_default();
    session.push(SessionEvent::User { message });
    ctx.set(&session_key, &session).await?;
    let tool_ctx = ctx.tool_context();

    let mut turn = 0u32;
    loop {
        let step: AgentStep = ctx
            .run(format!("Agent turn {turn}"), || async {
                Ok::<_, TerminalError>(next_weather_step(&session))
            })
            .await?;

        match step {
            AgentStep::CallTool { tool, input } => {
                debug!(key = %ctx.key(), turn, "Weather agent calls tool '{tool}'");
                let output = WEATHER_TOOLS.call(&tool_ctx, &tool, input).await?;
                session.push(SessionEvent::Tool(Observation { tool, output }));
            }
            AgentStep::Respond { message } => {
                session.push(SessionEvent::Agent {
                    message: message.clone(),
                });
                ctx.set(&session_key, &session).await?;
                return Ok(message);
            }
            AgentStep::Finish(decision) => {
                return Err(TerminalError::new(format!(
                    "weather agent cannot decide claims: {}",
                    decision.explanation()
                ))
                .into());
            }
        }
        turn += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_the_city() {
        assert_eq!(
            city_of("What is the weather in Paris?").as_deref(),
            Some("Paris")
        );
        assert_eq!(
            city_of("Weather IN New York.").as_deref(),
            Some("New York")
        );
        assert_eq!(city_of("How is the weather?"), None);
        assert_eq!(city_of("is it raining in ?"), None);
    }

    #[test]
    fn answers_with_the_tool_output() {
        let mut session = AgentSession::default();
        session.push(SessionEvent::User {
            message: "weather in Berlin".to_owned(),
        });
        let AgentStep::CallTool { tool, input } = next_weather_step(&session) else {
            panic!("agent must look the weather up");
        };
        assert_eq!(tool, GET_WEATHER);
        assert_eq!(input, json!({ "city": "Berlin" }));

        session.push(SessionEvent::Tool(Observation {
            tool,
            output: json!("The weather in Berlin is sunny, 72°F"),
        }));
        assert_eq!(
            next_weather_step(&session),
            AgentStep::Respond {
                message: "The weather in Berlin is sunny, 72°F".to_owned()
            }
        );
    }
}
