//! Decision-maker: a vision-language model that looks at the grid and answers
//! with the next batch of arm actions.
//!
//! The model answers in free text that contains one JSON object. Everything
//! from the first `{` to the last `}` is parsed into a [`DecisionResponse`];
//! anything else is a [`CoreError::MalformedDecision`] for that step only.

use crate::config::DecisionConfig;
use crate::context::{InteractionContext, Turn, REDACTED_OBSERVATION};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// System prompt describing the grid, the action vocabulary and the reply format.
pub const SYSTEM_PROMPT: &str = r#"You control a four-axis robotic arm above a table. The user's task arrives in the first message between <instruction></instruction> tags, together with a camera image of the table.

The table carries a 3x3 grid of colored squares. This grid is your only coordinate system:
      | Arm Base |
red    | green | blue
yellow | cyan  | magenta
black  | white | orange

Reply with a single JSON object and nothing else:
{
"observation": "What you see, and what changed since the previous image",
"carrying_object": "Object currently in the gripper, or null",
"reasoning": "Why you chose the actions below",
"actions": [{
    "target_square": "red|green|blue|yellow|cyan|magenta|black|white|orange",
    "target_arm_height": "raised|lowered",
    "gripper": "open|hold|close"
}],
"spoken_feedback": "One or two short sentences for the operator: progress, an answer, or the final report"
}

The arm performs your actions in order. You then receive a fresh image and answer again.

To pick up an object on a square: raised+open, lowered+open, lowered+close, raised+close.
To put it down: the same sequence in reverse order.

Check every new image: grasps can miss and objects can slip. Colors shift with lighting.
When the task is finished, or cannot be finished, return an empty actions list."#;

/// One symbolic arm action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(alias = "cell")]
    pub target_square: String,
    #[serde(alias = "height")]
    pub target_arm_height: String,
    /// Missing or unrecognized values open the gripper.
    #[serde(default, alias = "gripperState")]
    pub gripper: String,
}

/// Parsed decision-maker reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionResponse {
    #[serde(default)]
    pub observation: String,
    #[serde(default)]
    pub carrying_object: Option<String>,
    #[serde(default)]
    pub reasoning: String,
    pub actions: Vec<Action>,
    #[serde(default, alias = "reasoning_ru", alias = "spokenFeedback")]
    pub spoken_feedback: String,
}

/// Extract and parse the JSON object embedded in a model reply.
pub fn parse_decision(text: &str) -> CoreResult<DecisionResponse> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(CoreError::MalformedDecision("no JSON object in reply".to_string()));
    };
    if end < start {
        return Err(CoreError::MalformedDecision("no JSON object in reply".to_string()));
    }
    serde_json::from_str(&text[start..=end]).map_err(|e| CoreError::MalformedDecision(e.to_string()))
}

/// Produces the raw reply for the current context.
pub trait DecisionMaker {
    fn decide(&mut self, context: &InteractionContext) -> CoreResult<String>;
}

/// OpenAI-compatible chat completion API (OpenRouter by default) with image input.
pub struct OpenRouterDecisionMaker {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::blocking::Client,
}

impl OpenRouterDecisionMaker {
    pub fn new(config: &DecisionConfig, api_key: impl Into<String>) -> CoreResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CoreError::Decision(e.to_string()))?;
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client,
        })
    }

    /// Request body for the given context.
    pub fn request_body(&self, context: &InteractionContext) -> Value {
        let mut messages = vec![json!({ "role": "system", "content": SYSTEM_PROMPT })];
        messages.extend(context.turns().iter().map(turn_message));
        json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }
}

fn turn_message(turn: &Turn) -> Value {
    match turn {
        Turn::Observation { instruction, snapshot } => {
            let mut parts = Vec::with_capacity(2);
            if let Some(instruction) = instruction {
                parts.push(json!({
                    "type": "text",
                    "text": format!("<instruction>{}</instruction>", instruction),
                }));
            }
            parts.push(json!({
                "type": "image_url",
                "image_url": { "url": snapshot.data_uri() },
            }));
            json!({ "role": turn.role(), "content": parts })
        }
        Turn::Redacted => json!({ "role": turn.role(), "content": REDACTED_OBSERVATION }),
        Turn::Reply(text) => json!({ "role": turn.role(), "content": text }),
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

impl DecisionMaker for OpenRouterDecisionMaker {
    fn decide(&mut self, context: &InteractionContext) -> CoreResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "gridarm")
            .json(&self.request_body(context))
            .send()
            .map_err(|e| CoreError::Decision(format!("request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(CoreError::Decision(format!("API error {}: {}", status, body)));
        }

        let parsed: ChatResponse = res
            .json()
            .map_err(|e| CoreError::Decision(format!("response parse failed: {}", e)))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!(chars = text.len(), "decision reply received");
        Ok(text)
    }
}
