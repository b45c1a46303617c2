use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tablevoice_core::config::RestaurantConfig;
use tablevoice_core::errors::ApplicationError;

use crate::llm::{ChatMessage, LlmClient, LlmTurn};
use crate::tools::ToolRegistry;

/// Tool hops allowed per reply. A single booking needs at most two
/// (availability check, then the booking itself).
const MAX_TOOL_HOPS: usize = 4;

/// One turn of the voice-provider transcript, passed through unmodified
/// from the call-event payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: String,
    pub content: String,
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    system_prompt: String,
}

impl AgentRuntime {
    pub fn new(llm: Arc<dyn LlmClient>, tools: ToolRegistry, restaurant: &RestaurantConfig) -> Self {
        let system_prompt = format!(
            "You are a helpful reservation assistant for {name}, answering a phone call. \
             Your goal is to help callers check availability, book a table, or cancel a \
             reservation. Always be polite and professional, keep replies short enough to \
             speak aloud, and ask for any missing details before booking. \
             The restaurant seats parties of up to {max_party} guests and takes bookings \
             between {opening:02}:00 and {closing:02}:00 in {granularity}-minute slots. \
             Dates are YYYY-MM-DD and times are 24-hour HH:MM. \
             If a caller needs anything else, refer them to {phone}.",
            name = restaurant.name,
            max_party = restaurant.max_party_size,
            opening = restaurant.opening_hour,
            closing = restaurant.closing_hour,
            granularity = restaurant.slot_minutes,
            phone = restaurant.phone,
        );
        Self { llm, tools, system_prompt }
    }

    /// Produces one narratable reply for the current state of a call.
    ///
    /// Tool failures never surface here; they are fed back to the model as
    /// tool output. Only transport-level problems (and a model that will
    /// not stop calling tools) become errors.
    pub async fn reply(
        &self,
        call_id: &str,
        transcript: &[TranscriptTurn],
    ) -> Result<String, ApplicationError> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(ChatMessage::system(&self.system_prompt));
        for turn in transcript {
            let message = match turn.role.as_str() {
                "user" => ChatMessage::user(&turn.content),
                _ => ChatMessage::assistant(&turn.content),
            };
            messages.push(message);
        }

        let specs = self.tools.specs();
        for hop in 0..MAX_TOOL_HOPS {
            match self.llm.chat(&messages, &specs).await? {
                LlmTurn::Say(content) => {
                    info!(
                        event_name = "agent.reply.completed",
                        call_id,
                        tool_hops = hop,
                        "agent produced a reply"
                    );
                    return Ok(content);
                }
                LlmTurn::CallTool { id, name, arguments } => {
                    debug!(
                        event_name = "agent.tool.called",
                        call_id,
                        tool = %name,
                        "model requested a tool call"
                    );
                    let result = self.tools.dispatch(&name, arguments.clone()).await;
                    messages.push(ChatMessage::tool_call(&id, &name, &arguments));
                    messages.push(ChatMessage::tool_result(&id, &result));
                }
            }
        }

        Err(ApplicationError::Integration(format!(
            "model exceeded the tool-call budget of {MAX_TOOL_HOPS} without replying"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use tablevoice_core::calendar::{InMemoryCalendar, ReservationFilter, SlotPolicy};
    use tablevoice_core::config::AppConfig;
    use tablevoice_core::errors::ApplicationError;
    use tablevoice_core::Calendar;

    use crate::llm::{LlmTurn, ScriptedLlm};
    use crate::reservation::register_reservation_tools;
    use crate::tools::ToolRegistry;

    use super::{AgentRuntime, TranscriptTurn};

    fn runtime_with(
        script: Vec<LlmTurn>,
    ) -> (AgentRuntime, Arc<InMemoryCalendar>) {
        let calendar = Arc::new(InMemoryCalendar::new(SlotPolicy::default()));
        let mut tools = ToolRegistry::default();
        register_reservation_tools(&mut tools, calendar.clone() as Arc<dyn Calendar>);
        let runtime = AgentRuntime::new(
            Arc::new(ScriptedLlm::new(script)),
            tools,
            &AppConfig::default().restaurant,
        );
        (runtime, calendar)
    }

    fn transcript() -> Vec<TranscriptTurn> {
        vec![TranscriptTurn {
            role: "user".to_string(),
            content: "A table for four at seven, the name is John Doe.".to_string(),
        }]
    }

    #[tokio::test]
    async fn replies_directly_without_tools() {
        let (runtime, _) = runtime_with(vec![LlmTurn::Say("What day works for you?".to_string())]);
        let reply = runtime.reply("call-1", &transcript()).await.expect("reply");
        assert_eq!(reply, "What day works for you?");
    }

    #[tokio::test]
    async fn books_through_the_tool_loop() {
        let (runtime, calendar) = runtime_with(vec![
            LlmTurn::CallTool {
                id: "call_1".to_string(),
                name: "check_availability".to_string(),
                arguments: json!({"date": "2999-06-01", "time": "19:00", "party_size": 4}),
            },
            LlmTurn::CallTool {
                id: "call_2".to_string(),
                name: "book_table".to_string(),
                arguments: json!({
                    "name": "John Doe",
                    "party_size": 4,
                    "date": "2999-06-01",
                    "time": "19:00"
                }),
            },
            LlmTurn::Say("You're booked for four at seven, John.".to_string()),
        ]);

        let reply = runtime.reply("call-1", &transcript()).await.expect("reply");
        assert!(reply.contains("booked"));

        let stored = calendar
            .list_reservations(ReservationFilter::default())
            .await
            .expect("list succeeds");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "John Doe");
    }

    #[tokio::test]
    async fn malformed_tool_call_is_fed_back_not_fatal() {
        let (runtime, calendar) = runtime_with(vec![
            LlmTurn::CallTool {
                id: "call_1".to_string(),
                name: "book_table".to_string(),
                arguments: json!({"name": "John Doe"}),
            },
            LlmTurn::Say("Sorry, I still need a date and time.".to_string()),
        ]);

        let reply = runtime.reply("call-1", &transcript()).await.expect("reply");
        assert!(reply.contains("date and time"));

        let stored = calendar
            .list_reservations(ReservationFilter::default())
            .await
            .expect("list succeeds");
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn endless_tool_calls_hit_the_budget() {
        let call = LlmTurn::CallTool {
            id: "call_n".to_string(),
            name: "check_availability".to_string(),
            arguments: json!({"date": "2999-06-01", "time": "19:00", "party_size": 2}),
        };
        let (runtime, _) = runtime_with(vec![call.clone(), call.clone(), call.clone(), call]);

        let error = runtime.reply("call-1", &transcript()).await.expect_err("budget exceeded");
        assert!(matches!(error, ApplicationError::Integration(_)));
    }
}
