use std::sync::Arc;

use iai_core::conversation::ConversationId;
use iai_core::store::ConversationStore;
use iai_core::tool::{Tool, ToolOutput};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};

const DEFAULT_LOOKBACK: usize = 20;

#[derive(Deserialize, JsonSchema)]
pub struct QueryConversationMemoryParameters {
    #[schemars(description = "Text to look for, case-insensitive.")]
    query: String,
    #[schemars(
        description = "How many of the most recent messages to search, \
                       default to 20."
    )]
    lookback: Option<usize>,
}

/// A tool for searching the earlier messages of the current conversation,
/// including the ones that no longer fit in the model history.
pub struct QueryConversationMemoryTool {
    store: Arc<dyn ConversationStore>,
    conversation_id: ConversationId,
    parameter_schema: Value,
}

impl QueryConversationMemoryTool {
    /// Creates a tool that searches the conversation `conversation_id`.
    #[inline]
    pub fn new(
        store: Arc<dyn ConversationStore>,
        conversation_id: ConversationId,
    ) -> Self {
        QueryConversationMemoryTool {
            store,
            conversation_id,
            parameter_schema: schema_for!(QueryConversationMemoryParameters)
                .to_value(),
        }
    }
}

impl Tool for QueryConversationMemoryTool {
    type Input = QueryConversationMemoryParameters;

    fn name(&self) -> &str {
        "query_conversation_memory"
    }

    fn description(&self) -> &str {
        r#"
Searches the recent messages of this conversation for a text.
Use it to recall details discussed earlier, such as findings or decisions that were summarized away. Returns the
matching messages with their role and timestamp."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: QueryConversationMemoryParameters,
    ) -> impl Future<Output = ToolOutput> + Send + 'static {
        let store = self.store.clone();
        let conversation_id = self.conversation_id.clone();
        async move { query(store.as_ref(), &conversation_id, input).await }
    }
}

async fn query(
    store: &dyn ConversationStore,
    conversation_id: &ConversationId,
    input: QueryConversationMemoryParameters,
) -> ToolOutput {
    let needle = input.query.trim().to_lowercase();
    if needle.is_empty() {
        return ToolOutput::failure("`query` must not be empty");
    }
    let history = match store.load_history(conversation_id).await {
        Ok(history) => history,
        Err(err) => {
            warn!("failed to load {conversation_id} for a memory query: {err}");
            return ToolOutput::failure(format!(
                "Failed to load the conversation history: {err}"
            ));
        }
    };

    let lookback = input.lookback.unwrap_or(DEFAULT_LOOKBACK);
    let recent = &history[history.len().saturating_sub(lookback)..];
    let results: Vec<_> = recent
        .iter()
        .filter_map(|msg| {
            let content = msg.content.text();
            content.to_lowercase().contains(&needle).then(|| {
                json!({
                    "role": msg.role.as_str(),
                    "content": content,
                    "timestamp": msg.timestamp.to_rfc3339(),
                })
            })
        })
        .collect();

    let matches = results.len();
    debug!(
        "memory query `{}` matched {matches} of {} message(s)",
        input.query,
        recent.len()
    );
    let mut output = json!({
        "query": input.query,
        "matches": matches,
        "searched_messages": recent.len(),
        "results": results,
    });
    if matches == 0 {
        output["message"] =
            json!("No matches found in recent conversation history");
    }
    ToolOutput::success(output)
}

#[cfg(test)]
mod tests {
    use iai_core::conversation::NewMessage;
    use iai_core::store::MemoryStore;
    use iai_model::{ContentBlock, Usage};

    use super::*;

    fn params(query: &str, lookback: Option<usize>) -> Value {
        json!({ "query": query, "lookback": lookback })
    }

    async fn setup() -> QueryConversationMemoryTool {
        let store: Arc<dyn ConversationStore> = Arc::new(MemoryStore::new());
        let conv = store
            .create_conversation("test_user", "aimee", "")
            .await
            .unwrap();
        let messages = [
            NewMessage::user("Which tag drives Pump_01?"),
            NewMessage::assistant(
                vec![ContentBlock::Text {
                    text: "It's [default]Plant/pump_01/run.".to_owned(),
                }],
                Usage::new(40, 12),
            ),
            NewMessage::user("And the mixer?"),
        ];
        for message in messages {
            store.append_message(&conv.id, message).await.unwrap();
        }
        QueryConversationMemoryTool::new(store, conv.id)
    }

    async fn run(tool: &QueryConversationMemoryTool, args: Value) -> Value {
        let input = serde_json::from_value(args).unwrap();
        let output = tool.execute(input).await;
        assert!(!output.is_error, "{}", output.to_text());
        output.content
    }

    #[tokio::test]
    async fn test_query() {
        let tool = setup().await;

        let output = run(&tool, params("PUMP_01", None)).await;
        assert_eq!(output["matches"], 2);
        assert_eq!(output["searched_messages"], 3);
        assert_eq!(output["results"][0]["role"], "user");
        assert_eq!(output["results"][1]["role"], "assistant");
        assert_eq!(
            output["results"][1]["content"],
            "It's [default]Plant/pump_01/run."
        );
        assert!(output.get("message").is_none());

        // Only the last message is searched.
        let output = run(&tool, params("pump", Some(1))).await;
        assert_eq!(output["matches"], 0);
        assert_eq!(output["searched_messages"], 1);
        assert_eq!(
            output["message"],
            "No matches found in recent conversation history"
        );
    }

    #[tokio::test]
    async fn test_query_failures() {
        let tool = setup().await;
        let input = serde_json::from_value(params("  ", None)).unwrap();
        assert!(tool.execute(input).await.is_error);

        let store: Arc<dyn ConversationStore> = Arc::new(MemoryStore::new());
        let tool = QueryConversationMemoryTool::new(
            store,
            ConversationId::from("missing"),
        );
        let input = serde_json::from_value(params("pump", None)).unwrap();
        let output = tool.execute(input).await;
        assert!(output.is_error);
    }
}
