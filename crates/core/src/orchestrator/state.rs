use std::iter;

use backoff::backoff::Backoff;
use chrono::Utc;
use iai_model::{
    ContentBlock, ModelMessage, ModelRequest, ModelResponse, ModelTool, Role,
    StopReason, ToolUse, Usage,
};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::compaction::{history_tokens, summary_request};
use super::{Orchestrator, TurnError, TurnErrorKind};
use crate::conversation::{
    ConversationId, DebugLog, DebugLogId, Message, MessageId, NewMessage,
    ToolInvocation, TurnResult, TurnStatus, push_blocks, title_from_message,
    to_model_messages, working_history,
};
use crate::store::StoreError;
use crate::tool::truncate_text;

/// Stages of a turn. Each stage is handled by one method of [`Turn`], which
/// returns the next stage.
enum TurnStage {
    AwaitingModel,
    ModelReplied {
        request: ModelRequest,
        response: ModelResponse,
    },
    ExecutingTools {
        assistant_message_id: MessageId,
        tool_uses: Vec<ToolUse>,
    },
    Done(TurnStatus),
    Failed(TurnErrorKind, String),
}

impl TurnStage {
    #[inline]
    fn cancelled() -> Self {
        TurnStage::Failed(
            TurnErrorKind::Cancelled,
            "the turn was cancelled".to_owned(),
        )
    }

    #[inline]
    fn storage_failure(err: StoreError) -> Self {
        TurnStage::Failed(TurnErrorKind::from(&err), err.to_string())
    }
}

/// The in-flight state of a single turn.
pub(super) struct Turn<'a> {
    orchestrator: &'a Orchestrator,
    cancel: &'a CancellationToken,
    system_prompt: String,
    tools: Vec<ModelTool>,
    messages: Vec<ModelMessage>,
    usage: Usage,
    tool_invocations: Vec<ToolInvocation>,
    iterations: u32,
    text: String,
    last_text: String,
}

impl<'a> Turn<'a> {
    pub(super) fn new(
        orchestrator: &'a Orchestrator,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            cancel,
            system_prompt: String::new(),
            tools: vec![],
            messages: vec![],
            usage: Usage::default(),
            tool_invocations: vec![],
            iterations: 0,
            text: String::new(),
            last_text: String::new(),
        }
    }

    pub(super) async fn run(
        mut self,
        conversation_id: &ConversationId,
        user_input: &str,
    ) -> Result<TurnResult, TurnError> {
        if user_input.trim().is_empty() {
            return Err(self.fail(
                TurnErrorKind::InvalidInput,
                "the message is empty".to_owned(),
            ));
        }

        let mut stage = match self.begin(conversation_id, user_input).await {
            Ok(()) => TurnStage::AwaitingModel,
            Err(err) => TurnStage::storage_failure(err),
        };
        loop {
            stage = match stage {
                TurnStage::AwaitingModel => self.call_model().await,
                TurnStage::ModelReplied { request, response } => {
                    self.handle_reply(conversation_id, request, response)
                        .await
                }
                TurnStage::ExecutingTools {
                    assistant_message_id,
                    tool_uses,
                } => {
                    self.execute_tools(
                        conversation_id,
                        assistant_message_id,
                        tool_uses,
                    )
                    .await
                }
                TurnStage::Done(status) => return Ok(self.finish(status)),
                TurnStage::Failed(kind, message) => {
                    return Err(self.fail(kind, message));
                }
            };
        }
    }

    /// Loads the history, compacting it when it grew too large, and
    /// persists the user input.
    async fn begin(
        &mut self,
        conversation_id: &ConversationId,
        user_input: &str,
    ) -> Result<(), StoreError> {
        let orchestrator = self.orchestrator;
        let store = &orchestrator.store;
        let config = &orchestrator.config;

        let conversation = store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| {
                StoreError::ConversationNotFound(conversation_id.clone())
            })?;
        self.system_prompt = config.render_system_prompt(
            &conversation.project_name,
            &conversation.user_name,
        );

        let history = store.load_history(conversation_id).await?;
        let mut working =
            working_history(&history, config.max_history_messages);
        if let Some(compacted) = self.compact(conversation_id, &working).await
        {
            working = compacted;
        }
        self.messages = to_model_messages(&working);
        debug!(
            "loaded {} of {} stored messages as history",
            working.len(),
            history.len()
        );
        self.tools = orchestrator.tool_executor.definitions();

        store
            .append_message(conversation_id, NewMessage::user(user_input))
            .await?;
        push_blocks(
            &mut self.messages,
            Role::User,
            vec![ContentBlock::Text {
                text: user_input.to_owned(),
            }],
        );

        let title = if conversation.title.is_empty() {
            title_from_message(user_input)
        } else {
            conversation.title
        };
        store
            .update_conversation(conversation_id, &title, Utc::now())
            .await
    }

    /// Replaces all but the most recent messages of `history` with a summary
    /// written by the model, once the history grew past the compaction
    /// threshold.
    ///
    /// Returns `None` when no compaction happened. A failed compaction is
    /// logged and the turn goes on with the full history.
    async fn compact(
        &mut self,
        conversation_id: &ConversationId,
        history: &[Message],
    ) -> Option<Vec<Message>> {
        let orchestrator = self.orchestrator;
        let config = &orchestrator.config;
        let policy = &config.compaction;
        if !policy.enabled || history.len() <= policy.keep_recent_messages {
            return None;
        }
        let tokens = history_tokens(&self.system_prompt, history);
        if tokens <= policy.token_threshold {
            return None;
        }
        info!(
            "compacting {} history messages of about {tokens} tokens",
            history.len()
        );

        let split = history.len() - policy.keep_recent_messages;
        let (old, recent) = history.split_at(split);
        let resp = match orchestrator
            .model_client
            .send_request(summary_request(old), config.model_timeout)
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                error!("failed to summarize the history, skipping: {err}");
                return None;
            }
        };
        self.usage += resp.usage;
        let summary = resp.text();
        if summary.trim().is_empty() {
            warn!("the model returned an empty summary, skipping");
            return None;
        }

        let first_kept = recent.first().map(|m| m.id.clone());
        let message = NewMessage::summary(summary, old.len(), first_kept);
        let summary = match orchestrator
            .store
            .append_message(conversation_id, message)
            .await
        {
            Ok(summary) => summary,
            Err(err) => {
                error!("failed to persist the history summary: {err}");
                return None;
            }
        };
        info!("condensed {} messages into a summary", old.len());
        Some(iter::once(summary).chain(recent.iter().cloned()).collect())
    }

    async fn call_model(&mut self) -> TurnStage {
        let orchestrator = self.orchestrator;
        let config = &orchestrator.config;
        let request = ModelRequest {
            max_tokens: None,
            system: Some(self.system_prompt.clone()),
            messages: self.messages.clone(),
            tools: self.tools.clone(),
        };

        let mut backoff = config.retry.backoff();
        let mut attempt = 0;
        loop {
            if self.cancel.is_cancelled() {
                return TurnStage::cancelled();
            }
            attempt += 1;
            let err = match orchestrator
                .model_client
                .send_request(request.clone(), config.model_timeout)
                .await
            {
                Ok(response) => {
                    return TurnStage::ModelReplied { request, response };
                }
                Err(err) => err,
            };

            let kind = err.kind();
            if !kind.is_retryable() {
                return TurnStage::Failed(kind.into(), err.to_string());
            }
            if attempt >= config.retry.max_attempts {
                return TurnStage::Failed(
                    TurnErrorKind::UpstreamUnavailable,
                    format!("giving up after {attempt} attempts: {err}"),
                );
            }

            let mut delay = backoff
                .next_backoff()
                .unwrap_or(config.retry.max_interval);
            if let Some(retry_after) = err.retry_after() {
                delay = delay.max(retry_after);
            }
            warn!("model call failed ({kind}), retrying in {delay:?}: {err}");
            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.cancel.cancelled() => return TurnStage::cancelled(),
            }
        }
    }

    async fn handle_reply(
        &mut self,
        conversation_id: &ConversationId,
        request: ModelRequest,
        resp: ModelResponse,
    ) -> TurnStage {
        self.usage += resp.usage;
        let text = resp.text();
        let tool_uses = resp.tool_uses();
        if resp.stop_reason == Some(StopReason::MaxTokens) {
            warn!("the reply was cut off by the output token limit");
        }

        let message = NewMessage::assistant(resp.content.clone(), resp.usage);
        let message = match self
            .orchestrator
            .store
            .append_message(conversation_id, message)
            .await
        {
            Ok(message) => message,
            Err(err) => return TurnStage::storage_failure(err),
        };
        self.record_debug_log(conversation_id, &message.id, &request, &resp)
            .await;
        push_blocks(&mut self.messages, Role::Assistant, resp.content);

        if !text.is_empty() {
            self.last_text.clone_from(&text);
        }
        if tool_uses.is_empty() {
            self.text = text;
            return TurnStage::Done(TurnStatus::Completed);
        }
        TurnStage::ExecutingTools {
            assistant_message_id: message.id,
            tool_uses,
        }
    }

    /// Persists the exchange that produced an assistant message. Failing to
    /// do so never fails the turn.
    async fn record_debug_log(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        request: &ModelRequest,
        response: &ModelResponse,
    ) {
        if !self.orchestrator.config.debug_logs {
            return;
        }
        let (request, response) = match (
            serde_json::to_value(request),
            serde_json::to_value(response),
        ) {
            (Ok(request), Ok(response)) => (request, response),
            (Err(err), _) | (_, Err(err)) => {
                warn!("failed to serialize the debug log: {err}");
                return;
            }
        };
        let log = DebugLog {
            id: DebugLogId::random(),
            conversation_id: conversation_id.clone(),
            message_id: message_id.clone(),
            request,
            response,
            timestamp: Utc::now(),
        };
        if let Err(err) = self.orchestrator.store.append_debug_log(log).await {
            warn!("failed to save the debug log of {message_id}: {err}");
        }
    }

    /// Runs the requested tools one by one, in the order the model emitted
    /// them.
    async fn execute_tools(
        &mut self,
        conversation_id: &ConversationId,
        assistant_message_id: MessageId,
        tool_uses: Vec<ToolUse>,
    ) -> TurnStage {
        let orchestrator = self.orchestrator;
        let config = &orchestrator.config;

        let mut results = Vec::with_capacity(tool_uses.len());
        for tool_use in tool_uses {
            if self.cancel.is_cancelled() {
                return TurnStage::cancelled();
            }

            let ToolUse { id, name, input } = tool_use;
            let output = match orchestrator
                .tool_executor
                .execute(&name, input.clone())
                .await
            {
                Ok(output) => output,
                Err(err) => {
                    warn!("tool `{name}` ({id}) failed: {err}");
                    err.to_output()
                }
            };
            let content =
                truncate_text(output.to_text(), config.max_tool_result_bytes);

            let message = NewMessage::tool_result(
                &id,
                &name,
                content.clone(),
                output.is_error,
            );
            if let Err(err) = orchestrator
                .store
                .append_message(conversation_id, message)
                .await
            {
                return TurnStage::storage_failure(err);
            }

            self.tool_invocations.push(ToolInvocation {
                tool_use_id: id.clone(),
                name,
                input,
                assistant_message_id: assistant_message_id.clone(),
                is_error: output.is_error,
            });
            results.push(ContentBlock::ToolResult {
                tool_use_id: id,
                content,
                is_error: output.is_error,
            });
        }
        push_blocks(&mut self.messages, Role::User, results);

        self.iterations += 1;
        if self.iterations >= config.max_iterations {
            warn!("stopping after {} tool rounds", self.iterations);
            self.text.clone_from(&self.last_text);
            return TurnStage::Done(TurnStatus::TruncatedByIterationLimit);
        }
        TurnStage::AwaitingModel
    }

    fn finish(self, status: TurnStatus) -> TurnResult {
        info!(
            "turn finished ({status:?}) after {} tool rounds, {} in / {} out \
             tokens",
            self.iterations, self.usage.input_tokens, self.usage.output_tokens
        );
        TurnResult {
            status,
            text: self.text,
            usage: self.usage,
            tool_invocations: self.tool_invocations,
            iterations: self.iterations,
        }
    }

    fn fail(self, kind: TurnErrorKind, message: String) -> TurnError {
        error!("turn failed: {kind}: {message}");
        TurnError::new(kind, message, self.usage, self.tool_invocations)
    }
}
