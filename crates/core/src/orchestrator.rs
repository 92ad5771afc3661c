mod builder;
mod compaction;
mod error;
mod state;

use std::sync::Arc;

use iai_model::ModelTool;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::OrchestratorConfig;
use crate::conversation::{Conversation, ConversationId, Message, TurnResult};
use crate::model_client::ModelClient;
use crate::store::{ConversationStore, StoreError};
use crate::tool::Executor as ToolExecutor;
pub use builder::OrchestratorBuilder;
pub use error::{TurnError, TurnErrorKind};
use state::Turn;

/// Drives conversation turns: it calls the model, executes the tools the
/// model asks for, feeds the results back, and persists every step.
///
/// An orchestrator is shareable, turns of different conversations may run
/// concurrently on the same instance. Callers must not run two turns of the
/// same conversation at the same time.
pub struct Orchestrator {
    model_client: ModelClient,
    tool_executor: ToolExecutor,
    store: Arc<dyn ConversationStore>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    fn from_builder(builder: OrchestratorBuilder) -> Self {
        let OrchestratorBuilder {
            model_client,
            store,
            config,
            tools,
        } = builder;

        let mut tool_executor = ToolExecutor::with_tools(tools);
        tool_executor.set_timeout(config.tool_timeout);
        Self {
            model_client,
            tool_executor,
            store,
            config,
        }
    }

    /// Creates an empty conversation for a user and project. Its title is
    /// derived from the first user message.
    pub async fn create_conversation(
        &self,
        user_name: &str,
        project_name: &str,
    ) -> Result<Conversation, StoreError> {
        let conversation = self
            .store
            .create_conversation(user_name, project_name, "")
            .await?;
        info!(
            "created conversation {} for {user_name} in {project_name}",
            conversation.id
        );
        Ok(conversation)
    }

    /// Returns the conversation, or `None` if it doesn't exist.
    #[inline]
    pub async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        self.store.get_conversation(id).await
    }

    /// Returns the full stored history of a conversation.
    #[inline]
    pub async fn load_history(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        self.store.load_history(id).await
    }

    /// Returns the definitions of the registered tools, sorted by name.
    #[inline]
    pub fn tool_definitions(&self) -> Vec<ModelTool> {
        self.tool_executor.definitions()
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs a turn: appends the user input and loops over model calls and
    /// tool executions until the model replies without requesting a tool,
    /// or the iteration limit is reached.
    pub async fn run_turn(
        &self,
        conversation_id: &ConversationId,
        user_input: &str,
    ) -> Result<TurnResult, TurnError> {
        let cancel = CancellationToken::new();
        self.run_turn_with_cancel(conversation_id, user_input, &cancel)
            .await
    }

    /// Same as [`run_turn`](Self::run_turn), but stops with
    /// [`TurnErrorKind::Cancelled`] once `cancel` is triggered.
    ///
    /// Cancellation is observed between steps: an in-flight model call or
    /// tool invocation completes (or times out) first, and whatever was
    /// persisted so far stays in the history.
    pub async fn run_turn_with_cancel(
        &self,
        conversation_id: &ConversationId,
        user_input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnResult, TurnError> {
        Turn::new(self, cancel)
            .run(conversation_id, user_input)
            .instrument(info_span!("turn", conversation = %conversation_id))
            .await
    }
}
