use std::path::PathBuf;
use std::sync::Arc;

use iai_core::conversation::{Conversation, ConversationId, Message, TurnResult};
use iai_core::store::{ConversationStore, StoreError};
use iai_core::{
    CancellationToken, Orchestrator, OrchestratorBuilder, OrchestratorConfig,
    TurnError,
};
use iai_model::ModelProvider;

use crate::tools::*;

const DEFAULT_PROJECTS_DIR: &str = "projects";
const DEFAULT_USER_NAME: &str = "user";

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    orchestrator_builder: OrchestratorBuilder,
    store: Arc<dyn ConversationStore>,
    config: OrchestratorConfig,
    projects_dir: PathBuf,
    user_name: String,
    project_name: String,
    conversation_id: Option<ConversationId>,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider, persisting
    /// the conversation into `store`.
    pub fn new<M: ModelProvider + 'static>(
        provider: M,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            orchestrator_builder: OrchestratorBuilder::new(
                provider,
                store.clone(),
            ),
            store,
            config: OrchestratorConfig::default(),
            projects_dir: PathBuf::from(DEFAULT_PROJECTS_DIR),
            user_name: DEFAULT_USER_NAME.to_owned(),
            project_name: String::new(),
            conversation_id: None,
        }
    }

    /// Replaces the default orchestrator configuration.
    #[inline]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the directory the built-in tools look for projects in.
    #[inline]
    pub fn with_projects_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.projects_dir = dir.into();
        self
    }

    /// Sets the user the conversation belongs to.
    #[inline]
    pub fn with_user<S: Into<String>>(mut self, user_name: S) -> Self {
        self.user_name = user_name.into();
        self
    }

    /// Sets the project the conversation is about.
    #[inline]
    pub fn with_project<S: Into<String>>(mut self, project_name: S) -> Self {
        self.project_name = project_name.into();
        self
    }

    /// Resumes an existing conversation instead of starting a new one.
    ///
    /// The user and project of the stored conversation take precedence over
    /// the ones set on the builder.
    #[inline]
    pub fn with_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    /// Builds a new session, creating or loading its conversation.
    pub async fn build(self) -> Result<Session, StoreError> {
        let store = self.store;
        let conversation = match self.conversation_id {
            Some(id) => store
                .get_conversation(&id)
                .await?
                .ok_or(StoreError::ConversationNotFound(id))?,
            None => {
                store
                    .create_conversation(
                        &self.user_name,
                        &self.project_name,
                        "",
                    )
                    .await?
            }
        };
        debug!("session bound to conversation {}", conversation.id);

        let projects_dir = self.projects_dir;
        let memory_tool =
            QueryConversationMemoryTool::new(store, conversation.id.clone());
        let orchestrator = self
            .orchestrator_builder
            .with_config(self.config)
            .with_tool(ListProjectsTool::new(&projects_dir))
            .with_tool(ProjectInfoTool::new(&projects_dir))
            .with_tool(SearchProjectFilesTool::new(&projects_dir))
            .with_tool(ReadProjectFileTool::new(&projects_dir))
            .with_tool(memory_tool)
            .build();

        Ok(Session {
            orchestrator,
            conversation,
        })
    }
}

/// A chat session, like a window that displays messages and has a input box.
///
/// The session is bound to one conversation and holds a fully configured
/// orchestrator. It is basically a wrapper around [`Orchestrator`].
pub struct Session {
    orchestrator: Orchestrator,
    conversation: Conversation,
}

impl Session {
    /// Returns the conversation as it was when the session was built.
    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Returns the id of the conversation.
    #[inline]
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation.id
    }

    /// Returns the underlying orchestrator.
    #[inline]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Sends a message to the session and runs a turn until the assistant
    /// answers.
    #[inline]
    pub async fn send_message(
        &self,
        message: &str,
    ) -> Result<TurnResult, TurnError> {
        self.orchestrator
            .run_turn(&self.conversation.id, message)
            .await
    }

    /// Same as [`send_message`](Self::send_message), but the turn stops once
    /// `cancel` is triggered.
    #[inline]
    pub async fn send_message_with_cancel(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnResult, TurnError> {
        self.orchestrator
            .run_turn_with_cancel(&self.conversation.id, message, cancel)
            .await
    }

    /// Returns the stored messages of the conversation.
    #[inline]
    pub async fn history(&self) -> Result<Vec<Message>, StoreError> {
        self.orchestrator.load_history(&self.conversation.id).await
    }
}
