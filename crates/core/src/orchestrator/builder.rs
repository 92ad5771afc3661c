use std::sync::Arc;

use iai_model::ModelProvider;

use super::Orchestrator;
use crate::config::OrchestratorConfig;
use crate::model_client::ModelClient;
use crate::store::ConversationStore;
use crate::tool::{AnyTool, Tool, ToolObject};

/// [`Orchestrator`] builder.
pub struct OrchestratorBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) store: Arc<dyn ConversationStore>,
    pub(crate) config: OrchestratorConfig,
    pub(crate) tools: Vec<Box<dyn ToolObject>>,
}

impl OrchestratorBuilder {
    /// Creates a new builder with the specified model provider and store.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(
        provider: P,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            store,
            config: OrchestratorConfig::default(),
            tools: vec![],
        }
    }

    /// Replaces the default configuration.
    #[inline]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        let tool = Box::new(AnyTool(tool));
        self.tools.push(tool);
        self
    }

    /// Builds the orchestrator.
    #[inline]
    pub fn build(self) -> Orchestrator {
        Orchestrator::from_builder(self)
    }
}
