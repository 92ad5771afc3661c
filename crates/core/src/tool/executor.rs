use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use iai_model::ModelTool;
use serde_json::Value;
use tokio::time::timeout;

use super::{AnyTool, Error, Tool, ToolObject, ToolOutput};

/// An executor that dispatches tool use requests from the model to the
/// registered tools.
#[derive(Clone, Default)]
pub struct Executor {
    tools: HashMap<String, Arc<dyn ToolObject>>,
    timeout: Option<Duration>,
}

impl Executor {
    pub(crate) fn with_tools(tools: Vec<Box<dyn ToolObject>>) -> Self {
        let mut executor = Self::default();
        for tool in tools {
            executor.insert(tool);
        }
        executor
    }

    /// Registers a tool. A tool registered under an existing name replaces
    /// the previous one.
    pub fn register<T: Tool>(&mut self, tool: T) {
        self.insert(Box::new(AnyTool(tool)));
    }

    fn insert(&mut self, tool: Box<dyn ToolObject>) {
        let name = tool.name().to_owned();
        if self.tools.insert(name.clone(), Arc::from(tool)).is_some() {
            warn!("tool `{name}` is registered twice, replacing it");
        }
    }

    /// Sets the maximum duration of a single invocation.
    #[inline]
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Returns `true` if a tool is registered under `name`.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns the definitions of all registered tools, sorted by name.
    pub fn definitions(&self) -> Vec<ModelTool> {
        let mut definitions: Vec<_> = self
            .tools
            .values()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                input_schema: tool.parameter_schema().clone(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Executes the tool named `name` with the given arguments.
    ///
    /// Arguments are validated against the tool's parameter schema first.
    /// Tool-level failures are reported through [`ToolOutput::is_error`],
    /// while an [`Error`] means the tool never produced an output.
    pub async fn execute(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolOutput, Error> {
        let Some(tool) = self.tools.get(name) else {
            warn!("tool not found: {name}");
            return Err(Error::unknown_tool()
                .with_reason(format!("no tool named `{name}` is available")));
        };
        trace!("executing tool `{name}` with args: {arguments:?}");

        let fut = tool.execute(arguments);
        let Some(limit) = self.timeout else {
            return fut.await;
        };
        match timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("tool `{name}` timed out after {limit:?}");
                Err(Error::timeout().with_reason(format!(
                    "`{name}` did not finish within {}ms",
                    limit.as_millis()
                )))
            }
        }
    }
}
