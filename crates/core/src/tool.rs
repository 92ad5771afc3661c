//! Tool call supports.

mod error;
mod executor;
mod object;
mod schema;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

pub use error::{Error, ErrorKind};
pub use executor::Executor;
pub(crate) use object::{AnyTool, ToolObject};
pub use schema::validate_arguments;

/// The structured result of a tool invocation.
///
/// Failures that the model should see (a missing project, an unreadable
/// file) are reported as an output with `is_error` set rather than as an
/// [`Error`], so the conversation can continue.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutput {
    /// JSON payload returned to the model.
    pub content: Value,
    /// Whether the payload describes a failure.
    pub is_error: bool,
}

impl ToolOutput {
    /// Creates a successful output.
    #[inline]
    pub fn success<V: Into<Value>>(content: V) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Creates an error output with the given message.
    #[inline]
    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self {
            content: json!({ "error": message.into() }),
            is_error: true,
        }
    }

    /// Serializes the payload as the text sent back to the model.
    ///
    /// String payloads are used verbatim, anything else is rendered as
    /// compact JSON.
    pub fn to_text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless, and may not maintain any
/// internal state.
///
/// The tool can be context-aware, meaning it can access additional information
/// about the current execution context, such as the projects directory. To do
/// this, make the context an immutable state of the tool, which can be set
/// during initialization, and copy it when executing.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    ///
    /// Arguments are checked against this schema before the input is
    /// deserialized.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe, since it's dropped when
    /// the invocation times out.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolOutput> + Send + 'static;
}

/// Cuts `text` to at most `max_bytes` bytes on a character boundary and
/// appends a marker that tells the model how much was omitted.
pub(crate) fn truncate_text(text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let omitted = text.len() - end;
    let mut truncated = text;
    truncated.truncate(end);
    truncated.push_str(&format!("\n[truncated: {omitted} bytes omitted]"));
    truncated
}
