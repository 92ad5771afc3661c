use std::future::ready;
use std::pin::Pin;

use serde_json::Value;
use tracing::Instrument;

use super::{Error, Tool, ToolOutput, validate_arguments};

pub(crate) type ToolFuture =
    Pin<Box<dyn Future<Output = Result<ToolOutput, Error>> + Send>>;

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameter_schema(&self) -> &Value;

    fn execute(&self, arguments: Value) -> ToolFuture;
}

pub(crate) struct AnyTool<T: Tool>(pub T);

impl<T: Tool> ToolObject for AnyTool<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    fn execute(&self, arguments: Value) -> ToolFuture {
        // Models occasionally omit the arguments of a parameterless tool.
        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            arguments => arguments,
        };
        if let Err(reason) =
            validate_arguments(self.0.parameter_schema(), &arguments)
        {
            return Box::pin(ready(Err(
                Error::invalid_arguments().with_reason(reason)
            )));
        }
        let input: T::Input = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(err) => {
                let reason = format!("{err}");
                return Box::pin(ready(Err(
                    Error::invalid_arguments().with_reason(reason)
                )));
            }
        };

        let fut = self.0.execute(input);
        Box::pin(
            async move { Ok(fut.await) }
                .instrument(debug_span!("tool execute", name = self.0.name())),
        )
    }
}
