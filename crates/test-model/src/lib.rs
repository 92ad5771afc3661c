//! A local fake model for testing purpose.

mod preset;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use iai_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest, ModelResponse,
    StopReason,
};
use tokio::time::sleep;

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    #[allow(dead_code)]
    message: &'static str,
    kind: ErrorKind,
    retry_after: Option<Duration>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

#[derive(Clone)]
enum ConversationStep {
    UserInput,
    AssistantResponse(PresetResponse),
}

#[derive(Default)]
struct Journal {
    requests: Vec<ModelRequest>,
    attempts: HashMap<usize, u64>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the conversation script, which
/// is how the model should respond to a request. The added steps will be
/// selected according to the number of history messages in your request, so
/// a script alternates user steps (user input or tool results) and assistant
/// steps. If there are no enough steps in the script, an error will be
/// returned.
///
/// Clones share the same journal, so a test can keep one clone to inspect
/// the requests the other one received.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    conversation_script: Vec<ConversationStep>,
    delay: Option<Duration>,
    journal: Arc<Mutex<Journal>>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_assistant_response_step(&mut self, preset: PresetResponse) {
        self.conversation_script
            .push(ConversationStep::AssistantResponse(preset));
    }

    #[inline]
    pub fn add_user_input_step(&mut self) {
        self.conversation_script.push(ConversationStep::UserInput);
    }

    /// Tool results travel to the model as a user message.
    #[inline]
    pub fn add_tool_results_step(&mut self) {
        self.add_user_input_step();
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns every request received so far, including failed attempts.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.journal
            .lock()
            .map(|journal| journal.requests.clone())
            .unwrap_or_default()
    }

    fn respond(&self, req: &ModelRequest) -> Result<ModelResponse, Error> {
        let step_idx = req.messages.len();
        let attempt = {
            let mut journal = self.journal.lock().map_err(|_| Error {
                message: "journal poisoned",
                kind: ErrorKind::Transport,
                retry_after: None,
            })?;
            journal.requests.push(req.clone());
            let attempt = journal.attempts.entry(step_idx).or_default();
            *attempt += 1;
            *attempt
        };

        let Some(step) = self.conversation_script.get(step_idx) else {
            return Err(Error {
                message: "no enough steps",
                kind: ErrorKind::InvalidRequest,
                retry_after: None,
            });
        };
        let preset = match step {
            ConversationStep::UserInput => {
                return Err(Error {
                    message: "not an assistant response step",
                    kind: ErrorKind::InvalidRequest,
                    retry_after: None,
                });
            }
            ConversationStep::AssistantResponse(preset) => preset,
        };

        if let Some(failures) = preset.failures {
            if failures == 0 || attempt <= failures {
                let kind = ErrorKind::from(preset.failure);
                return Err(Error {
                    message: "preset failure",
                    kind,
                    retry_after: (kind == ErrorKind::RateLimited)
                        .then(|| Duration::from_millis(10)),
                });
            }
        }

        let resp = ModelResponse {
            content: preset.blocks.clone(),
            usage: preset.usage,
            stop_reason: None,
        };
        let stop_reason = if resp.has_tool_use() {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        };
        Ok(ModelResponse {
            stop_reason: Some(stop_reason),
            ..resp
        })
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<ModelResponse, Self::Error>> + Send + 'static
    {
        let result = self.respond(req);
        let delay = self.delay.unwrap_or(Duration::from_millis(1));
        async move {
            sleep(delay).await;
            result
        }
    }
}
