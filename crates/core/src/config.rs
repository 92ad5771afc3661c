//! Orchestrator configurations.

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

/// The system prompt used when none is configured.
///
/// `{PROJECT_NAME}` and `{USER_NAME}` are replaced with the conversation's
/// project and user before each model call.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Ignition AI, an assistant for Inductive Automation's Ignition SCADA \
platform. You help users understand their Ignition projects. Use the tools \
to look up project details instead of guessing, and be concise.

Current project: {PROJECT_NAME}
Current user: {USER_NAME}";

/// How failed model calls are retried.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub(crate) max_attempts: u32,
    pub(crate) initial_interval: Duration,
    pub(crate) multiplier: f64,
    pub(crate) max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(500),
            multiplier: 2.0,
            max_interval: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Sets the total number of attempts, including the first one.
    #[inline]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the delay before the first retry.
    #[inline]
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Sets the factor the delay grows by after each retry.
    #[inline]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the upper bound of a single delay.
    #[inline]
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Returns the total number of attempts.
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub(crate) fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_multiplier(self.multiplier)
            .with_randomization_factor(0.0)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// When and how the history of a conversation is condensed into a summary.
///
/// Compaction kicks in once the estimated size of the history exceeds
/// `token_threshold` and there are more than `keep_recent_messages`
/// messages. Everything but the most recent messages is then summarized by
/// the model.
#[derive(Clone, Debug, PartialEq)]
pub struct CompactionPolicy {
    pub(crate) enabled: bool,
    pub(crate) token_threshold: u64,
    pub(crate) keep_recent_messages: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            token_threshold: 180_000,
            keep_recent_messages: 30,
        }
    }
}

impl CompactionPolicy {
    /// A policy that never compacts.
    #[inline]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sets the history size, in tokens, above which compaction happens.
    #[inline]
    pub fn with_token_threshold(mut self, tokens: u64) -> Self {
        self.token_threshold = tokens;
        self
    }

    /// Sets how many of the most recent messages are kept verbatim.
    #[inline]
    pub fn with_keep_recent_messages(mut self, count: usize) -> Self {
        self.keep_recent_messages = count;
        self
    }
}

/// Configuration of an [`Orchestrator`](crate::Orchestrator).
#[derive(Clone, Debug, PartialEq)]
pub struct OrchestratorConfig {
    pub(crate) system_prompt: String,
    pub(crate) max_iterations: u32,
    pub(crate) max_history_messages: usize,
    pub(crate) max_tool_result_bytes: usize,
    pub(crate) model_timeout: Option<Duration>,
    pub(crate) tool_timeout: Option<Duration>,
    pub(crate) retry: RetryPolicy,
    pub(crate) compaction: CompactionPolicy,
    pub(crate) debug_logs: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            max_iterations: 10,
            max_history_messages: 50,
            max_tool_result_bytes: 100 * 1024,
            model_timeout: Some(Duration::from_secs(120)),
            tool_timeout: Some(Duration::from_secs(30)),
            retry: RetryPolicy::default(),
            compaction: CompactionPolicy::default(),
            debug_logs: true,
        }
    }
}

impl OrchestratorConfig {
    /// Sets the system prompt template.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the maximum number of tool rounds in a single turn.
    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Sets how many of the most recent stored messages are sent to the
    /// model as history.
    #[inline]
    pub fn with_max_history_messages(mut self, max_messages: usize) -> Self {
        self.max_history_messages = max_messages;
        self
    }

    /// Sets the size budget of a single tool result.
    #[inline]
    pub fn with_max_tool_result_bytes(mut self, max_bytes: usize) -> Self {
        self.max_tool_result_bytes = max_bytes;
        self
    }

    /// Sets the timeout of a single model call. `None` disables it.
    #[inline]
    pub fn with_model_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Sets the timeout of a single tool invocation. `None` disables it.
    #[inline]
    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Sets the retry policy for model calls.
    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the history compaction policy.
    #[inline]
    pub fn with_compaction_policy(
        mut self,
        compaction: CompactionPolicy,
    ) -> Self {
        self.compaction = compaction;
        self
    }

    /// Sets whether the request and response of every model call are
    /// persisted as debug logs.
    #[inline]
    pub fn with_debug_logs(mut self, enabled: bool) -> Self {
        self.debug_logs = enabled;
        self
    }

    /// Returns the maximum number of tool rounds in a single turn.
    #[inline]
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Renders the system prompt for a conversation.
    pub fn render_system_prompt(
        &self,
        project_name: &str,
        user_name: &str,
    ) -> String {
        self.system_prompt
            .replace("{PROJECT_NAME}", project_name)
            .replace("{USER_NAME}", user_name)
    }
}
