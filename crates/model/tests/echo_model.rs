use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::time::Duration;

use iai_model::{
    ContentBlock, ErrorKind, ModelMessage, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, Role, StopReason, Usage,
};

#[derive(Debug)]
struct EchoModelProviderError(ErrorKind);

impl Display for EchoModelProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for EchoModelProviderError {}

impl ModelProviderError for EchoModelProviderError {
    fn kind(&self) -> ErrorKind {
        self.0
    }

    fn retry_after(&self) -> Option<Duration> {
        (self.0 == ErrorKind::RateLimited).then(|| Duration::from_secs(1))
    }
}

struct EchoModelProvider;

impl ModelProvider for EchoModelProvider {
    type Error = EchoModelProviderError;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<ModelResponse, Self::Error>> + Send + 'static
    {
        let result = 'blk: {
            let Some(first) = req.messages.first() else {
                break 'blk Err(EchoModelProviderError(
                    ErrorKind::InvalidRequest,
                ));
            };
            if first.role != Role::User {
                break 'blk Err(EchoModelProviderError(
                    ErrorKind::InvalidRequest,
                ));
            }
            if req.system.as_deref() == Some("busy") {
                break 'blk Err(EchoModelProviderError(
                    ErrorKind::RateLimited,
                ));
            }

            let input: String = first
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            let output = format!("You said {input}");
            Ok(ModelResponse {
                usage: Usage::new(
                    input.split(' ').count() as u64,
                    output.split(' ').count() as u64,
                ),
                content: vec![ContentBlock::Text { text: output }],
                stop_reason: Some(StopReason::EndTurn),
            })
        };
        ready(result)
    }
}

#[tokio::test]
async fn test_completion() {
    let provider = EchoModelProvider;
    let req = ModelRequest {
        max_tokens: None,
        system: None,
        messages: vec![ModelMessage::user_text("Good morning")],
        tools: vec![],
    };
    let resp = provider.send_request(&req).await.unwrap();

    assert_eq!(resp.text(), "You said Good morning");
    assert_eq!(resp.usage, Usage::new(2, 4));
    assert!(!resp.has_tool_use());
}

#[tokio::test]
async fn test_error() {
    let provider = EchoModelProvider;
    let req = ModelRequest {
        max_tokens: None,
        system: None,
        messages: vec![],
        tools: vec![],
    };
    let err = provider.send_request(&req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert!(!err.kind().is_retryable());
    assert_eq!(err.retry_after(), None);

    let req = ModelRequest {
        max_tokens: None,
        system: Some("busy".to_owned()),
        messages: vec![ModelMessage::user_text("Hi")],
        tools: vec![],
    };
    let err = provider.send_request(&req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(err.retry_after(), Some(Duration::from_secs(1)));
}
