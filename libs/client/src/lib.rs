//! Outbound side of the CVI gateway: the provider API client, the gateway
//! session client, and the retry controller that drives both.

pub mod backoff;
pub mod gateway_client;
pub mod launcher;
pub mod provider;
pub mod retry;

pub use backoff::BackoffPolicy;
pub use gateway_client::{ClientError, ConversationSession, GatewayClient, LaunchRequest};
pub use launcher::ConversationLauncher;
pub use provider::{
    ConversationApi, ConversationCreated, ConversationProperties, CreateConversationRequest,
    DEFAULT_API_BASE, MockConversationApi, ProviderError, ReqwestConversationApi,
};
pub use retry::{
    Classify, DEFAULT_MAX_RETRIES, Disposition, Phase, RetryController, RetryOutcome, RetryState,
};
pub use tokio_util::sync::CancellationToken;
