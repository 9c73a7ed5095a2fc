use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::gateway_client::{ClientError, ConversationSession, GatewayClient, LaunchRequest};
use crate::retry::{RetryController, RetryOutcome, RetryState};

/// Opens conversations through the gateway, retrying transient failures.
/// Opening again while a previous open is still retrying cancels it.
#[derive(Clone)]
pub struct ConversationLauncher {
    client: GatewayClient,
    controller: Arc<RetryController>,
}

impl ConversationLauncher {
    pub fn new(client: GatewayClient, controller: RetryController) -> Self {
        Self {
            client,
            controller: Arc::new(controller),
        }
    }

    pub async fn open(
        &self,
        request: LaunchRequest,
    ) -> RetryOutcome<ConversationSession, ClientError> {
        self.open_until(request, &CancellationToken::new()).await
    }

    /// Opens a conversation that also stops when `stop` is cancelled, even if
    /// that happens before the first attempt starts.
    pub async fn open_until(
        &self,
        request: LaunchRequest,
        stop: &CancellationToken,
    ) -> RetryOutcome<ConversationSession, ClientError> {
        let outcome = self
            .controller
            .execute_until(stop, |attempt| {
                let client = self.client.clone();
                let request = request.clone();
                async move {
                    if attempt > 0 {
                        info!(attempt, "re-attempting conversation creation");
                    }
                    client.create_conversation(&request).await
                }
            })
            .await;
        if let RetryOutcome::Success { value, attempts } = &outcome {
            info!(
                conversation_id = %value.conversation_id,
                attempts,
                "conversation opened"
            );
        }
        outcome
    }

    pub fn subscribe(&self) -> watch::Receiver<RetryState> {
        self.controller.subscribe()
    }
}
