use crate::client::{CompletionClient, CompletionRequest};
use crate::config::RetryPolicy;
use crate::error::AugmentError;
use crate::types::ERROR_SENTINEL;
use std::sync::Arc;

/// Calls a [`CompletionClient`] with exponential backoff.
///
/// This is the only place transport failures are absorbed: [`call`](Self::call)
/// never fails, it returns [`ERROR_SENTINEL`] once the attempts run out.
pub struct RetryingCaller<C> {
    client: Arc<C>,
    policy: RetryPolicy,
    max_tokens: u32,
}

impl<C> Clone for RetryingCaller<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            policy: self.policy.clone(),
            max_tokens: self.max_tokens,
        }
    }
}

impl<C: CompletionClient> RetryingCaller<C> {
    pub fn new(client: Arc<C>, policy: RetryPolicy, max_tokens: u32) -> Self {
        Self {
            client,
            policy,
            max_tokens,
        }
    }

    /// Request a completion for `prompt`, retrying transient failures.
    ///
    /// Each attempt is bounded by `attempt_timeout`. After the n-th failure the
    /// caller sleeps `initial_delay * 2^(n-1)`, including after the final
    /// attempt. Non-transient failures are not retried.
    pub async fn call(&self, prompt: &str, model: &str, temperature: f64) -> String {
        let request = CompletionRequest::user(model, prompt, self.max_tokens, temperature);

        for attempt in 1..=self.policy.max_attempts {
            let outcome =
                tokio::time::timeout(self.policy.attempt_timeout, self.client.complete(&request))
                    .await
                    .unwrap_or(Err(AugmentError::Timeout(self.policy.attempt_timeout)));

            let err = match outcome {
                Ok(text) => return text,
                Err(e) => e,
            };

            if !err.is_transient() {
                tracing::error!("Completion call failed permanently: {}", err);
                return ERROR_SENTINEL.to_string();
            }

            let delay = self.policy.delay_after(attempt);
            tracing::warn!(
                "Error during completion call (attempt {}/{}): {}. Backing off {:?}...",
                attempt,
                self.policy.max_attempts,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
        }

        tracing::error!(
            "Completion call failed after {} attempts",
            self.policy.max_attempts
        );
        ERROR_SENTINEL.to_string()
    }
}
