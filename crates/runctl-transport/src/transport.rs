use crate::error::TransportError;
use crate::http::{ApiRequest, HttpSend};
use crate::retry::RetryPolicy;
use runctl_core::{Clock, Deadline};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Issues one logical request, repeating it on retryable status codes with
/// exponential backoff.
#[derive(Clone)]
pub struct Transport {
    sender: Arc<dyn HttpSend>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl Transport {
    pub fn new(sender: Arc<dyn HttpSend>, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            sender,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends `request`. A backoff that would end past `deadline` is not
    /// taken; the last error is returned instead.
    pub fn call(
        &self,
        request: &ApiRequest,
        deadline: Option<&Deadline>,
    ) -> Result<Vec<u8>, TransportError> {
        info!(method = %request.method, url = %request.url, "sending request");
        let mut retries = 0usize;
        loop {
            let err = match self.sender.send(request) {
                Ok(body) => return Ok(body),
                Err(err) => err,
            };
            if !self.policy.is_retryable(&err) {
                debug!(method = %request.method, url = %request.url, error = %err, "request failed, not retryable");
                return Err(err);
            }
            if retries >= self.policy.max_retries {
                warn!(
                    method = %request.method,
                    url = %request.url,
                    attempts = retries + 1,
                    error = %err,
                    "retry budget exhausted"
                );
                return Err(err);
            }
            let delay = self.policy.backoff_delay(retries);
            if let Some(deadline) = deadline {
                if !deadline.allows(self.clock.as_ref(), delay) {
                    warn!(
                        method = %request.method,
                        url = %request.url,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "not retrying, backoff would overrun the operation deadline"
                    );
                    return Err(err);
                }
            }
            retries += 1;
            warn!(
                method = %request.method,
                url = %request.url,
                status = err.status_code(),
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                "retrying on transient server error"
            );
            self.clock.sleep(delay);
        }
    }

    pub fn call_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        deadline: Option<&Deadline>,
    ) -> Result<T, TransportError> {
        let body = self.call(request, deadline)?;
        serde_json::from_slice(&body).map_err(|err| TransportError::InvalidResponse {
            url: request.url.clone(),
            message: format!(
                "{} (body: {})",
                err,
                crate::error::truncate_error_body(&String::from_utf8_lossy(&body))
            ),
        })
    }
}
