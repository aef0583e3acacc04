//! Model backend implementations for Veracity.
//!
//! All providers implement the `veracity_core::Provider` trait and speak
//! streaming only: the turn engine consumes text deltas as they arrive.
//! The router selects the correct provider based on configuration.

mod lines;
pub mod ollama;
pub mod openai_compat;
pub mod router;

pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_from_config, ProviderRouter};

use veracity_core::error::ProviderError;

/// Map a non-success HTTP status to a [`ProviderError`].
pub(crate) async fn check_status(
    response: reqwest::Response,
    provider: &str,
    model: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    match status {
        200..=299 => Ok(response),
        429 => Err(ProviderError::RateLimited {
            retry_after_secs: 5,
        }),
        401 | 403 => Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        404 => Err(ProviderError::ModelNotFound(model.to_string())),
        _ => {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(provider, status, body = %body, "Provider returned error");
            Err(ProviderError::ApiError {
                status_code: status,
                message: body,
            })
        }
    }
}
