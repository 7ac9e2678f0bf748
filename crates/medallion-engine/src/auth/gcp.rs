//! GCP Application Default Credentials authentication.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::EngineError;

/// Scopes requested for BigQuery job submission.
pub const BIGQUERY_SCOPES: &[&str] = &["https://www.googleapis.com/auth/bigquery"];

/// Environment variable holding a pre-issued access token
/// (e.g. `gcloud auth print-access-token`), used instead of ADC when set.
pub const STATIC_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Bearer token source for BigQuery.
///
/// The ADC provider is resolved lazily on the first request and shared by
/// clones. `gcp_auth` checks, in order:
/// 1. GOOGLE_APPLICATION_CREDENTIALS environment variable
/// 2. gcloud CLI configuration
/// 3. GCE/GKE metadata service
pub struct GcpAuth {
    provider: Arc<RwLock<Option<Arc<dyn gcp_auth::TokenProvider>>>>,
    static_token: Option<String>,
}

impl GcpAuth {
    /// Create an ADC-backed auth provider.
    pub fn new() -> Self {
        Self {
            provider: Arc::new(RwLock::new(None)),
            static_token: None,
        }
    }

    /// Use a fixed token and never consult ADC.
    pub fn with_static_token(token: impl Into<String>) -> Self {
        Self {
            provider: Arc::new(RwLock::new(None)),
            static_token: Some(token.into()),
        }
    }

    /// Static token from [`STATIC_TOKEN_ENV`] if set, ADC otherwise.
    pub fn from_env() -> Self {
        match std::env::var(STATIC_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => Self::with_static_token(token.trim()),
            _ => Self::new(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.static_token.is_some()
    }

    async fn ensure_provider(&self) -> Result<(), EngineError> {
        {
            let guard = self.provider.read().await;
            if guard.is_some() {
                return Ok(());
            }
        }

        let provider = gcp_auth::provider()
            .await
            .map_err(|e| EngineError::Auth(format!("Failed to initialize GCP auth: {}", e)))?;

        let mut guard = self.provider.write().await;
        if guard.is_none() {
            *guard = Some(provider);
        }

        Ok(())
    }

    /// Get an access token for BigQuery.
    pub async fn token(&self) -> Result<String, EngineError> {
        if let Some(ref token) = self.static_token {
            return Ok(token.clone());
        }

        self.ensure_provider().await?;

        let guard = self.provider.read().await;
        let provider = guard
            .as_ref()
            .ok_or_else(|| EngineError::Auth("GCP provider not initialized".to_string()))?;

        let token = provider
            .token(BIGQUERY_SCOPES)
            .await
            .map_err(|e| EngineError::Auth(format!("Failed to get GCP token: {}", e)))?;

        Ok(token.as_str().to_string())
    }
}

impl Default for GcpAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for GcpAuth {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            static_token: self.static_token.clone(),
        }
    }
}

impl std::fmt::Debug for GcpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpAuth")
            .field("static_token", &self.static_token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}
