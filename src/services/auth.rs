use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Header carrying the static API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header identifying the end user on non-secure calls under token auth.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Supplies short-lived bearer tokens for secure requests.
///
/// Implemented by the host application; the SDK calls it once per secure
/// request and never caches the result.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Pin<Box<dyn Future<Output = Result<String, AuthError>> + Send + '_>>;
}

/// Token provider backed by a fixed string, for demos and tests.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token(&self) -> Pin<Box<dyn Future<Output = Result<String, AuthError>> + Send + '_>> {
        let token = self.token.clone();
        Box::pin(async move { Ok(token) })
    }
}

/// How requests to the try-on service are authorized.
#[derive(Clone)]
pub enum AuthStrategy {
    /// Static API key sent on every call.
    ApiKey { api_key: String },
    /// Bearer token from a pluggable provider on secure calls; a plain
    /// user-identifier header otherwise.
    Token {
        provider: Arc<dyn TokenProvider>,
        user_id: String,
    },
}

impl AuthStrategy {
    /// Resolve the headers for one request. `secure` marks calls that must
    /// carry a bearer token under token-based auth.
    pub async fn headers(&self, secure: bool) -> Result<Vec<(&'static str, String)>, AuthError> {
        match self {
            AuthStrategy::ApiKey { api_key } => Ok(vec![(API_KEY_HEADER, api_key.clone())]),
            AuthStrategy::Token { provider, user_id } => {
                if secure {
                    let token = provider.token().await?;
                    Ok(vec![("authorization", format!("Bearer {}", token))])
                } else {
                    Ok(vec![(USER_ID_HEADER, user_id.clone())])
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token provider failed: {0}")]
    Provider(String),
}
