// OAuth 2.0 client-credentials token manager
// Shared by adapters whose configuration selects the OAuth auth strategy.
// Tokens are refreshed proactively before the advertised expiry.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::RwLock;

use crate::services::erp::connector::{ConnectorError, Result};

/// Refresh this far ahead of the token's advertised expiry.
const REFRESH_MARGIN_MINUTES: i64 = 5;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct OAuthTokenManager {
    client_id: String,
    client_secret: String,
    token_url: String,
    http: reqwest::Client,
    cache: RwLock<Option<CachedToken>>,
}

impl OAuthTokenManager {
    pub fn new(
        client_id: String,
        client_secret: String,
        token_url: String,
        http: reqwest::Client,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            token_url,
            http,
            cache: RwLock::new(None),
        }
    }

    /// Return a valid access token, exchanging credentials if the cached one
    /// is missing or within the refresh margin of expiry.
    pub async fn access_token(&self) -> Result<String> {
        {
            let cache = self.cache.read().expect("token cache lock poisoned");
            if let Some(cached) = &*cache {
                let margin = Duration::minutes(REFRESH_MARGIN_MINUTES);
                if Utc::now() + margin < cached.expires_at {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let token = self.request_new_token().await?;
        let access_token = token.access_token.clone();

        {
            let mut cache = self.cache.write().expect("token cache lock poisoned");
            *cache = Some(token);
        }

        Ok(access_token)
    }

    /// Drop the cached token; the next call re-authenticates.
    pub fn invalidate(&self) {
        let mut cache = self.cache.write().expect("token cache lock poisoned");
        *cache = None;
    }

    async fn request_new_token(&self) -> Result<CachedToken> {
        let credentials =
            BASE64.encode(format!("{}:{}", self.client_id, self.client_secret));

        let response = self
            .http
            .post(&self.token_url)
            .header("Authorization", format!("Basic {}", credentials))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|e| ConnectorError::Connection(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ConnectorError::Auth(error_text));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| ConnectorError::Response(format!("malformed token response: {}", e)))?;

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at: Utc::now() + Duration::seconds(token_response.expires_in),
        })
    }
}
