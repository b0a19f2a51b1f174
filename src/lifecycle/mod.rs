//! Credential lifecycle: authorize, callback, access-token retrieval, item loading.
//!
//! One [`CredentialManager`] per provider. The manager owns no mutable state of
//! its own; everything lives in the [`KeyValueStore`], so unrelated identities
//! proceed fully in parallel.
//!
//! ```text
//! authorize(u, o)   -> state token parked under {p}_state:{token} (TTL)
//!                   -> provider authorization URL
//! callback(code, s) -> take {p}_state:{s} (single use)
//!                   -> exchange code -> {p}_credentials:{o}:{u}
//! access_token(u,o) -> load credential, refresh if stale, persist
//!                   -> {"access_token"} only
//! ```
//!
//! Two concurrent `access_token` calls near expiry may both refresh. That is
//! wasteful but harmless for callers, and left unserialized.

use crate::credentials::{AccessToken, AuthorizationState, Credential};
use crate::error::{BrokerError, Result};
use crate::integrations::IntegrationItem;
use crate::oauth::{generate_pkce, generate_state_token, ProviderAdapter};
use crate::store::{credentials_key, state_key, KeyValueStore};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};


/// Default lifetime of an unused authorization state
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(600);

/// Default safety margin before expiry at which tokens are refreshed
pub const DEFAULT_REFRESH_MARGIN_SECONDS: i64 = 300;

/// Query parameters the provider sends back to the callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub struct CredentialManager {
    adapter: Arc<dyn ProviderAdapter>,
    store: Arc<dyn KeyValueStore>,
    state_ttl: Duration,
    refresh_margin_seconds: i64,
}

impl CredentialManager {
    pub fn new(adapter: Arc<dyn ProviderAdapter>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            adapter,
            store,
            state_ttl: DEFAULT_STATE_TTL,
            refresh_margin_seconds: DEFAULT_REFRESH_MARGIN_SECONDS,
        }
    }

    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    pub fn with_refresh_margin(mut self, seconds: i64) -> Self {
        self.refresh_margin_seconds = seconds;
        self
    }

    pub fn provider(&self) -> &str {
        self.adapter.name()
    }

    pub fn display_name(&self) -> &str {
        self.adapter.display_name()
    }

    /// Start an authorization: park a fresh state for (user, org) and return
    /// the provider URL the user should be sent to.
    pub async fn authorize(&self, user_id: &str, org_id: &str) -> Result<String> {
        let state = generate_state_token();

        let pkce = self.adapter.requires_pkce().then(generate_pkce);
        let payload = AuthorizationState {
            user_id: user_id.to_string(),
            org_id: org_id.to_string(),
            code_verifier: pkce.as_ref().map(|p| p.code_verifier.clone()),
        };

        self.store
            .put(
                &state_key(self.provider(), &state),
                &serde_json::to_string(&payload)?,
                Some(self.state_ttl),
            )
            .await?;

        let url = self
            .adapter
            .build_auth_url(&state, pkce.as_ref().map(|p| p.code_challenge.as_str()));

        debug!(
            provider = %self.provider(),
            user_id = %user_id,
            org_id = %org_id,
            "Generated authorization URL"
        );

        Ok(url)
    }

    /// Complete an authorization from the provider's redirect.
    ///
    /// The state is consumed atomically before the code exchange, so a
    /// replayed or concurrently duplicated callback fails with
    /// [`BrokerError::State`] and at most one exchange happens per state.
    pub async fn handle_callback(&self, params: &CallbackParams) -> Result<AuthorizationState> {
        if let Some(error) = &params.error {
            let description = params
                .error_description
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            warn!(
                provider = %self.provider(),
                error = %error,
                description = %description,
                "Provider reported authorization failure"
            );
            return Err(BrokerError::Auth {
                error: error.clone(),
                description,
            });
        }

        let state = params.state.as_deref().ok_or(BrokerError::State)?;
        let code = params
            .code
            .as_deref()
            .ok_or_else(|| BrokerError::InvalidRequest("Missing 'code' parameter".to_string()))?;

        let payload = self
            .store
            .take(&state_key(self.provider(), state))
            .await?
            .ok_or_else(|| {
                warn!(provider = %self.provider(), "Invalid, expired or replayed OAuth state");
                BrokerError::State
            })?;
        let identity: AuthorizationState = serde_json::from_str(&payload)?;

        let credential = self
            .adapter
            .exchange_code(code, identity.code_verifier.as_deref())
            .await?;

        self.save(&identity.org_id, &identity.user_id, &credential)
            .await?;

        info!(
            provider = %self.provider(),
            user_id = %identity.user_id,
            org_id = %identity.org_id,
            has_refresh_token = credential.refresh_token.is_some(),
            "OAuth flow completed successfully"
        );

        Ok(identity)
    }

    /// Current access token for (user, org), refreshed first if stale.
    ///
    /// Only the access token leaves this function; refresh tokens and client
    /// secrets stay server side.
    pub async fn get_access_token(&self, user_id: &str, org_id: &str) -> Result<AccessToken> {
        let key = credentials_key(self.provider(), org_id, user_id);
        let stored = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| self.not_authenticated())?;
        let mut credential: Credential = serde_json::from_str(&stored)?;

        if credential.needs_refresh(Utc::now().timestamp(), self.refresh_margin_seconds) {
            if credential.refresh_token.is_none() {
                warn!(
                    provider = %self.provider(),
                    user_id = %user_id,
                    "Access token expired and no refresh token is stored"
                );
                return Err(self.not_authenticated());
            }

            info!(provider = %self.provider(), user_id = %user_id, "Refreshing access token");
            credential = self.adapter.refresh_token(&credential).await?;
            self.save(org_id, user_id, &credential).await?;
        }

        debug!(provider = %self.provider(), user_id = %user_id, "Retrieved credentials");

        Ok(AccessToken {
            access_token: credential.access_token,
        })
    }

    /// Fetch and normalize the provider's resources.
    ///
    /// `credentials` is the JSON object handed back by the frontend; only its
    /// `access_token` is used.
    pub async fn load_items(&self, credentials: &str) -> Result<Vec<IntegrationItem>> {
        let parsed: Value = serde_json::from_str(credentials).map_err(|e| {
            BrokerError::InvalidRequest(format!("credentials is not valid JSON: {}", e))
        })?;
        let access_token = parsed
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                BrokerError::InvalidRequest("credentials must contain access_token".to_string())
            })?;

        let records = self.adapter.fetch_resources(access_token).await?;
        let items: Vec<IntegrationItem> =
            records.iter().map(|r| self.adapter.normalize(r)).collect();

        info!(provider = %self.provider(), count = items.len(), "Loaded integration items");
        Ok(items)
    }

    async fn save(&self, org_id: &str, user_id: &str, credential: &Credential) -> Result<()> {
        self.store
            .put(
                &credentials_key(self.provider(), org_id, user_id),
                &serde_json::to_string(credential)?,
                None,
            )
            .await?;
        Ok(())
    }

    fn not_authenticated(&self) -> BrokerError {
        BrokerError::NotAuthenticated {
            provider: self.display_name().to_string(),
        }
    }
}
