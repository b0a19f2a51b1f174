//! Stored OAuth records.
//!
//! A [`Credential`] is persisted under `{provider}_credentials:{org}:{user}`
//! with no store-level expiry; its lifetime is judged from `created_at +
//! expires_in`. An [`AuthorizationState`] is the short-lived payload parked
//! under a state token between the redirect and the callback.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// OAuth credential for one (provider, org, user).
///
/// Unknown provider fields (`token_type`, `hub_id`, `workspace_name`, ...)
/// ride along in `extra` so a stored record round-trips without loss.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Access token lifetime in seconds, as reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Unix timestamp (seconds) stamped when the token was obtained
    #[serde(default)]
    pub created_at: i64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Credential {
    /// Build from a raw token-endpoint response, stamping `created_at` now.
    pub fn from_token_response(mut body: Map<String, Value>) -> Option<Self> {
        let access_token = body.remove("access_token")?.as_str()?.to_string();
        let refresh_token = body
            .remove("refresh_token")
            .and_then(|v| v.as_str().map(str::to_string));
        let expires_in = body.remove("expires_in").and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });
        body.remove("created_at");

        Some(Self {
            access_token,
            refresh_token,
            expires_in,
            created_at: Utc::now().timestamp(),
            extra: body,
        })
    }

    /// Whether the token must be refreshed before use at `now`.
    ///
    /// True once `now` reaches `created_at + expires_in - margin`. A missing or
    /// zero `expires_in` cannot be judged, so it counts as stale whenever a
    /// refresh token exists to renew it; without one the token is treated as
    /// non-expiring.
    pub fn needs_refresh(&self, now: i64, margin_seconds: i64) -> bool {
        match self.expires_in {
            Some(expires_in) if expires_in > 0 => {
                // Provider-supplied lifetimes can be arbitrarily large
                let threshold = self
                    .created_at
                    .saturating_add(expires_in)
                    .saturating_sub(margin_seconds);
                now >= threshold
            }
            _ => self.refresh_token.is_some(),
        }
    }

    /// Carry the previous refresh token forward when the provider did not rotate it.
    pub fn inherit_refresh_token(&mut self, previous: &Credential) {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.refresh_token.clone();
        }
    }
}

/// Payload stored against an anti-forgery state token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationState {
    pub user_id: String,
    pub org_id: String,
    /// PKCE verifier, only for providers that require PKCE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
}

/// What the caller of `GetAccessToken` receives. Deliberately has no other fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
}
