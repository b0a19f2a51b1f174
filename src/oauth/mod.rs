//! OAuth 2.0 provider adapters.
//!
//! Every supported provider runs the same RFC 6749 authorization-code and
//! refresh-token grants. What differs is data: endpoints, how the client
//! authenticates to the token endpoint, whether PKCE is required and where
//! the resource listing lives. That data is a [`ProviderDescriptor`]; one
//! generic [`OAuthProvider`] turns a descriptor plus a [`ProviderConfig`]
//! into a working [`ProviderAdapter`].
//!
//! [`ProviderConfig`]: crate::config::ProviderConfig

mod exchange;
mod pkce;
mod provider;
mod state;

pub use pkce::{generate_pkce, PkceChallenge};
pub use provider::{
    ClientAuth, OAuthProvider, ProviderDescriptor, ResourceEndpoint, ResourceMethod, TokenBody,
};
pub use state::generate_state_token;

use crate::credentials::Credential;
use crate::error::Result;
use crate::integrations::IntegrationItem;
use async_trait::async_trait;
use serde_json::Value;

/// Capabilities the lifecycle manager needs from a provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Lowercase identifier used in routes and store keys (e.g. "hubspot").
    fn name(&self) -> &str;

    /// Human readable name used in messages (e.g. "HubSpot").
    fn display_name(&self) -> &str;

    /// Whether the authorization request must carry a PKCE challenge.
    fn requires_pkce(&self) -> bool {
        false
    }

    /// Authorization URL for `state`. Pure; no I/O.
    fn build_auth_url(&self, state: &str, code_challenge: Option<&str>) -> String;

    /// Authorization-code grant. Stamps `created_at` on success.
    async fn exchange_code(&self, code: &str, code_verifier: Option<&str>) -> Result<Credential>;

    /// Refresh-token grant. Keeps the old refresh token if the provider did
    /// not issue a new one and stamps a fresh `created_at`.
    async fn refresh_token(&self, credential: &Credential) -> Result<Credential>;

    /// Raw resource records from the first page of each listing endpoint.
    async fn fetch_resources(&self, access_token: &str) -> Result<Vec<Value>>;

    /// Map one raw record to the common item shape.
    fn normalize(&self, record: &Value) -> IntegrationItem;
}
