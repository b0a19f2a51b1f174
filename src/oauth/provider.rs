//! Provider descriptors and the generic adapter built from them.

use super::ProviderAdapter;
use crate::config::ProviderConfig;
use crate::credentials::Credential;
use crate::error::{BrokerError, Result};
use crate::integrations::IntegrationItem;
use async_trait::async_trait;
use serde_json::Value;

/// How the client authenticates at the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientAuth {
    /// `client_id` / `client_secret` sent as request parameters
    RequestBody,
    /// HTTP Basic with `client_id:client_secret`
    BasicAuth,
}

/// Encoding of the token request body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenBody {
    Form,
    Json,
}

#[derive(Clone, Copy, Debug)]
pub enum ResourceMethod {
    Get,
    /// POST with a static JSON body
    Post(&'static str),
}

/// One resource-listing call.
#[derive(Clone, Copy, Debug)]
pub struct ResourceEndpoint {
    pub method: ResourceMethod,
    /// Path appended to the provider's API base URL
    pub path: &'static str,
    /// Top-level response field holding the record array
    pub results_field: &'static str,
}

/// Static knowledge about one provider. Everything except client
/// credentials, which come from [`ProviderConfig`].
pub struct ProviderDescriptor {
    pub name: &'static str,
    pub display_name: &'static str,
    pub auth_url: &'static str,
    pub token_url: &'static str,
    pub api_base: &'static str,
    pub client_auth: ClientAuth,
    pub token_body: TokenBody,
    pub pkce: bool,
    /// Extra query parameters on the authorization URL
    pub auth_params: &'static [(&'static str, &'static str)],
    /// Extra headers on every resource call
    pub api_headers: &'static [(&'static str, &'static str)],
    pub resources: &'static [ResourceEndpoint],
    pub normalize: fn(&Value) -> IntegrationItem,
}

/// Generic OAuth adapter: descriptor + client registration + HTTP client.
pub struct OAuthProvider {
    pub(super) descriptor: &'static ProviderDescriptor,
    pub(super) config: ProviderConfig,
    pub(super) http_client: reqwest::Client,
    pub(super) token_url: String,
    pub(super) api_base: String,
}

impl OAuthProvider {
    pub fn new(descriptor: &'static ProviderDescriptor, config: ProviderConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("credbroker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BrokerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            descriptor,
            config,
            http_client,
            token_url: descriptor.token_url.to_string(),
            api_base: descriptor.api_base.to_string(),
        })
    }

    /// Point the token endpoint and resource API somewhere else (for testing with a mock server).
    pub fn with_base_urls(mut self, token_url: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for OAuthProvider {
    fn name(&self) -> &str {
        self.descriptor.name
    }

    fn display_name(&self) -> &str {
        self.descriptor.display_name
    }

    fn requires_pkce(&self) -> bool {
        self.descriptor.pkce
    }

    fn build_auth_url(&self, state: &str, code_challenge: Option<&str>) -> String {
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&scope={}&response_type=code",
            self.descriptor.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&self.config.scopes),
        );

        for (key, value) in self.descriptor.auth_params {
            url.push_str(&format!("&{}={}", key, urlencoding::encode(value)));
        }

        if let Some(challenge) = code_challenge {
            url.push_str(&format!(
                "&code_challenge={}&code_challenge_method=S256",
                urlencoding::encode(challenge)
            ));
        }

        url.push_str(&format!("&state={}", urlencoding::encode(state)));
        url
    }

    async fn exchange_code(&self, code: &str, code_verifier: Option<&str>) -> Result<Credential> {
        self.authorization_code_grant(code, code_verifier).await
    }

    async fn refresh_token(&self, credential: &Credential) -> Result<Credential> {
        self.refresh_token_grant(credential).await
    }

    async fn fetch_resources(&self, access_token: &str) -> Result<Vec<Value>> {
        self.list_resources(access_token).await
    }

    fn normalize(&self, record: &Value) -> IntegrationItem {
        (self.descriptor.normalize)(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize_nothing(_: &Value) -> IntegrationItem {
        IntegrationItem::default()
    }

    static TEST_PROVIDER: ProviderDescriptor = ProviderDescriptor {
        name: "example",
        display_name: "Example",
        auth_url: "https://example.com/oauth/authorize",
        token_url: "https://example.com/oauth/token",
        api_base: "https://api.example.com",
        client_auth: ClientAuth::RequestBody,
        token_body: TokenBody::Form,
        pkce: false,
        auth_params: &[("owner", "user")],
        api_headers: &[],
        resources: &[],
        normalize: normalize_nothing,
    };

    fn test_provider() -> OAuthProvider {
        let config = ProviderConfig::new(
            "test_client_id",
            "test_secret",
            "http://localhost:3000/callback",
            "read write",
        )
        .unwrap();
        OAuthProvider::new(&TEST_PROVIDER, config).unwrap()
    }

    #[test]
    fn test_build_auth_url() {
        let url = test_provider().build_auth_url("random_state", None);

        assert!(url.starts_with("https://example.com/oauth/authorize?"));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcallback"));
        // URL encoding converts spaces to %20
        assert!(url.contains("scope=read%20write"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("owner=user"));
        assert!(url.ends_with("&state=random_state"));
        assert!(!url.contains("code_challenge"));
    }

    #[test]
    fn test_build_auth_url_with_pkce() {
        let url = test_provider().build_auth_url("s", Some("challenge123"));
        assert!(url.contains("code_challenge=challenge123"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.ends_with("&state=s"));
    }

    #[test]
    fn test_build_auth_url_is_deterministic() {
        let provider = test_provider();
        assert_eq!(
            provider.build_auth_url("abc", None),
            provider.build_auth_url("abc", None)
        );
    }
}
