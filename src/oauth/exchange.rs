//! OAuth token grants and resource listing.
//!
//! Handles exchanging authorization codes and refresh tokens at a
//! provider's token endpoint, and the authenticated listing calls.

use super::provider::{ClientAuth, OAuthProvider, ResourceEndpoint, ResourceMethod, TokenBody};
use crate::credentials::Credential;
use crate::error::{BrokerError, Result};
use futures::future::try_join_all;
use serde_json::{Map, Value};
use tracing::debug;

impl OAuthProvider {
    fn upstream(&self, status: Option<u16>, detail: impl Into<String>) -> BrokerError {
        BrokerError::upstream(self.descriptor.display_name, status, detail)
    }

    /// Exchange an authorization code for a credential.
    pub(super) async fn authorization_code_grant(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Credential> {
        let mut params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.config.redirect_uri.clone()),
        ];
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier.to_string()));
        }

        debug!(provider = %self.descriptor.name, "Exchanging authorization code for token");

        let body = self.post_token_request(params).await?;
        let credential = Credential::from_token_response(body)
            .ok_or_else(|| self.upstream(None, "Token response is missing access_token"))?;

        debug!(
            provider = %self.descriptor.name,
            has_refresh_token = credential.refresh_token.is_some(),
            expires_in = ?credential.expires_in,
            "Token exchange successful"
        );

        Ok(credential)
    }

    /// Obtain a new access token with the credential's refresh token.
    pub(super) async fn refresh_token_grant(&self, current: &Credential) -> Result<Credential> {
        let refresh_token =
            current
                .refresh_token
                .clone()
                .ok_or_else(|| BrokerError::NotAuthenticated {
                    provider: self.descriptor.display_name.to_string(),
                })?;

        let params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token),
        ];

        let body = self.post_token_request(params).await?;
        let mut credential = Credential::from_token_response(body)
            .ok_or_else(|| self.upstream(None, "Refresh response is missing access_token"))?;

        // Keep the existing refresh token if the provider did not rotate it
        credential.inherit_refresh_token(current);

        Ok(credential)
    }

    /// POST to the token endpoint and return the JSON object body.
    async fn post_token_request(
        &self,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<Map<String, Value>> {
        let mut request = self
            .http_client
            .post(&self.token_url)
            .header("Accept", "application/json");

        match self.descriptor.client_auth {
            ClientAuth::RequestBody => {
                params.push(("client_id", self.config.client_id.clone()));
                params.push(("client_secret", self.config.client_secret.clone()));
            }
            ClientAuth::BasicAuth => {
                request = request.basic_auth(
                    &self.config.client_id,
                    Some(&self.config.client_secret),
                );
            }
        }

        request = match self.descriptor.token_body {
            TokenBody::Form => request.form(&params),
            TokenBody::Json => {
                let body: Map<String, Value> = params
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), Value::String(v)))
                    .collect();
                request.json(&body)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| self.upstream(None, format!("Failed to send token request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(self.upstream(Some(status.as_u16()), body));
        }

        response
            .json::<Map<String, Value>>()
            .await
            .map_err(|e| self.upstream(None, format!("Failed to parse token response: {}", e)))
    }

    /// Fetch the first page of every configured resource endpoint.
    pub(super) async fn list_resources(&self, access_token: &str) -> Result<Vec<Value>> {
        let pages = try_join_all(
            self.descriptor
                .resources
                .iter()
                .map(|endpoint| self.fetch_page(access_token, endpoint)),
        )
        .await?;

        let records: Vec<Value> = pages.into_iter().flatten().collect();
        debug!(
            provider = %self.descriptor.name,
            count = records.len(),
            "Fetched resource records"
        );
        Ok(records)
    }

    async fn fetch_page(
        &self,
        access_token: &str,
        endpoint: &ResourceEndpoint,
    ) -> Result<Vec<Value>> {
        let url = format!("{}{}", self.api_base, endpoint.path);
        let mut request = match endpoint.method {
            ResourceMethod::Get => self.http_client.get(&url),
            ResourceMethod::Post(body) => self
                .http_client
                .post(&url)
                .header("Content-Type", "application/json")
                .body(body),
        };
        request = request.bearer_auth(access_token);
        for (name, value) in self.descriptor.api_headers {
            request = request.header(*name, *value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.upstream(None, format!("Failed to fetch {}: {}", endpoint.path, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.upstream(Some(status.as_u16()), body));
        }

        let mut body: Value = response.json().await.map_err(|e| {
            self.upstream(None, format!("Failed to parse {} response: {}", endpoint.path, e))
        })?;

        match body.get_mut(endpoint.results_field).map(Value::take) {
            Some(Value::Array(records)) => Ok(records),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(self.upstream(
                None,
                format!("Field '{}' is not an array", endpoint.results_field),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ProviderConfig;
    use crate::error::BrokerError;
    use crate::integrations::{IntegrationItem, HUBSPOT, NOTION};
    use crate::oauth::{
        ClientAuth, OAuthProvider, ProviderAdapter, ProviderDescriptor, ResourceEndpoint,
        ResourceMethod, TokenBody,
    };
    use crate::credentials::Credential;
    use mockito::{Matcher, Server};
    use serde_json::{json, Map, Value};

    fn config() -> ProviderConfig {
        ProviderConfig::new("cid", "csecret", "http://localhost:8000/cb", "read").unwrap()
    }

    fn mock_provider(
        descriptor: &'static ProviderDescriptor,
        server: &Server,
    ) -> OAuthProvider {
        OAuthProvider::new(descriptor, config())
            .unwrap()
            .with_base_urls(format!("{}/token", server.url()), server.url())
    }

    fn stale_credential(refresh: Option<&str>) -> Credential {
        Credential {
            access_token: "old_token".to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in: Some(1800),
            created_at: 0,
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_exchange_code_form_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "the_code".into()),
                Matcher::UrlEncoded("client_id".into(), "cid".into()),
                Matcher::UrlEncoded("client_secret".into(), "csecret".into()),
                Matcher::UrlEncoded("redirect_uri".into(), "http://localhost:8000/cb".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"tok","refresh_token":"ref","expires_in":1800,"token_type":"bearer"}"#)
            .create_async()
            .await;

        let provider = mock_provider(&HUBSPOT, &server);
        let before = chrono::Utc::now().timestamp();
        let cred = provider.exchange_code("the_code", None).await.unwrap();

        assert_eq!(cred.access_token, "tok");
        assert_eq!(cred.refresh_token.as_deref(), Some("ref"));
        assert_eq!(cred.expires_in, Some(1800));
        assert!(cred.created_at >= before);
        assert_eq!(cred.extra.get("token_type"), Some(&json!("bearer")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_code_basic_auth_json_body() {
        let mut server = Server::new_async().await;
        // base64("cid:csecret")
        let mock = server
            .mock("POST", "/token")
            .match_header("authorization", "Basic Y2lkOmNzZWNyZXQ=")
            .match_body(Matcher::PartialJson(json!({
                "grant_type": "authorization_code",
                "code": "c"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"secret_notion","workspace_name":"Acme"}"#)
            .create_async()
            .await;

        let provider = mock_provider(&NOTION, &server);
        let cred = provider.exchange_code("c", None).await.unwrap();

        assert_eq!(cred.access_token, "secret_notion");
        assert!(cred.refresh_token.is_none());
        assert_eq!(cred.extra.get("workspace_name"), Some(&json!("Acme")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_code_http_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let provider = mock_provider(&HUBSPOT, &server);
        let err = provider.exchange_code("bad", None).await.unwrap_err();

        match err {
            BrokerError::Upstream { status, detail, .. } => {
                assert_eq!(status, Some(400));
                assert!(detail.contains("invalid_grant"));
            }
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refresh_keeps_unrotated_refresh_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "my_refresh".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"new_token","expires_in":3600,"token_type":"bearer"}"#)
            .create_async()
            .await;

        let mut current = stale_credential(Some("my_refresh"));
        current.extra.insert("hub_id".to_string(), json!(42));
        current.extra.insert("token_type".to_string(), json!("old"));

        let provider = mock_provider(&HUBSPOT, &server);
        let cred = provider.refresh_token(&current).await.unwrap();

        assert_eq!(cred.access_token, "new_token");
        assert_eq!(cred.refresh_token.as_deref(), Some("my_refresh"));
        assert_eq!(cred.expires_in, Some(3600));
        assert!(cred.created_at > 0);
        // Everything except the refresh token comes from the new response
        assert!(cred.extra.get("hub_id").is_none());
        assert_eq!(cred.extra.get("token_type"), Some(&json!("bearer")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let server = Server::new_async().await;
        let provider = mock_provider(&HUBSPOT, &server);

        let err = provider
            .refresh_token(&stale_credential(None))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NotAuthenticated { .. }));
    }

    fn item_with_id(record: &Value) -> IntegrationItem {
        IntegrationItem {
            id: record["id"].as_str().map(str::to_string),
            ..Default::default()
        }
    }

    static TWO_ENDPOINTS: ProviderDescriptor = ProviderDescriptor {
        name: "multi",
        display_name: "Multi",
        auth_url: "https://example.com/authorize",
        token_url: "https://example.com/token",
        api_base: "https://api.example.com",
        client_auth: ClientAuth::RequestBody,
        token_body: TokenBody::Form,
        pkce: false,
        auth_params: &[],
        api_headers: &[("X-Api-Version", "7")],
        resources: &[
            ResourceEndpoint {
                method: ResourceMethod::Get,
                path: "/things",
                results_field: "results",
            },
            ResourceEndpoint {
                method: ResourceMethod::Post(r#"{"page_size":100}"#),
                path: "/search",
                results_field: "items",
            },
        ],
        normalize: item_with_id,
    };

    #[tokio::test]
    async fn test_fetch_resources_from_every_endpoint() {
        let mut server = Server::new_async().await;
        let get_mock = server
            .mock("GET", "/things")
            .match_header("authorization", "Bearer access")
            .match_header("x-api-version", "7")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results":[{"id":"1"},{"id":"2"}]}"#)
            .create_async()
            .await;
        let post_mock = server
            .mock("POST", "/search")
            .match_body(Matcher::Json(json!({"page_size": 100})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"items":[{"id":"3"}]}"#)
            .create_async()
            .await;

        let provider = mock_provider(&TWO_ENDPOINTS, &server);
        let records = provider.fetch_resources("access").await.unwrap();

        let ids: Vec<String> = records
            .iter()
            .filter_map(|r| provider.normalize(r).id)
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        get_mock.assert_async().await;
        post_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_resources_fails_entirely_on_one_error() {
        let mut server = Server::new_async().await;
        let _ok = server
            .mock("GET", "/things")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results":[{"id":"1"}]}"#)
            .create_async()
            .await;
        let _fail = server
            .mock("POST", "/search")
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;

        let provider = mock_provider(&TWO_ENDPOINTS, &server);
        let err = provider.fetch_resources("access").await.unwrap_err();
        assert!(matches!(err, BrokerError::Upstream { status: Some(401), .. }));
    }
}
