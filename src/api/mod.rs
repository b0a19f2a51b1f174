//! REST surface for the credential broker.
//!
//! Implements, per provider:
//! 1. POST /integrations/:provider/authorize      → authorization URL
//! 2. GET  /integrations/:provider/oauth2callback → exchange code, close popup
//! 3. POST /integrations/:provider/credentials    → {"access_token"}
//! 4. POST /integrations/:provider/load           → normalized items

pub mod middleware;

use crate::credentials::AccessToken;
use crate::error::BrokerError;
use crate::integrations::IntegrationItem;
use crate::lifecycle::{CallbackParams, CredentialManager};
use axum::{
    extract::{Form, Path, Query, State},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Served to the popup window once the callback succeeds.
pub const CLOSE_WINDOW_HTML: &str = "<html><script>window.close();</script></html>";

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Broker errors rendered as HTTP responses
struct AppError(BrokerError);

impl From<BrokerError> for AppError {
    fn from(e: BrokerError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let error_message = match &self.0 {
            BrokerError::Storage(_) | BrokerError::Config(_) => {
                error!(error = %self.0, "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

/// Shared application state: one lifecycle manager per enabled provider
#[derive(Clone)]
pub struct IntegrationAppState {
    managers: Arc<BTreeMap<String, Arc<CredentialManager>>>,
}

impl IntegrationAppState {
    pub fn new(managers: impl IntoIterator<Item = CredentialManager>) -> Self {
        let managers = managers
            .into_iter()
            .map(|m| (m.provider().to_string(), Arc::new(m)))
            .collect();
        Self {
            managers: Arc::new(managers),
        }
    }

    fn manager(&self, provider: &str) -> Result<&Arc<CredentialManager>, AppError> {
        self.managers
            .get(provider)
            .ok_or_else(|| AppError(BrokerError::UnknownProvider(provider.to_string())))
    }

    pub fn providers(&self) -> Vec<String> {
        self.managers.keys().cloned().collect()
    }
}

/// Form fields identifying the end user
#[derive(Deserialize)]
pub struct IdentityForm {
    pub user_id: String,
    pub org_id: String,
}

/// Form field carrying the frontend's credential JSON
#[derive(Deserialize)]
pub struct LoadForm {
    pub credentials: String,
}

#[derive(Serialize)]
struct ProvidersResponse {
    integrations: Vec<String>,
}

/// Create integration API router
pub fn create_integration_router(state: IntegrationAppState) -> Router {
    Router::new()
        .route("/", get(ping))
        .route("/integrations", get(list_integrations))
        .route("/integrations/:provider/authorize", post(authorize))
        .route("/integrations/:provider/oauth2callback", get(oauth2callback))
        .route("/integrations/:provider/credentials", post(credentials))
        .route("/integrations/:provider/load", post(load))
        .with_state(state)
}

async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({"Ping": "Pong"}))
}

async fn list_integrations(State(state): State<IntegrationAppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        integrations: state.providers(),
    })
}

/// POST /integrations/:provider/authorize
///
/// Returns the provider authorization URL (JSON string) carrying a fresh
/// single-use state bound to the submitted user and org.
async fn authorize(
    State(state): State<IntegrationAppState>,
    Path(provider): Path<String>,
    Form(form): Form<IdentityForm>,
) -> Result<Json<String>, AppError> {
    let manager = state.manager(&provider)?;
    let url = manager.authorize(&form.user_id, &form.org_id).await?;
    Ok(Json(url))
}

/// GET /integrations/:provider/oauth2callback
///
/// Validates and consumes the state, exchanges the code and stores the
/// credential. Responds with a page that closes the authorization popup.
async fn oauth2callback(
    State(state): State<IntegrationAppState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Result<Html<&'static str>, AppError> {
    debug!(provider = %provider, "OAuth callback received");
    let manager = state.manager(&provider)?;
    manager.handle_callback(&params).await?;
    Ok(Html(CLOSE_WINDOW_HTML))
}

/// POST /integrations/:provider/credentials
///
/// Returns only the access token, refreshing it first if it is near expiry.
async fn credentials(
    State(state): State<IntegrationAppState>,
    Path(provider): Path<String>,
    Form(form): Form<IdentityForm>,
) -> Result<Json<AccessToken>, AppError> {
    let manager = state.manager(&provider)?;
    let token = manager.get_access_token(&form.user_id, &form.org_id).await?;
    Ok(Json(token))
}

/// POST /integrations/:provider/load
async fn load(
    State(state): State<IntegrationAppState>,
    Path(provider): Path<String>,
    Form(form): Form<LoadForm>,
) -> Result<Json<Vec<IntegrationItem>>, AppError> {
    let manager = state.manager(&provider)?;
    let items = manager.load_items(&form.credentials).await?;
    Ok(Json(items))
}
