use crate::config::{get_token_expiry_seconds, Config, OAUTH_AUTH_URL, SCOPES};
use crate::errors::{GmailApiError, GmailResult};
use crate::utils::truncate_secret;
use axum::extract::Query;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use log::{debug, error, info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{oneshot, Mutex};

// Alias for backward compatibility within this module
type Result<T> = GmailResult<T>;

// Token response for OAuth2
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: String,
}

// OAuth token manager
#[derive(Debug, Clone)]
pub struct TokenManager {
    access_token: String,
    expiry: SystemTime,
    refresh_token: String,
    client_id: String,
    client_secret: String,
    token_url: String,
}

impl TokenManager {
    pub fn new(config: &Config) -> Self {
        let expiry = if config.access_token.is_some() {
            // If we have an initial access token, use the configurable default
            SystemTime::now() + Duration::from_secs(get_token_expiry_seconds())
        } else {
            // Otherwise set expiry to now to force a refresh
            SystemTime::now()
        };

        Self {
            access_token: config.access_token.clone().unwrap_or_default(),
            expiry,
            refresh_token: config.refresh_token.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url: config.token_url.clone(),
        }
    }

    pub async fn get_token(&mut self, client: &Client) -> Result<String> {
        debug!(
            "Token status check - have token: {}, valid: {}",
            !self.access_token.is_empty(),
            SystemTime::now() < self.expiry
        );

        // Check if current token is still valid
        if !self.access_token.is_empty() && SystemTime::now() < self.expiry {
            debug!("Using existing token");
            return Ok(self.access_token.clone());
        }

        debug!("OAuth token expired or not set, refreshing");

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        debug!("Requesting token from {}", self.token_url);
        if log::log_enabled!(log::Level::Debug) {
            debug!(
                "Using client_id: {} (truncated)",
                truncate_secret(&self.client_id)
            );
        }

        let token_data = request_token(client, &self.token_url, &params).await?;

        // Update token and expiry
        self.access_token = token_data.access_token;
        // Set expiry to slightly less than the actual expiry to be safe
        let expires_in = token_data.expires_in.saturating_sub(60); // 1 minute buffer
        self.expiry = SystemTime::now() + Duration::from_secs(expires_in);

        debug!(
            "Token refreshed successfully, valid for {} seconds",
            expires_in
        );
        if log::log_enabled!(log::Level::Debug) {
            debug!("Token (truncated): {}", truncate_secret(&self.access_token));
        }

        Ok(self.access_token.clone())
    }
}

async fn request_token(client: &Client, token_url: &str, params: &[(&str, &str)]) -> Result<TokenResponse> {
    let response = client
        .post(token_url)
        .form(params)
        .send()
        .await
        .map_err(|e| GmailApiError::NetworkError(e.to_string()))?;

    let status = response.status();
    debug!("Token response status: {}", status);

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<no response body>".to_string());

        error!(
            "Token request failed. Status: {}, Error: {}",
            status, error_text
        );
        return Err(GmailApiError::AuthError(format!(
            "Failed to refresh token. Status: {}, Error: {}",
            status, error_text
        )));
    }

    let response_text = response
        .text()
        .await
        .map_err(|e| GmailApiError::ApiError(format!("Failed to get token response: {}", e)))?;

    serde_json::from_str(&response_text).map_err(|e| {
        error!("Failed to parse token response: {}", e);
        GmailApiError::ApiError(format!("Failed to parse token response: {}", e))
    })
}

/// Build the Google consent URL for the loopback redirect flow.
pub fn build_consent_url(client_id: &str, redirect_uri: &str, state: &str) -> String {
    let scope = SCOPES.join(" ");
    let params = [
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("response_type", "code"),
        ("scope", scope.as_str()),
        ("access_type", "offline"),
        ("prompt", "consent"),
        ("state", state),
    ];
    match url::Url::parse_with_params(OAUTH_AUTH_URL, &params) {
        Ok(url) => url.to_string(),
        // The base URL is a constant, so this branch is unreachable in practice
        Err(_) => OAUTH_AUTH_URL.to_string(),
    }
}

/// Interactive first-use consent flow.
///
/// Opens the browser at the consent page, captures the redirect on a loopback
/// port and exchanges the code. Returns the refresh token; storing it is left
/// to the user.
pub async fn run_oauth_flow(config: &Config) -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| GmailApiError::NetworkError(format!("Failed to bind callback port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| GmailApiError::NetworkError(e.to_string()))?
        .port();
    let redirect_uri = format!("http://127.0.0.1:{}/", port);

    let state: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    let consent_url = build_consent_url(&config.client_id, &redirect_uri, &state);

    let (tx, rx) = oneshot::channel::<HashMap<String, String>>();
    let tx = Arc::new(Mutex::new(Some(tx)));
    let app = Router::new().route(
        "/",
        get(move |Query(params): Query<HashMap<String, String>>| {
            let tx = tx.clone();
            async move {
                if let Some(sender) = tx.lock().await.take() {
                    let _ = sender.send(params);
                }
                Html("<p>Authentication complete. You can close this window.</p>")
            }
        }),
    );

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("OAuth callback server failed: {}", e);
        }
    });

    println!("Open this URL to authorize access:\n\n{}\n", consent_url);
    if let Err(e) = webbrowser::open(&consent_url) {
        warn!("Could not open a browser automatically: {}", e);
    }

    let params = rx
        .await
        .map_err(|_| GmailApiError::AuthError("OAuth callback never arrived".to_string()));
    server.abort();
    let params = params?;

    if params.get("state").map(String::as_str) != Some(state.as_str()) {
        return Err(GmailApiError::AuthError("OAuth state mismatch".to_string()));
    }
    if let Some(err) = params.get("error") {
        return Err(GmailApiError::AuthError(format!("Consent denied: {}", err)));
    }
    let code = params
        .get("code")
        .ok_or_else(|| GmailApiError::AuthError("Missing authorization code".to_string()))?;

    let refresh_token = exchange_code(&Client::new(), config, code, &redirect_uri).await?;
    info!("OAuth consent flow completed");
    Ok(refresh_token)
}

/// Exchange an authorization code for a refresh token.
pub async fn exchange_code(
    client: &Client,
    config: &Config,
    code: &str,
    redirect_uri: &str,
) -> Result<String> {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("grant_type", "authorization_code"),
    ];
    let token_data = request_token(client, &config.token_url, &params).await?;
    token_data.refresh_token.ok_or_else(|| {
        GmailApiError::AuthError("Token response did not include a refresh token".to_string())
    })
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UserProfile {
    pub email: Option<String>,
    #[serde(rename = "given_name")]
    pub first_name: Option<String>,
    #[serde(rename = "family_name")]
    pub last_name: Option<String>,
    #[serde(rename = "name")]
    pub full_name: Option<String>,
}

/// Fetch the basic profile of the account behind `access_token`.
pub async fn fetch_profile(client: &Client, userinfo_url: &str, access_token: &str) -> Result<UserProfile> {
    let response = client
        .get(userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| GmailApiError::NetworkError(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(GmailApiError::ApiError(format!(
            "Error fetching profile: {}",
            error_text
        )));
    }

    response
        .json::<UserProfile>()
        .await
        .map_err(|e| GmailApiError::MessageFormatError(e.to_string()))
}

/// Refresh a token with the configured credentials and report who they belong to.
pub async fn test_credentials(config: &Config) -> Result<String> {
    let client = Client::new();
    let mut tokens = TokenManager::new(config);
    let token = tokens.get_token(&client).await?;
    let profile = fetch_profile(&client, &config.userinfo_url, &token).await?;

    Ok(format!(
        "Authenticated as {} ({})",
        profile.full_name.as_deref().unwrap_or("<unknown name>"),
        profile.email.as_deref().unwrap_or("<unknown email>")
    ))
}
