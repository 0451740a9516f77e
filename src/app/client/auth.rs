//! M2M token authentication
//!
//! `login-token` exchanges the username and application token for a session
//! token; `logout` invalidates it.

use tracing::{info, warn};

use crate::app::client::api::LoginTokenRequest;
use crate::app::client::http::EnvelopeClient;
use crate::app::models::{AccessToken, Credential};
use crate::constants::m2m;
use crate::errors::{AuthError, AuthResult, SessionError};

/// Handles M2M authentication operations
pub struct AuthHandler;

impl AuthHandler {
    /// Exchanges the credential for an access token
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if:
    /// - The endpoint answers with an error code
    /// - The response carries no token
    /// - The request fails after retries
    pub async fn login(client: &EnvelopeClient, credential: &Credential) -> AuthResult<AccessToken> {
        info!("Logging in to M2M as {}", credential.username);

        let payload = LoginTokenRequest {
            username: &credential.username,
            token: &credential.token,
        };

        let token: Option<String> = client
            .call(m2m::LOGIN_TOKEN, None, &payload)
            .await
            .map_err(|e| match e {
                SessionError::RemoteApi { code, message, .. } => {
                    AuthError::Rejected { code, message }
                }
                SessionError::Transport(e) => AuthError::Transport(e),
                SessionError::Decode { .. }
                | SessionError::NotAuthenticated { .. }
                | SessionError::Closed { .. } => AuthError::MissingToken,
            })?;

        match token.filter(|token| !token.is_empty()) {
            Some(token) => {
                info!("M2M login successful");
                Ok(AccessToken::new(token))
            }
            None => Err(AuthError::MissingToken),
        }
    }

    /// Invalidates the access token; failures are logged only
    pub async fn logout(client: &EnvelopeClient, token: &AccessToken) {
        let result: Result<Option<serde_json::Value>, SessionError> = client
            .call(m2m::LOGOUT, Some(token), &serde_json::json!({}))
            .await;

        match result {
            Ok(_) => info!("M2M logout successful"),
            Err(e) => warn!("M2M logout failed: {}", e),
        }
    }
}
