//! Authentication endpoints
//!
//! Login, signup, refresh and logout are auth endpoints: they are silent and
//! a 401 from them is never recovered through a refresh.

use serde::{Deserialize, Serialize};

use crate::error::{BotdeskError, Result};
use crate::http::{ApiClient, ApiRequest};
use crate::session::{TokenPair, UserProfile};

/// Email/password pair for [`ApiClient::login`].
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body of `POST /auth/signup`.
#[derive(Clone, Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(rename = "full_name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl std::fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

/// Response of `POST /auth/login`.
#[derive(Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl ApiClient {
    /// Logs in and installs the new session.
    ///
    /// When the login response carries no user, the profile is fetched from
    /// `/auth/me`; failing to fetch it does not fail the login.
    ///
    /// # Errors
    ///
    /// Returns [`BotdeskError::Session`] for bad credentials and
    /// [`BotdeskError::Api`]/[`BotdeskError::Network`] otherwise. Nothing is
    /// notified; the caller reports the error.
    pub async fn login(&self, credentials: &Credentials) -> Result<UserProfile> {
        tracing::info!(email = %credentials.email, "Logging in");
        let response: LoginResponse = self
            .send_json(ApiRequest::post("/auth/login").json(credentials)?)
            .await?;

        let tokens = TokenPair::from_parts(Some(response.access_token), Some(response.refresh_token))
            .ok_or_else(|| BotdeskError::Session("Login response carried no tokens".to_string()))?;
        self.session().start_session(tokens, response.user.clone())?;

        match response.user {
            Some(user) => Ok(user),
            None => {
                let user = self.me().await?;
                self.session().set_user(user.clone())?;
                Ok(user)
            }
        }
    }

    /// Creates an account. The new account is not logged in.
    pub async fn signup(&self, request: &SignupRequest) -> Result<UserProfile> {
        tracing::info!(email = %request.email, "Signing up");
        self.send_json(ApiRequest::post("/auth/signup").json(request)?)
            .await
    }

    /// Ends the session.
    ///
    /// The local session is cleared even when the server call fails; the
    /// server error is only logged.
    pub async fn logout(&self) -> Result<()> {
        if self.session().is_authenticated() {
            let body = serde_json::json!({ "refresh_token": self.session().refresh_token() });
            if let Err(e) = self
                .send_empty(ApiRequest::post("/auth/logout").json(&body)?)
                .await
            {
                tracing::warn!("Server-side logout failed: {}", e);
            }
        }
        self.session().clear_session();
        Ok(())
    }

    /// Fetches the signed-in user's profile.
    pub async fn me(&self) -> Result<UserProfile> {
        self.require_session()?;
        self.get_json("/auth/me").await
    }
}
