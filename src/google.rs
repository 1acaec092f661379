//! Google ID-token verification seam.
//!
//! Token validity is the identity provider's problem; we only consume the
//! verified claims. The HTTP implementation calls Google's tokeninfo
//! endpoint and checks the audience.

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::GOOGLE_TOKEN_INVALID;
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
pub struct GoogleIdentity {
    pub email: String,
    pub email_verified: bool,
    pub given_name: String,
    pub family_name: String,
    pub full_name: String,
}

#[async_trait]
pub trait GoogleVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> AppResult<GoogleIdentity>;
}

/// Stand-in used when no OAuth client id is configured.
pub struct DisabledVerifier;

#[async_trait]
impl GoogleVerifier for DisabledVerifier {
    async fn verify(&self, _id_token: &str) -> AppResult<GoogleIdentity> {
        Err(AppError::new(
            GOOGLE_TOKEN_INVALID,
            "Google sign-in is not configured on this server.",
        ))
    }
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    email: Option<String>,
    email_verified: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    name: Option<String>,
}

pub struct TokenInfoVerifier {
    client: reqwest::Client,
    client_id: String,
}

impl TokenInfoVerifier {
    pub fn new(client_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
        }
    }
}

#[async_trait]
impl GoogleVerifier for TokenInfoVerifier {
    async fn verify(&self, id_token: &str) -> AppResult<GoogleIdentity> {
        let response = self
            .client
            .get("https://oauth2.googleapis.com/tokeninfo")
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| {
                AppError::new(GOOGLE_TOKEN_INVALID, "Invalid Google token")
                    .with_context("error", e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(AppError::new(GOOGLE_TOKEN_INVALID, "Invalid Google token")
                .with_context("status", response.status().to_string()));
        }

        let info: TokenInfo = response.json().await.map_err(|e| {
            AppError::new(GOOGLE_TOKEN_INVALID, "Invalid Google token")
                .with_context("error", e.to_string())
        })?;

        if info.aud != self.client_id {
            return Err(
                AppError::new(GOOGLE_TOKEN_INVALID, "Invalid Google token")
                    .with_context("reason", "audience mismatch"),
            );
        }

        Ok(GoogleIdentity {
            email: info.email.unwrap_or_default(),
            email_verified: info.email_verified.as_deref() == Some("true"),
            given_name: info.given_name.unwrap_or_default(),
            family_name: info.family_name.unwrap_or_default(),
            full_name: info.name.unwrap_or_default(),
        })
    }
}
