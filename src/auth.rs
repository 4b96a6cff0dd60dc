//! Credential-based authentication against the exchange.
//!
//! `public/auth` with the client-credentials grant; the resulting bearer
//! token is shared with the order client. `refresh` simply re-authenticates.

use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::info;

pub struct Authenticator {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<String>>,
}

impl Authenticator {
    pub fn new(base_url: String, client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            client_id,
            client_secret,
            token: RwLock::new(None),
        }
    }

    pub async fn authenticate(&self) -> Result<()> {
        let url = format!("{}/public/auth", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .context("authentication request failed")?;

        if !response.status().is_success() {
            bail!("authentication rejected with status {}", response.status());
        }

        let body: Value = response
            .json()
            .await
            .context("authentication response was not JSON")?;
        let Some(token) = body.pointer("/result/access_token").and_then(Value::as_str) else {
            bail!("authentication response missing access token");
        };

        *self.token.write() = Some(token.to_string());
        info!("authenticated with exchange");
        Ok(())
    }

    pub async fn refresh(&self) -> Result<()> {
        self.authenticate().await
    }

    pub fn access_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }
}
