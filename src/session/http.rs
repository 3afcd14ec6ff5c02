//! HTTP messaging gateway client.
//!
//! Talks JSON to a session gateway:
//! - `POST /api/sessions/{session}/connect` → `{"authenticated": bool}`
//! - `POST /api/sessions/{session}/messages` `{"to", "text"}` → `{"success": bool}`
//! - `POST /api/sessions/{session}/disconnect`
//!
//! The access key travels in the `X-Api-Key` header on every request.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{MessagingSession, SessionConnector, SessionCredentials};
use crate::config::GatewayConfig;
use crate::error::SessionError;

const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    authenticated: bool,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    success: bool,
}

/// Opens sessions against an HTTP messaging gateway.
pub struct HttpSessionConnector {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSessionConnector {
    pub fn new(config: &GatewayConfig) -> Result<Self, SessionError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| SessionError::Http(format!("invalid gateway URL: {e}")))?;
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl SessionConnector for HttpSessionConnector {
    async fn connect(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<Arc<dyn MessagingSession>, SessionError> {
        let url = endpoint(&self.base_url, &credentials.session_name, "connect")?;

        let resp = self
            .client
            .post(url)
            .header(API_KEY_HEADER, credentials.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| SessionError::ConnectFailed {
                session: credentials.session_name.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let authenticated = if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
        {
            false
        } else if status.is_success() {
            let body: ConnectResponse = resp
                .json()
                .await
                .map_err(|e| SessionError::InvalidResponse(e.to_string()))?;
            body.authenticated
        } else {
            let text = resp.text().await.unwrap_or_default();
            return Err(SessionError::ConnectFailed {
                session: credentials.session_name.clone(),
                reason: format!("gateway returned {status}: {text}"),
            });
        };

        debug!(session = %credentials.session_name, authenticated, "Gateway session opened");

        Ok(Arc::new(HttpSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            session_name: credentials.session_name.clone(),
            api_key: credentials.api_key.clone(),
            authenticated,
        }))
    }
}

/// One open gateway session.
pub struct HttpSession {
    client: reqwest::Client,
    base_url: Url,
    session_name: String,
    api_key: SecretString,
    authenticated: bool,
}

#[async_trait]
impl MessagingSession for HttpSession {
    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    async fn send_message(&self, phone: &str, text: &str) -> Result<bool, SessionError> {
        let url = endpoint(&self.base_url, &self.session_name, "messages")?;

        let resp = self
            .client
            .post(url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&SendRequest { to: phone, text })
            .send()
            .await
            .map_err(|e| SessionError::SendFailed {
                phone: phone.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SessionError::SendFailed {
                phone: phone.to_string(),
                reason: format!("gateway returned {status}: {body}"),
            });
        }

        let body: SendResponse = resp
            .json()
            .await
            .map_err(|e| SessionError::InvalidResponse(e.to_string()))?;
        Ok(body.success)
    }

    async fn close(&self) -> Result<(), SessionError> {
        let url = endpoint(&self.base_url, &self.session_name, "disconnect")?;

        let resp = self
            .client
            .post(url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await?;

        if !resp.status().is_success() {
            warn!(
                session = %self.session_name,
                status = ?resp.status(),
                "Gateway refused disconnect"
            );
        }
        Ok(())
    }
}

/// `{base}/api/sessions/{session}/{action}`, with the session name escaped.
fn endpoint(base: &Url, session: &str, action: &str) -> Result<Url, SessionError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| SessionError::Http(format!("gateway URL cannot be a base: {base}")))?
        .pop_if_empty()
        .extend(["api", "sessions", session, action]);
    Ok(url)
}
