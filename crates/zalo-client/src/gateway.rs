//! Request gateway: the single place requests are enveloped and responses
//! unwrapped.
//!
//! Every call carries the session cookies and the `zpw_ver`/`zpw_type`
//! version tokens. The `params` field is encoded with the session secret,
//! sent as a query field for GET and a form field for POST, and the response
//! goes through [`unwrap_envelope`].

use reqwest::header::{ACCEPT, COOKIE, ORIGIN, REFERER, USER_AGENT};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use zalo_core::protocol::{WEB_ORIGIN, ZPW_TYPE, ZPW_VER};
use zalo_core::{encode, unwrap_envelope, ParamMap, ResponseEnvelope, ZaloError, ZaloResult};

use crate::session::{Credentials, Session};

/// Gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Value of the `zpw_ver` token.
    pub zpw_ver: u32,
    /// Value of the `zpw_type` token.
    pub zpw_type: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Origin (and referer) presented to the service.
    pub origin: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            zpw_ver: ZPW_VER,
            zpw_type: ZPW_TYPE,
            timeout: Duration::from_secs(30),
            origin: WEB_ORIGIN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
}

/// Issues enveloped GET/POST calls on behalf of a session.
#[derive(Clone)]
pub struct Gateway {
    http: reqwest::Client,
    session: Arc<RwLock<Session>>,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(session: Arc<RwLock<Session>>, config: GatewayConfig) -> ZaloResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ZaloError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            session,
            config,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// GET `url` with `params` encoded into the query; returns decoded data.
    pub async fn get(
        &self,
        url: &str,
        params: &ParamMap,
        extra_query: &[(&str, String)],
    ) -> ZaloResult<Value> {
        let (envelope, creds) = self.send(Method::Get, url, params, extra_query).await?;
        unwrap_envelope(envelope, &creds.secret)
    }

    /// POST `url` with `params` encoded into the form body; returns decoded data.
    pub async fn post(
        &self,
        url: &str,
        params: &ParamMap,
        extra_query: &[(&str, String)],
    ) -> ZaloResult<Value> {
        let (envelope, creds) = self.send(Method::Post, url, params, extra_query).await?;
        unwrap_envelope(envelope, &creds.secret)
    }

    /// Snapshot the session credentials; the lock is never held across I/O.
    fn credentials(&self) -> ZaloResult<Credentials> {
        let session = self.session.read().unwrap_or_else(|e| e.into_inner());
        session.credentials()
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        params: &ParamMap,
        extra_query: &[(&str, String)],
    ) -> ZaloResult<(ResponseEnvelope, Credentials)> {
        let creds = self.credentials()?;
        let encoded = encode(params, &creds.secret)?;

        let mut query: Vec<(String, String)> = vec![
            ("zpw_ver".into(), self.config.zpw_ver.to_string()),
            ("zpw_type".into(), self.config.zpw_type.to_string()),
        ];
        query.extend(extra_query.iter().map(|(k, v)| (k.to_string(), v.clone())));

        let request = match method {
            Method::Get => {
                query.push(("params".into(), encoded));
                self.http.get(url).query(&query)
            }
            Method::Post => self.http.post(url).query(&query).form(&[("params", encoded)]),
        };

        let referer = format!("{}/", self.config.origin.trim_end_matches('/'));
        let response = request
            .header(COOKIE, &creds.cookie_header)
            .header(USER_AGENT, &creds.user_agent)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(ORIGIN, &self.config.origin)
            .header(REFERER, referer)
            .send()
            .await
            .map_err(|e| ZaloError::Transport(format!("{method:?} {url}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ZaloError::Transport(format!("{method:?} {url}: reading body: {e}")))?;

        tracing::debug!(?method, %url, %status, bytes = body.len(), "gateway response");

        let envelope = match ResponseEnvelope::parse(&body) {
            Ok(envelope) if status.is_success() => envelope,
            Ok(envelope) if !envelope.is_success() => {
                return Err(ZaloError::protocol(envelope.error_code, envelope.diagnostic()))
            }
            Err(e) if status.is_success() => return Err(e),
            _ => {
                return Err(ZaloError::Transport(format!(
                    "{method:?} {url}: HTTP {status}"
                )))
            }
        };

        Ok((envelope, creds))
    }
}
