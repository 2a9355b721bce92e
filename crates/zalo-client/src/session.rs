//! Session state: cookie jar, user id, device id, and codec secret.
//!
//! A `Session` is mutated only by login/logout and by re-deriving the user
//! id after a profile fetch. While polling it is treated as immutable; a
//! re-login requires stopping the poll loop first.

use serde_json::{Map, Value};
use zalo_core::{SecretKey, ZaloError, ZaloResult};

/// Opaque cookie jar, kept as the exact JSON mapping it was imported from.
pub type CookieJar = Map<String, Value>;

/// Cookie carrying the web session.
pub const SESSION_COOKIE: &str = "zpw_sek";

/// Cookies the numeric user id may be read from, in order of preference.
pub const USER_ID_COOKIES: [&str; 2] = ["zpw_uid", "uid"];

/// Credentials snapshot handed to each gateway call.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub cookie_header: String,
    pub secret: SecretKey,
    pub user_agent: String,
}

/// Authentication state of one account.
#[derive(Debug, Clone, Default)]
pub struct Session {
    cookies: Option<CookieJar>,
    user_id: Option<String>,
    imei: Option<String>,
    secret: Option<SecretKey>,
    user_agent: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load session cookies.
    ///
    /// Returns `false` without touching the current state unless `cookies`
    /// is a mapping with a session cookie and a numeric user id cookie.
    pub fn set_session(&mut self, cookies: &Value) -> bool {
        let Value::Object(jar) = cookies else {
            return false;
        };
        if cookie_str(jar, SESSION_COOKIE).map_or(true, str::is_empty) {
            return false;
        }
        let Some(user_id) = user_id_from_cookies(jar) else {
            return false;
        };

        self.cookies = Some(jar.clone());
        self.user_id = Some(user_id);
        true
    }

    /// Snapshot of the cookie jar for persistence.
    pub fn get_session(&self) -> Option<CookieJar> {
        self.cookies.clone()
    }

    /// Load the codec secret. A wrong-format key leaves the state unchanged.
    pub fn set_secret_key(&mut self, key: &str) -> bool {
        match SecretKey::from_base64(key) {
            Ok(secret) => {
                self.secret = Some(secret);
                true
            }
            Err(e) => {
                tracing::warn!("rejecting secret key: {}", e);
                false
            }
        }
    }

    /// The codec secret as originally imported.
    pub fn get_secret_key(&self) -> Option<String> {
        self.secret.as_ref().map(|s| s.to_base64().to_string())
    }

    pub fn secret(&self) -> Option<&SecretKey> {
        self.secret.as_ref()
    }

    /// Whether a cookie jar and user id are present. Never touches the network.
    pub fn is_logged_in(&self) -> bool {
        self.cookies.is_some() && self.user_id.is_some()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Replace the user id, e.g. with the one reported by a profile fetch.
    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = Some(user_id.into());
    }

    pub fn imei(&self) -> Option<&str> {
        self.imei.as_deref()
    }

    pub fn set_imei(&mut self, imei: impl Into<String>) {
        self.imei = Some(imei.into());
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn set_user_agent(&mut self, user_agent: Option<String>) {
        self.user_agent = user_agent;
    }

    /// Drop all authentication state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Snapshot what a gateway call needs. Fails with `NotLoggedIn` unless
    /// both the cookie jar and the secret are present.
    pub fn credentials(&self) -> ZaloResult<Credentials> {
        let (Some(cookies), Some(secret)) = (&self.cookies, &self.secret) else {
            return Err(ZaloError::NotLoggedIn);
        };

        Ok(Credentials {
            cookie_header: cookie_header(cookies),
            secret: secret.clone(),
            user_agent: self
                .user_agent
                .clone()
                .unwrap_or_else(|| zalo_core::protocol::DEFAULT_USER_AGENT.to_string()),
        })
    }
}

/// Render a cookie jar as a `Cookie` header value.
pub fn cookie_header(jar: &CookieJar) -> String {
    jar.iter()
        .map(|(name, value)| match value {
            Value::String(s) => format!("{name}={s}"),
            other => format!("{name}={other}"),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn cookie_str<'a>(jar: &'a CookieJar, name: &str) -> Option<&'a str> {
    jar.get(name).and_then(Value::as_str)
}

fn user_id_from_cookies(jar: &CookieJar) -> Option<String> {
    USER_ID_COOKIES.iter().find_map(|name| {
        let id = match jar.get(*name)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let numeric = !id.is_empty() && id.chars().all(|c| c.is_ascii_digit());
        (numeric && id != "0").then_some(id)
    })
}
