//! Login seam.
//!
//! The credential exchange itself is opaque to the client: an
//! [`Authenticator`] turns phone/password/device into a [`LoginGrant`]
//! (cookies plus codec secret), and the client installs that grant.

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use zalo_core::{ZaloError, ZaloResult};

/// Input to a credential exchange.
#[derive(Clone)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
    /// Device id the session is bound to.
    pub imei: String,
    pub user_agent: Option<String>,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("phone", &self.phone)
            .field("imei", &self.imei)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl LoginRequest {
    /// Reject empty credentials before anything touches the network.
    pub fn validate(&self) -> ZaloResult<()> {
        if self.phone.trim().is_empty() || self.password.is_empty() {
            return Err(ZaloError::InvalidInput("phone and password not set".into()));
        }
        if self.imei.trim().is_empty() {
            return Err(ZaloError::InvalidInput("device id (imei) not set".into()));
        }
        Ok(())
    }
}

/// Result of a successful credential exchange.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    /// Session cookies as a JSON mapping.
    pub cookies: Value,
    /// Codec secret, base64.
    pub secret_key: String,
    /// User id, when the exchange reports one.
    pub user_id: Option<String>,
    /// Phone number the service associates with the account.
    pub phone_number: Option<String>,
}

/// Performs the credential exchange.
pub trait Authenticator: Send + Sync {
    fn authenticate<'a>(
        &'a self,
        request: &'a LoginRequest,
    ) -> Pin<Box<dyn Future<Output = ZaloResult<LoginGrant>> + Send + 'a>>;
}

/// Authenticator that hands out a grant obtained elsewhere, e.g. cookies and
/// secret exported from a logged-in browser.
#[derive(Debug, Clone)]
pub struct CookieAuthenticator {
    grant: LoginGrant,
}

impl CookieAuthenticator {
    pub fn new(cookies: Value, secret_key: impl Into<String>) -> Self {
        Self {
            grant: LoginGrant {
                cookies,
                secret_key: secret_key.into(),
                user_id: None,
                phone_number: None,
            },
        }
    }
}

impl Authenticator for CookieAuthenticator {
    fn authenticate<'a>(
        &'a self,
        request: &'a LoginRequest,
    ) -> Pin<Box<dyn Future<Output = ZaloResult<LoginGrant>> + Send + 'a>> {
        Box::pin(async move {
            let mut grant = self.grant.clone();
            grant.phone_number = Some(request.phone.clone());
            Ok(grant)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(phone: &str, password: &str) -> LoginRequest {
        LoginRequest {
            phone: phone.into(),
            password: password.into(),
            imei: "device".into(),
            user_agent: None,
        }
    }

    #[test]
    fn empty_credentials_are_rejected() {
        assert!(matches!(
            request("", "pw").validate(),
            Err(ZaloError::InvalidInput(_))
        ));
        assert!(matches!(
            request("0900000000", "").validate(),
            Err(ZaloError::InvalidInput(_))
        ));
        assert!(request("0900000000", "pw").validate().is_ok());
    }

    #[test]
    fn debug_hides_password() {
        let shown = format!("{:?}", request("0900000000", "hunter2"));
        assert!(!shown.contains("hunter2"));
    }

    #[tokio::test]
    async fn cookie_authenticator_returns_grant() {
        let auth = CookieAuthenticator::new(json!({"zpw_sek": "s", "zpw_uid": "5"}), "key");
        let grant = auth.authenticate(&request("0900000000", "pw")).await.unwrap();
        assert_eq!(grant.secret_key, "key");
        assert_eq!(grant.phone_number.as_deref(), Some("0900000000"));
    }
}
