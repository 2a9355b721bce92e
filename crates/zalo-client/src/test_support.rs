//! Shared fixtures for client tests.

use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use zalo_core::{encode, SecretKey};

use crate::api::Endpoints;
use crate::client::{ClientConfig, ZaloClient};
use crate::hooks::{ActionReceipt, LifecycleHooks};
use crate::poller::PollConfig;
use crate::session::Session;

pub(crate) const KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZg==";
pub(crate) const IMEI: &str = "device-1";

pub(crate) fn secret() -> SecretKey {
    SecretKey::from_base64(KEY).unwrap()
}

/// A successful response body whose sealed payload carries `data`.
pub(crate) fn sealed(data: Value) -> String {
    let inner = json!({"error_code": 0, "error_message": "", "data": data});
    let payload = encode(inner.as_object().unwrap(), &secret()).unwrap();
    json!({"error_code": 0, "error_message": "Successful.", "data": payload}).to_string()
}

pub(crate) fn config_for(base: &str) -> ClientConfig {
    ClientConfig {
        endpoints: Endpoints::rooted_at(base),
        poll: PollConfig {
            interval: Duration::from_millis(20),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A client logged in as user `1000`, talking to `base`.
pub(crate) fn logged_in_client(base: &str) -> ZaloClient {
    let mut session = Session::new();
    assert!(session.set_session(&json!({"zpw_sek": "abc", "zpw_uid": "1000"})));
    assert!(session.set_secret_key(KEY));
    session.set_imei(IMEI);
    ZaloClient::with_session(session, config_for(base)).unwrap()
}

/// Hooks that record every call.
#[derive(Default)]
pub(crate) struct RecordingHooks {
    events: Mutex<Vec<String>>,
}

impl RecordingHooks {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl LifecycleHooks for RecordingHooks {
    fn on_logging_in(&self, phone: &str) {
        self.push(format!("logging_in:{phone}"));
    }

    fn on_logged_in(&self, phone: &str) {
        self.push(format!("logged_in:{phone}"));
    }

    fn on_listening(&self) {
        self.push("listening".into());
    }

    fn on_message_delivered(&self, receipt: &ActionReceipt) {
        self.push(format!("delivered:{}", receipt.message_ids.join(",")));
    }

    fn on_marked_seen(&self, receipt: &ActionReceipt) {
        self.push(format!("seen:{}", receipt.message_ids.join(",")));
    }
}
