//! Feature methods: thin instantiations of the gateway contract.
//!
//! Each method validates its arguments before anything touches the network,
//! builds an ordered parameter map, and issues one enveloped call.

use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use zalo_core::protocol::{endpoints, receipt_cmd};
use zalo_core::settings::{resolve_group_settings, GroupSettingsPatch, SettingsFallback};
use zalo_core::{MessageEvent, ParamMap, Snapshot, ThreadType, ZaloError, ZaloResult};

use crate::client::ZaloClient;
use crate::hooks::ActionReceipt;
use crate::poller::unix_now_ms;

/// Service URLs used by the feature methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub profile_me: String,
    pub last_msgs: String,
    pub group_info: String,
    pub group_setting_update: String,
    pub user_send: String,
    pub group_send: String,
    pub user_typing: String,
    pub group_typing: String,
    pub user_delivered: String,
    pub group_delivered: String,
    pub user_seen: String,
    pub group_seen: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            profile_me: endpoints::PROFILE_ME.into(),
            last_msgs: endpoints::LAST_MSGS.into(),
            group_info: endpoints::GROUP_INFO.into(),
            group_setting_update: endpoints::GROUP_SETTING_UPDATE.into(),
            user_send: endpoints::USER_SEND.into(),
            group_send: endpoints::GROUP_SEND.into(),
            user_typing: endpoints::USER_TYPING.into(),
            group_typing: endpoints::GROUP_TYPING.into(),
            user_delivered: endpoints::USER_DELIVERED.into(),
            group_delivered: endpoints::GROUP_DELIVERED.into(),
            user_seen: endpoints::USER_SEEN.into(),
            group_seen: endpoints::GROUP_SEEN.into(),
        }
    }
}

impl Endpoints {
    /// Every endpoint path served from `base` instead of the service hosts.
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let rebase = |url: &str| {
            let path = url.find("/api/").map_or(url, |i| &url[i..]);
            format!("{base}{path}")
        };
        let d = Self::default();
        Self {
            profile_me: rebase(&d.profile_me),
            last_msgs: rebase(&d.last_msgs),
            group_info: rebase(&d.group_info),
            group_setting_update: rebase(&d.group_setting_update),
            user_send: rebase(&d.user_send),
            group_send: rebase(&d.group_send),
            user_typing: rebase(&d.user_typing),
            group_typing: rebase(&d.group_typing),
            user_delivered: rebase(&d.user_delivered),
            group_delivered: rebase(&d.group_delivered),
            user_seen: rebase(&d.user_seen),
            group_seen: rebase(&d.group_seen),
        }
    }
}

/// Profile of the logged-in account.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountInfo {
    pub user_id: String,
    pub display_name: Option<String>,
    pub phone_number: Option<String>,
    /// The full decoded profile data.
    pub raw: Value,
}

impl AccountInfo {
    fn from_data(data: Value) -> Self {
        let profile = data.get("profile").unwrap_or(&data);
        let field = |name: &str| match profile.get(name) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self {
            user_id: field("userId").unwrap_or_default(),
            display_name: field("displayName").or_else(|| field("zaloName")),
            phone_number: field("phoneNumber"),
            raw: data,
        }
    }
}

/// Result of a send.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub message_id: String,
    pub raw: Value,
}

/// Urgency mark attached to a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Important,
    Urgent,
}

impl Urgency {
    fn code(self) -> u8 {
        match self {
            Urgency::Important => 1,
            Urgency::Urgent => 2,
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Urgency::Important => "important",
            Urgency::Urgent => "urgent",
        })
    }
}

impl FromStr for Urgency {
    type Err = ZaloError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "important" => Ok(Urgency::Important),
            "urgent" => Ok(Urgency::Urgent),
            other => Err(ZaloError::InvalidInput(format!("unknown urgency: {other}"))),
        }
    }
}

fn require(value: &str, what: &str) -> ZaloResult<()> {
    if value.trim().is_empty() {
        return Err(ZaloError::InvalidInput(format!("{what} must not be empty")));
    }
    Ok(())
}

fn id_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

impl ZaloClient {
    fn imei_value(&self) -> Value {
        self.read().imei().map_or(Value::Null, |imei| json!(imei))
    }

    /// Fetch the profile of the logged-in account.
    pub async fn fetch_account_info(&self) -> ZaloResult<AccountInfo> {
        let mut params = ParamMap::new();
        params.insert("avatar_size".into(), json!(120));
        params.insert("imei".into(), self.imei_value());

        let query = [("os", "8".to_string()), ("browser", "0".to_string())];
        let data = self
            .gateway()
            .get(&self.endpoints().profile_me, &params, &query)
            .await?;
        Ok(AccountInfo::from_data(data))
    }

    /// Fetch the latest-messages snapshot the poll loop works from.
    pub async fn get_last_msgs(&self) -> ZaloResult<Snapshot> {
        let mut params = ParamMap::new();
        params.insert("threadIdLocalMsgId".into(), json!("{}"));
        params.insert("imei".into(), self.imei_value());

        let data = self
            .gateway()
            .get(&self.endpoints().last_msgs, &params, &[])
            .await?;
        Snapshot::from_value(&data)
    }

    /// Fetch group details, including each group's current settings.
    pub async fn fetch_group_info(&self, group_id: &str) -> ZaloResult<Value> {
        require(group_id, "group id")?;

        let mut versions = serde_json::Map::new();
        versions.insert(group_id.to_string(), json!(0));
        let mut params = ParamMap::new();
        params.insert("gridVerMap".into(), json!(Value::Object(versions).to_string()));

        self.gateway()
            .post(&self.endpoints().group_info, &params, &[])
            .await
    }

    /// Send a text message to a user or group.
    pub async fn send_message(
        &self,
        text: &str,
        thread_id: &str,
        thread_type: ThreadType,
        urgency: Option<Urgency>,
    ) -> ZaloResult<SentMessage> {
        require(text, "message text")?;
        require(thread_id, "thread id")?;

        let mut params = ParamMap::new();
        params.insert("message".into(), json!(text));
        params.insert("clientId".into(), json!(unix_now_ms()));
        params.insert("imei".into(), self.imei_value());
        params.insert("ttl".into(), json!(0));
        if let Some(urgency) = urgency {
            params.insert("metaData".into(), json!({ "urgency": urgency.code() }));
        }

        let url = match thread_type {
            ThreadType::Direct => {
                params.insert("toid".into(), json!(thread_id));
                &self.endpoints().user_send
            }
            ThreadType::Group => {
                params.insert("visibility".into(), json!(0));
                params.insert("grid".into(), json!(thread_id));
                &self.endpoints().group_send
            }
        };

        let data = self
            .gateway()
            .post(url, &params, &[("nretry", "0".to_string())])
            .await?;
        Ok(SentMessage {
            message_id: id_string(data.get("msgId")),
            raw: data,
        })
    }

    /// Show the typing indicator in a thread.
    pub async fn set_typing(&self, thread_id: &str, thread_type: ThreadType) -> ZaloResult<()> {
        require(thread_id, "thread id")?;

        let mut params = ParamMap::new();
        params.insert("imei".into(), self.imei_value());
        let url = match thread_type {
            ThreadType::Direct => {
                params.insert("toid".into(), json!(thread_id));
                params.insert("destType".into(), json!(3));
                &self.endpoints().user_typing
            }
            ThreadType::Group => {
                params.insert("grid".into(), json!(thread_id));
                &self.endpoints().group_typing
            }
        };

        self.gateway().post(url, &params, &[]).await?;
        Ok(())
    }

    /// Acknowledge delivery of `event`. Fires `on_message_delivered`.
    pub async fn mark_as_delivered(&self, event: &MessageEvent) -> ZaloResult<()> {
        require(&event.message_id, "message id")?;
        let ts = unix_now_ms();
        let destination = receipt_destination(event);

        let mut item = receipt_item(event, &destination);
        item.insert("at".into(), json!(0));
        item.insert("ts".into(), json!(ts.to_string()));

        let mut infos = ParamMap::new();
        infos.insert("seen".into(), json!(0));
        let mut params = ParamMap::new();
        let url = match event.thread_type {
            ThreadType::Direct => {
                item.insert("cmd".into(), json!(receipt_cmd::USER_DELIVERED));
                infos.insert("data".into(), json!([item]));
                params.insert("msgInfos".into(), json!(Value::Object(infos).to_string()));
                &self.endpoints().user_delivered
            }
            ThreadType::Group => {
                item.insert("cmd".into(), json!(receipt_cmd::GROUP_DELIVERED));
                infos.insert("data".into(), json!([item]));
                infos.insert("grid".into(), json!(destination));
                params.insert("msgInfos".into(), json!(Value::Object(infos).to_string()));
                params.insert("imei".into(), self.imei_value());
                &self.endpoints().group_delivered
            }
        };

        self.gateway().post(url, &params, &[]).await?;
        self.hooks().on_message_delivered(&receipt(event, ts));
        Ok(())
    }

    /// Mark `event` as seen. Fires `on_marked_seen`.
    pub async fn mark_as_read(&self, event: &MessageEvent) -> ZaloResult<()> {
        require(&event.message_id, "message id")?;
        let ts = unix_now_ms();
        let destination = receipt_destination(event);

        let mut item = receipt_item(event, &destination);
        item.insert("ts".into(), json!(ts.to_string()));
        let (at, cmd) = match event.thread_type {
            ThreadType::Direct => (7, receipt_cmd::USER_SEEN),
            ThreadType::Group => (0, receipt_cmd::GROUP_SEEN),
        };
        item.insert("at".into(), json!(at));
        item.insert("cmd".into(), json!(cmd));

        let infos = json!({ "data": [item] });
        let mut params = ParamMap::new();
        params.insert("msgInfos".into(), json!(infos.to_string()));
        params.insert("imei".into(), self.imei_value());
        let url = match event.thread_type {
            ThreadType::Direct => {
                params.insert("senderId".into(), json!(destination));
                &self.endpoints().user_seen
            }
            ThreadType::Group => {
                params.insert("grid".into(), json!(destination));
                &self.endpoints().group_seen
            }
        };

        self.gateway()
            .post(url, &params, &[("nretry", "0".to_string())])
            .await?;
        self.hooks().on_marked_seen(&receipt(event, ts));
        Ok(())
    }

    /// Update a group's settings. Flags not set in `patch` come from
    /// `fallback`; with [`SettingsFallback::Current`] the group's current
    /// settings are fetched first.
    pub async fn change_group_setting(
        &self,
        group_id: &str,
        patch: &GroupSettingsPatch,
        fallback: SettingsFallback,
    ) -> ZaloResult<Value> {
        require(group_id, "group id")?;

        let group_info = match fallback {
            SettingsFallback::Current => Some(self.fetch_group_info(group_id).await?),
            SettingsFallback::AntiRaid => None,
        };
        let settings = resolve_group_settings(group_id, group_info.as_ref(), patch, fallback);
        let imei = self.imei().unwrap_or_default();

        self.gateway()
            .get(
                &self.endpoints().group_setting_update,
                &settings.to_params(group_id, &imei),
                &[],
            )
            .await
    }
}

/// Direct receipts are addressed to `"0"`, group receipts to the group.
fn receipt_destination(event: &MessageEvent) -> String {
    match event.thread_type {
        ThreadType::Direct => "0".to_string(),
        ThreadType::Group => event.thread_id.clone(),
    }
}

fn receipt_item(event: &MessageEvent, destination: &str) -> ParamMap {
    let mut item = ParamMap::new();
    item.insert("cmi".into(), json!(event.client_message_id));
    item.insert("gmi".into(), json!(event.message_id));
    item.insert("si".into(), json!(event.author_id));
    item.insert("di".into(), json!(destination));
    item.insert("mt".into(), json!(event.msg_type));
    item.insert("st".into(), json!(3));
    item
}

fn receipt(event: &MessageEvent, ts: i64) -> ActionReceipt {
    ActionReceipt {
        message_ids: vec![event.message_id.clone()],
        thread_id: event.thread_id.clone(),
        thread_type: event.thread_type,
        ts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{logged_in_client, sealed, secret, RecordingHooks, IMEI};
    use mockito::Matcher;
    use std::sync::Arc;
    use zalo_core::encode;
    use zalo_core::settings::GroupSettings;

    fn incoming(thread_type: ThreadType) -> MessageEvent {
        MessageEvent {
            message_id: "7001".into(),
            client_message_id: "c7001".into(),
            author_id: "2001".into(),
            thread_id: if thread_type == ThreadType::Group { "g1".into() } else { "2001".into() },
            thread_type,
            msg_type: "webchat".into(),
            content: json!("hello"),
            timestamp: 0,
            snapshot_index: 0,
        }
    }

    #[test]
    fn endpoints_can_be_rooted_elsewhere() {
        let e = Endpoints::rooted_at("http://127.0.0.1:1234/");
        assert_eq!(e.user_send, "http://127.0.0.1:1234/api/message/sms");
        assert_eq!(e.last_msgs, "http://127.0.0.1:1234/api/preloadconvers/get-last-msgs");
        assert_eq!(Endpoints::default().user_send, endpoints::USER_SEND);
    }

    #[test]
    fn urgency_parses_case_insensitively() {
        assert_eq!("Urgent".parse::<Urgency>().unwrap(), Urgency::Urgent);
        assert_eq!("important".parse::<Urgency>().unwrap().code(), 1);
        assert!(matches!("loud".parse::<Urgency>(), Err(ZaloError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn fetch_account_info_reads_profile() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/social/profile/me-v2")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("os".into(), "8".into()),
                Matcher::UrlEncoded("browser".into(), "0".into()),
            ]))
            .with_status(200)
            .with_body(sealed(json!({"profile": {
                "userId": "1000", "displayName": "Bot", "phoneNumber": "84900000000"
            }})))
            .create_async()
            .await;

        let info = logged_in_client(&server.url()).fetch_account_info().await.unwrap();
        assert_eq!(info.user_id, "1000");
        assert_eq!(info.display_name.as_deref(), Some("Bot"));
        assert_eq!(info.phone_number.as_deref(), Some("84900000000"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_last_msgs_builds_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/preloadconvers/get-last-msgs")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(sealed(json!({
                "msgs": [{"msgId": "1", "cliMsgId": "c1", "uidFrom": "2001", "idTo": "1000",
                          "msgType": "webchat", "content": "hi", "ts": "1700000000000"}],
                "groupMsgs": []
            })))
            .create_async()
            .await;

        let snapshot = logged_in_client(&server.url()).get_last_msgs().await.unwrap();
        assert_eq!(snapshot.direct.len(), 1);
        assert_eq!(snapshot.direct[0].ts, 1_700_000_000_000);
        assert!(snapshot.group.is_empty());
    }

    #[tokio::test]
    async fn send_message_routes_by_thread_type() {
        let mut server = mockito::Server::new_async().await;
        let direct = server
            .mock("POST", "/api/message/sms")
            .match_query(Matcher::UrlEncoded("nretry".into(), "0".into()))
            .match_body(Matcher::Regex("params=".into()))
            .with_status(200)
            .with_body(sealed(json!({"msgId": 555})))
            .create_async()
            .await;
        let group = server
            .mock("POST", "/api/group/sendmsg")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(sealed(json!({"msgId": "556"})))
            .create_async()
            .await;

        let client = logged_in_client(&server.url());
        let sent = client
            .send_message("hi", "2001", ThreadType::Direct, Some(Urgency::Urgent))
            .await
            .unwrap();
        assert_eq!(sent.message_id, "555");

        let sent = client.send_message("hi all", "g1", ThreadType::Group, None).await.unwrap();
        assert_eq!(sent.message_id, "556");

        direct.assert_async().await;
        group.assert_async().await;
    }

    #[tokio::test]
    async fn usage_errors_never_reach_the_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = logged_in_client(&server.url());
        let err = client.send_message("", "2001", ThreadType::Direct, None).await.unwrap_err();
        assert!(matches!(err, ZaloError::InvalidInput(_)));
        let err = client.send_message("hi", " ", ThreadType::Group, None).await.unwrap_err();
        assert!(matches!(err, ZaloError::InvalidInput(_)));
        let err = client.set_typing("", ThreadType::Direct).await.unwrap_err();
        assert!(matches!(err, ZaloError::InvalidInput(_)));
        let err = client.fetch_group_info("").await.unwrap_err();
        assert!(matches!(err, ZaloError::InvalidInput(_)));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn set_typing_posts_to_thread_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/group/typing")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(sealed(json!({"status": 1})))
            .create_async()
            .await;

        logged_in_client(&server.url())
            .set_typing("g1", ThreadType::Group)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn receipts_fire_hooks() {
        let mut server = mockito::Server::new_async().await;
        let delivered = server
            .mock("POST", "/api/group/deliveredv2")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(sealed(json!({"status": 1})))
            .create_async()
            .await;
        let seen = server
            .mock("POST", "/api/message/seenv2")
            .match_query(Matcher::UrlEncoded("nretry".into(), "0".into()))
            .with_status(200)
            .with_body(sealed(json!({"status": 1})))
            .create_async()
            .await;

        let hooks = Arc::new(RecordingHooks::default());
        let client = logged_in_client(&server.url()).with_hooks(hooks.clone());

        client.mark_as_delivered(&incoming(ThreadType::Group)).await.unwrap();
        client.mark_as_read(&incoming(ThreadType::Direct)).await.unwrap();

        assert_eq!(hooks.events(), ["delivered:7001", "seen:7001"]);
        delivered.assert_async().await;
        seen.assert_async().await;
    }

    #[tokio::test]
    async fn failed_receipt_does_not_fire_hook() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/message/deliveredv2")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"error_code":114,"error_message":"invalid params"}"#)
            .create_async()
            .await;

        let hooks = Arc::new(RecordingHooks::default());
        let client = logged_in_client(&server.url()).with_hooks(hooks.clone());

        let err = client.mark_as_delivered(&incoming(ThreadType::Direct)).await.unwrap_err();
        assert_eq!(err.code(), Some(114));
        assert!(hooks.events().is_empty());
    }

    #[tokio::test]
    async fn anti_raid_settings_skip_group_fetch() {
        let expected = encode(&GroupSettings::anti_raid().to_params("g1", IMEI), &secret()).unwrap();

        let mut server = mockito::Server::new_async().await;
        let info = server
            .mock("POST", "/api/group/getmg-v2")
            .expect(0)
            .create_async()
            .await;
        let update = server
            .mock("GET", "/api/group/setting/update")
            .match_query(Matcher::UrlEncoded("params".into(), expected))
            .with_status(200)
            .with_body(sealed(json!({"ok": 1})))
            .create_async()
            .await;

        let result = logged_in_client(&server.url())
            .change_group_setting("g1", &GroupSettingsPatch::default(), SettingsFallback::AntiRaid)
            .await
            .unwrap();
        assert_eq!(result, json!({"ok": 1}));
        info.assert_async().await;
        update.assert_async().await;
    }

    #[tokio::test]
    async fn current_settings_are_fetched_and_patched() {
        let patch = GroupSettingsPatch {
            lock_send_msg: Some(1),
            ..Default::default()
        };
        let mut settings = GroupSettings::anti_raid();
        settings.block_name = 0;
        settings.lock_send_msg = 1;
        let expected = encode(&settings.to_params("g1", IMEI), &secret()).unwrap();

        let mut server = mockito::Server::new_async().await;
        let info = server
            .mock("POST", "/api/group/getmg-v2")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(sealed(json!({"gridInfoMap": {"g1": {"setting": {"blockName": 0}}}})))
            .create_async()
            .await;
        let update = server
            .mock("GET", "/api/group/setting/update")
            .match_query(Matcher::UrlEncoded("params".into(), expected))
            .with_status(200)
            .with_body(sealed(json!({"ok": 1})))
            .create_async()
            .await;

        logged_in_client(&server.url())
            .change_group_setting("g1", &patch, SettingsFallback::Current)
            .await
            .unwrap();
        info.assert_async().await;
        update.assert_async().await;
    }
}
