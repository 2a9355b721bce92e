//! Group settings resolution.
//!
//! The settings update endpoint replaces every flag at once, so a partial
//! change must be merged onto a base: either the group's current settings
//! or the anti-raid preset. Flags use `1` for on and `0` for off.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::envelope::ParamMap;

/// Where unspecified settings come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettingsFallback {
    /// Keep the group's current settings (from a group-info fetch).
    #[default]
    Current,
    /// Start from the anti-raid preset.
    AntiRaid,
}

/// A complete set of group settings as sent to the update endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSettings {
    pub block_name: i64,
    pub sign_admin_msg: i64,
    pub add_member_only: i64,
    pub set_topic_only: i64,
    pub enable_msg_history: i64,
    pub lock_create_post: i64,
    pub lock_create_poll: i64,
    pub join_appr: i64,
    pub bann_feature: i64,
    pub dirty_media: i64,
    pub ban_duration: i64,
    pub lock_send_msg: i64,
    pub lock_view_member: i64,
    #[serde(rename = "blocked_members", default)]
    pub blocked_members: Vec<String>,
}

impl GroupSettings {
    /// The anti-raid preset. Also the per-field default when the current
    /// settings do not carry a flag.
    pub fn anti_raid() -> Self {
        Self {
            block_name: 1,
            sign_admin_msg: 1,
            add_member_only: 0,
            set_topic_only: 1,
            enable_msg_history: 1,
            lock_create_post: 1,
            lock_create_poll: 1,
            join_appr: 1,
            bann_feature: 0,
            dirty_media: 0,
            ban_duration: 0,
            lock_send_msg: 0,
            lock_view_member: 0,
            blocked_members: Vec::new(),
        }
    }

    /// Read settings from a group's `setting` map, defaulting missing flags.
    pub fn from_setting_map(map: &Map<String, Value>) -> Self {
        let defaults = Self::anti_raid();
        let flag = |key: &str, default: i64| {
            map.get(key)
                .and_then(|v| v.as_i64().or_else(|| v.as_str()?.parse().ok()))
                .unwrap_or(default)
        };

        Self {
            block_name: flag("blockName", defaults.block_name),
            sign_admin_msg: flag("signAdminMsg", defaults.sign_admin_msg),
            add_member_only: flag("addMemberOnly", defaults.add_member_only),
            set_topic_only: flag("setTopicOnly", defaults.set_topic_only),
            enable_msg_history: flag("enableMsgHistory", defaults.enable_msg_history),
            lock_create_post: flag("lockCreatePost", defaults.lock_create_post),
            lock_create_poll: flag("lockCreatePoll", defaults.lock_create_poll),
            join_appr: flag("joinAppr", defaults.join_appr),
            bann_feature: flag("bannFeature", defaults.bann_feature),
            dirty_media: flag("dirtyMedia", defaults.dirty_media),
            ban_duration: flag("banDuration", defaults.ban_duration),
            lock_send_msg: flag("lockSendMsg", defaults.lock_send_msg),
            lock_view_member: flag("lockViewMember", defaults.lock_view_member),
            blocked_members: Vec::new(),
        }
    }

    /// Parameters for the settings update call, in the order the service
    /// expects.
    pub fn to_params(&self, group_id: &str, imei: &str) -> ParamMap {
        let mut p = ParamMap::new();
        p.insert("blockName".into(), json!(self.block_name));
        p.insert("signAdminMsg".into(), json!(self.sign_admin_msg));
        p.insert("addMemberOnly".into(), json!(self.add_member_only));
        p.insert("setTopicOnly".into(), json!(self.set_topic_only));
        p.insert("enableMsgHistory".into(), json!(self.enable_msg_history));
        p.insert("lockCreatePost".into(), json!(self.lock_create_post));
        p.insert("lockCreatePoll".into(), json!(self.lock_create_poll));
        p.insert("joinAppr".into(), json!(self.join_appr));
        p.insert("bannFeature".into(), json!(self.bann_feature));
        p.insert("dirtyMedia".into(), json!(self.dirty_media));
        p.insert("banDuration".into(), json!(self.ban_duration));
        p.insert("lockSendMsg".into(), json!(self.lock_send_msg));
        p.insert("lockViewMember".into(), json!(self.lock_view_member));
        p.insert("blocked_members".into(), json!(self.blocked_members));
        p.insert("grid".into(), json!(group_id));
        p.insert("imei".into(), json!(imei));
        p
    }
}

/// A partial settings change. `None` fields keep the fallback value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupSettingsPatch {
    pub block_name: Option<i64>,
    pub sign_admin_msg: Option<i64>,
    pub add_member_only: Option<i64>,
    pub set_topic_only: Option<i64>,
    pub enable_msg_history: Option<i64>,
    pub lock_create_post: Option<i64>,
    pub lock_create_poll: Option<i64>,
    pub join_appr: Option<i64>,
    pub bann_feature: Option<i64>,
    pub dirty_media: Option<i64>,
    pub ban_duration: Option<i64>,
    pub lock_send_msg: Option<i64>,
    pub lock_view_member: Option<i64>,
    #[serde(rename = "blocked_members")]
    pub blocked_members: Option<Vec<String>>,
}

impl GroupSettingsPatch {
    fn apply(&self, base: GroupSettings) -> GroupSettings {
        GroupSettings {
            block_name: self.block_name.unwrap_or(base.block_name),
            sign_admin_msg: self.sign_admin_msg.unwrap_or(base.sign_admin_msg),
            add_member_only: self.add_member_only.unwrap_or(base.add_member_only),
            set_topic_only: self.set_topic_only.unwrap_or(base.set_topic_only),
            enable_msg_history: self.enable_msg_history.unwrap_or(base.enable_msg_history),
            lock_create_post: self.lock_create_post.unwrap_or(base.lock_create_post),
            lock_create_poll: self.lock_create_poll.unwrap_or(base.lock_create_poll),
            join_appr: self.join_appr.unwrap_or(base.join_appr),
            bann_feature: self.bann_feature.unwrap_or(base.bann_feature),
            dirty_media: self.dirty_media.unwrap_or(base.dirty_media),
            ban_duration: self.ban_duration.unwrap_or(base.ban_duration),
            lock_send_msg: self.lock_send_msg.unwrap_or(base.lock_send_msg),
            lock_view_member: self.lock_view_member.unwrap_or(base.lock_view_member),
            // Blocked members are never inherited: the list is sent as given.
            blocked_members: self.blocked_members.clone().unwrap_or_default(),
        }
    }
}

/// Extract a group's current `setting` map from a group-info response
/// (`gridInfoMap.<group_id>.setting`).
pub fn current_setting_map<'a>(group_info: &'a Value, group_id: &str) -> Option<&'a Map<String, Value>> {
    group_info
        .get("gridInfoMap")?
        .get(group_id)?
        .get("setting")?
        .as_object()
}

/// Resolve the full settings to send for `group_id`.
///
/// With [`SettingsFallback::Current`] the base is the group's current
/// settings taken from `group_info`; flags it lacks (or a missing
/// `group_info`) fall back to the per-field defaults.
pub fn resolve_group_settings(
    group_id: &str,
    group_info: Option<&Value>,
    patch: &GroupSettingsPatch,
    fallback: SettingsFallback,
) -> GroupSettings {
    let base = match fallback {
        SettingsFallback::AntiRaid => GroupSettings::anti_raid(),
        SettingsFallback::Current => group_info
            .and_then(|info| current_setting_map(info, group_id))
            .map(GroupSettings::from_setting_map)
            .unwrap_or_else(GroupSettings::anti_raid),
    };
    patch.apply(base)
}
