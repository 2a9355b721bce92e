//! Protocol constants: version tokens, web origin, and endpoint URLs.

/// Protocol version token sent as `zpw_ver` on every call.
pub const ZPW_VER: u32 = 635;

/// Client type token sent as `zpw_type` on every call (30 = web).
pub const ZPW_TYPE: u32 = 30;

/// Origin the web client presents.
pub const WEB_ORIGIN: &str = "https://chat.zalo.me";

/// Default user agent when the session does not carry one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Code used when a success envelope carries no data.
pub const MISSING_DATA_CODE: i64 = 1337;

/// Endpoint URLs used by the client.
pub mod endpoints {
    pub const PROFILE_ME: &str = "https://tt-profile-wpa.chat.zalo.me/api/social/profile/me-v2";
    pub const LAST_MSGS: &str =
        "https://tt-convers-wpa.chat.zalo.me/api/preloadconvers/get-last-msgs";
    pub const GROUP_INFO: &str = "https://tt-group-wpa.chat.zalo.me/api/group/getmg-v2";
    pub const GROUP_SETTING_UPDATE: &str =
        "https://tt-group-wpa.chat.zalo.me/api/group/setting/update";

    pub const USER_SEND: &str = "https://tt-chat2-wpa.chat.zalo.me/api/message/sms";
    pub const GROUP_SEND: &str = "https://tt-group-wpa.chat.zalo.me/api/group/sendmsg";

    pub const USER_TYPING: &str = "https://tt-chat1-wpa.chat.zalo.me/api/message/typing";
    pub const GROUP_TYPING: &str = "https://tt-group-wpa.chat.zalo.me/api/group/typing";

    pub const USER_DELIVERED: &str = "https://tt-chat3-wpa.chat.zalo.me/api/message/deliveredv2";
    pub const GROUP_DELIVERED: &str = "https://tt-group-wpa.chat.zalo.me/api/group/deliveredv2";

    pub const USER_SEEN: &str = "https://tt-chat1-wpa.chat.zalo.me/api/message/seenv2";
    pub const GROUP_SEEN: &str = "https://tt-group-wpa.chat.zalo.me/api/group/seenv2";
}

/// Command codes carried in delivery/seen receipts.
pub mod receipt_cmd {
    pub const USER_DELIVERED: u32 = 501;
    pub const GROUP_DELIVERED: u32 = 521;
    pub const USER_SEEN: u32 = 501;
    pub const GROUP_SEEN: u32 = 511;
}
