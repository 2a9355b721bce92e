//! `zalo session`: import, show, and clear the saved session.
//!
//! The cookie jar and secret key are stored exactly as imported; `show`
//! prints cookie names only.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;
use zalo_client::{Session, SessionSnapshot};

use crate::config::Config;

/// Import a cookie jar and secret and save them as the current session.
pub fn run_import(
    cfg: &Config,
    cookies_path: &Path,
    secret: &str,
    imei: Option<String>,
    user_agent: Option<String>,
) -> Result<()> {
    let content = std::fs::read_to_string(cookies_path)
        .with_context(|| format!("failed to read {}", cookies_path.display()))?;
    let cookies: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", cookies_path.display()))?;

    let imei = imei.unwrap_or_else(|| cfg.account.imei.clone());
    let user_agent = user_agent.or_else(|| cfg.account.user_agent.clone());
    let (snapshot, user_id) = build_snapshot(&cookies, secret, &imei, user_agent)?;

    let store = cfg.session_store()?;
    store
        .save(&snapshot)
        .with_context(|| format!("failed to save session to {}", store.path().display()))?;

    println!("Session for user {user_id} saved to {}", store.path().display());
    Ok(())
}

/// Print the saved session without secret values.
pub fn run_show(cfg: &Config) -> Result<()> {
    let store = cfg.session_store()?;
    let Some(snapshot) = store.load().context("failed to read session")? else {
        println!("No saved session at {}.", store.path().display());
        return Ok(());
    };
    let session = snapshot.restore().context("saved session is unusable")?;

    println!("{:<12} {}", "FILE", store.path().display());
    println!("{:<12} {}", "USER", session.user_id().unwrap_or("-"));
    println!("{:<12} {}", "DEVICE", snapshot.imei);
    println!(
        "{:<12} {}",
        "USER AGENT",
        snapshot.user_agent.as_deref().unwrap_or("(default)")
    );
    let names: Vec<&str> = snapshot.cookies.keys().map(String::as_str).collect();
    println!("{:<12} {}", "COOKIES", names.join(", "));
    Ok(())
}

/// Delete the saved session.
pub fn run_clear(cfg: &Config) -> Result<()> {
    let store = cfg.session_store()?;
    if store.clear().context("failed to delete session")? {
        println!("Removed {}.", store.path().display());
    } else {
        println!("No saved session at {}.", store.path().display());
    }
    Ok(())
}

/// Validate imported material and capture it as a snapshot. Returns the
/// snapshot and the user id read from the cookies.
fn build_snapshot(
    cookies: &Value,
    secret: &str,
    imei: &str,
    user_agent: Option<String>,
) -> Result<(SessionSnapshot, String)> {
    if imei.trim().is_empty() {
        bail!("no device id: pass --imei or set account.imei in the config");
    }

    let mut session = Session::new();
    if !session.set_session(cookies) {
        bail!("cookies must be a JSON object with zpw_sek and a numeric zpw_uid or uid");
    }
    if !session.set_secret_key(secret) {
        bail!("secret key must be base64 of 16, 24, or 32 bytes");
    }
    session.set_imei(imei);
    session.set_user_agent(user_agent);

    let user_id = session.user_id().unwrap_or_default().to_string();
    let snapshot = SessionSnapshot::capture(&session)?;
    Ok((snapshot, user_id))
}
