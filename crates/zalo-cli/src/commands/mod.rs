//! CLI subcommand implementations.

pub mod listen;
pub mod send;
pub mod session;
pub mod whoami;

use anyhow::{Context, Result};
use zalo_client::ZaloClient;

use crate::config::Config;

/// A client restored from the saved session.
pub fn open_client(cfg: &Config) -> Result<ZaloClient> {
    let store = cfg.session_store()?;
    let snapshot = store
        .load()
        .with_context(|| format!("failed to read session at {}", store.path().display()))?
        .with_context(|| {
            format!(
                "no saved session at {}; run `zalo session import` first",
                store.path().display()
            )
        })?;

    let client = ZaloClient::restore(&snapshot, cfg.client_config())
        .context("saved session is unusable; import it again")?;
    if let Some(user_agent) = &cfg.account.user_agent {
        if snapshot.user_agent.is_none() {
            client.set_user_agent(Some(user_agent.clone()));
        }
    }
    Ok(client)
}
