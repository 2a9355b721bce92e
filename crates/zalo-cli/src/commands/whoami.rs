//! `zalo whoami`: show the profile of the logged-in account.

use anyhow::{Context, Result};

use crate::config::Config;

pub async fn run(cfg: &Config) -> Result<()> {
    let client = super::open_client(cfg)?;
    let info = client
        .fetch_account_info()
        .await
        .context("failed to fetch profile")?;

    println!("{:<8} {}", "USER", info.user_id);
    println!("{:<8} {}", "NAME", info.display_name.as_deref().unwrap_or("-"));
    println!("{:<8} {}", "PHONE", info.phone_number.as_deref().unwrap_or("-"));
    Ok(())
}
