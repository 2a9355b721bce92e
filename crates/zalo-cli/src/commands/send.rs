//! `zalo send`: send one text message.

use anyhow::{Context, Result};
use zalo_client::{ThreadType, Urgency};

use crate::config::Config;

pub async fn run(
    cfg: &Config,
    thread: &str,
    text: &str,
    group: bool,
    urgency: Option<&str>,
) -> Result<()> {
    let thread_type = if group {
        ThreadType::Group
    } else {
        ThreadType::Direct
    };
    let urgency = urgency.map(str::parse::<Urgency>).transpose()?;

    let client = super::open_client(cfg)?;
    let sent = client
        .send_message(text, thread, thread_type, urgency)
        .await
        .with_context(|| format!("failed to send to {thread_type} {thread}"))?;

    println!("Sent message {}", sent.message_id);
    Ok(())
}
