//! `zalo listen`: run the poll loop with a small echo bot.
//!
//! Every message is logged; `/info` answers with the account and thread ids,
//! `/ping` answers `pong`. Ctrl-C stops polling and waits for the loop.

use anyhow::{Context, Result};
use tracing::{info, warn};
use zalo_client::{HandlerRegistry, MessageEvent, ZaloClient};

use crate::config::Config;

pub async fn run(cfg: &Config, ack: bool) -> Result<()> {
    let client = super::open_client(cfg)?;
    let registry = build_registry(&client, &cfg.listen.prefix, ack);

    let (poll, mut failures) = client.poll_loop(registry)?;
    let handle = poll.spawn();

    let failure_count = tokio::spawn(async move {
        let mut count = 0u64;
        while failures.recv().await.is_some() {
            count += 1;
        }
        count
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl-C")?;
    info!("stopping...");
    handle.stop();
    let stats = handle.join().await?;
    let failed = failure_count.await.unwrap_or(0);

    println!(
        "Dispatched {} message(s) over {} poll(s); {} fetch error(s), {} handler failure(s).",
        stats.dispatched, stats.cycles, stats.fetch_failures, failed
    );
    Ok(())
}

fn build_registry(client: &ZaloClient, prefix: &str, ack: bool) -> HandlerRegistry {
    let mut registry = HandlerRegistry::with_prefix(prefix);

    let c = client.clone();
    registry.on_message(move |event: MessageEvent| {
        let client = c.clone();
        async move {
            info!(
                author = %event.author_id,
                thread = %event.thread_id,
                kind = %event.thread_type,
                "{}",
                event.content_text()
            );
            if ack {
                if let Err(e) = client.mark_as_delivered(&event).await {
                    warn!(msg_id = %event.message_id, "delivery receipt failed: {}", e);
                }
            }
            anyhow::Ok(())
        }
    });

    let c = client.clone();
    registry.command("/info", move |event: MessageEvent| {
        let client = c.clone();
        async move {
            let reply = format!(
                "user: {}\nthread: {} {}",
                client.user_id().unwrap_or_default(),
                event.thread_type,
                event.thread_id
            );
            reply_to(&client, &event, &reply).await
        }
    });

    let c = client.clone();
    registry.command("/ping", move |event: MessageEvent| {
        let client = c.clone();
        async move { reply_to(&client, &event, "pong").await }
    });

    registry
}

async fn reply_to(client: &ZaloClient, event: &MessageEvent, text: &str) -> Result<()> {
    client
        .send_message(text, &event.thread_id, event.thread_type, None)
        .await
        .with_context(|| format!("failed to reply in {}", event.thread_id))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zalo_client::ClientConfig;

    fn labels(registry: &HandlerRegistry, content: &str) -> Vec<String> {
        registry.matches(content).into_iter().map(|(label, _)| label).collect()
    }

    #[test]
    fn bot_answers_its_commands_and_logs_everything() {
        let client = ZaloClient::new(ClientConfig::default()).unwrap();
        let registry = build_registry(&client, "", false);

        assert_eq!(labels(&registry, "/info"), ["on_message", "command:/info"]);
        assert_eq!(labels(&registry, "/ping"), ["on_message", "command:/ping"]);
        assert_eq!(labels(&registry, "hello"), ["on_message"]);
    }

    #[test]
    fn prefix_applies_to_bot_commands() {
        let client = ZaloClient::new(ClientConfig::default()).unwrap();
        let registry = build_registry(&client, "!", false);

        assert_eq!(labels(&registry, "!/ping"), ["on_message", "command:!/ping"]);
        assert_eq!(labels(&registry, "/ping"), ["on_message"]);
    }
}
