use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use marketplace_chat::api::HttpClient;
use marketplace_chat::models::DeliveryState;
use marketplace_chat::{
    Attachment, BearerSession, ConversationEvent, ConversationSync, Draft, Message, PartnerResolver,
    RunnerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketplace_chat=debug".into()),
        )
        .init();

    let config = RunnerConfig::from_env()?;

    // ── Collaborators ─────────────────────────────────────────────────────────
    let session = Arc::new(BearerSession::new(config.bearer_token.clone()));
    let client = Arc::new(HttpClient::new(&config.api_base_url, session.clone())?);

    // ── Partner resolution ────────────────────────────────────────────────────
    let resolver = PartnerResolver::new(client.clone(), session.clone());
    let resolved = resolver.resolve(&config.caller).await?;
    for partner in &resolved.partners {
        info!("Linked partner: {} ({})", partner.display_name, partner.id);
    }

    let partner = match &config.partner_id {
        Some(id) => resolved.partners.iter().find(|p| &p.id == id).cloned(),
        None => resolved.partners.first().cloned(),
    };
    let Some(partner) = partner else {
        bail!("No linked partner to chat with");
    };

    // ── Engine ────────────────────────────────────────────────────────────────
    let (handle, mut events) = ConversationSync::spawn(
        config.sync,
        config.caller.role,
        resolved.addressing,
        client,
        session,
    );
    let _observer = handle.select_partner(partner.clone())?;
    info!(
        "Chatting with {}. Type a message, or /receipt <order>, /product <id>, /attach <path> [text], /quit",
        partner.display_name
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed: Vec<(String, DeliveryState)> = Vec::new();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else { break };
                let line = line.trim();
                if line == "/quit" {
                    break;
                }
                match parse_draft(line).await {
                    Ok(draft) => {
                        if let Err(e) = handle.send(draft) {
                            warn!("Message not sent: {e}");
                        }
                    }
                    Err(e) => warn!("{e:#}"),
                }
            }
            event = events.recv() => match event {
                Some(ConversationEvent::ThreadUpdated(update)) => {
                    let unchanged = unchanged_prefix(&printed, &update.messages);
                    for message in &update.messages[unchanged..] {
                        println!("{}", render(message));
                    }
                    printed = update.messages.iter().map(|m| (m.id.clone(), m.delivery)).collect();
                }
                Some(ConversationEvent::FetchFailed { error, .. }) => warn!("{error}"),
                Some(ConversationEvent::SendFailed { draft, error, .. }) => {
                    error!("{error}; unsent text: {:?}", draft.text);
                }
                Some(ConversationEvent::SessionExpired) => {
                    error!("Session expired, sign in again");
                    break;
                }
                Some(ConversationEvent::PhaseChanged(phase)) => info!("Sync phase: {phase:?}"),
                None => break,
            }
        }
    }

    handle.shutdown();
    Ok(())
}

async fn parse_draft(line: &str) -> anyhow::Result<Draft> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let draft = match command {
        "/receipt" if !rest.is_empty() => Draft::default().with_receipt(rest),
        "/product" if !rest.is_empty() => Draft::default().with_product(rest),
        "/attach" => {
            let (path, text) = rest.split_once(' ').unwrap_or((rest, ""));
            if path.is_empty() {
                bail!("Usage: /attach <path> [text]");
            }
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read attachment {path}"))?;
            let name = std::path::Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string());
            Draft::text(text.trim()).with_attachment(Attachment::new(name, bytes))
        }
        _ => Draft::text(line),
    };
    Ok(draft)
}

/// Number of leading messages identical to the last render, by id and delivery state.
fn unchanged_prefix(printed: &[(String, DeliveryState)], messages: &[Message]) -> usize {
    printed
        .iter()
        .zip(messages)
        .take_while(|((id, delivery), m)| *id == m.id && *delivery == m.delivery)
        .count()
}

fn render(message: &Message) -> String {
    let who = if message.is_own { "you" } else { message.sender_id.as_str() };
    let mut body = message.text.clone().unwrap_or_default();
    if let Some(attachment) = &message.attachment {
        body.push_str(&format!(" [file: {}]", attachment.name));
    }
    if let Some(order) = &message.order_ref {
        body.push_str(&format!(" [receipt: {order}]"));
    }
    if let Some(product) = &message.product_ref {
        body.push_str(&format!(" [product: {product}]"));
    }
    let marker = match message.delivery {
        DeliveryState::Confirmed => "",
        DeliveryState::Pending => " (sending…)",
        DeliveryState::Failed => " (failed)",
    };
    format!(
        "[{}] {who}: {}{marker}",
        message.timestamp.format("%H:%M"),
        body.trim()
    )
}
