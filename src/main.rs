use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use quote_chat::chat::{ChatClient, ChatEvent, SubmitOutcome};
use quote_chat::config::{ChatConfig, user_context_from_env};
use quote_chat::conversation::{ConversationPhase, Rejection};
use quote_chat::messages::{Message, Sender};
use quote_chat::relay::{self, RelayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match std::env::args().nth(1).as_deref() {
        Some("relay") => run_relay().await,
        Some(other) => anyhow::bail!("unknown command {other:?} (expected `relay` or nothing)"),
        None => run_chat().await,
    }
}

async fn run_relay() -> anyhow::Result<()> {
    let config = RelayConfig::from_env()?;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("failed to bind relay port {}", config.port))?;

    eprintln!("📬 Quote Chat relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Fetch: GET  http://0.0.0.0:{}/chat-messages/<sessionId>?since=<iso>", config.port);
    eprintln!("   Post:  POST http://0.0.0.0:{}/chat-messages/<sessionId>", config.port);
    eprintln!("   Retention: {}s\n", config.retention.as_secs());

    relay::serve(listener, &config).await?;
    Ok(())
}

async fn run_chat() -> anyhow::Result<()> {
    let config = ChatConfig::from_env()?;
    let user = user_context_from_env();

    eprintln!("💬 Quote Chat v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Webhook: {}",
        if config.webhook_url.is_some() { "configured" } else { "not configured (messages will not be sent)" }
    );
    eprintln!("   Retrieval: {}", config.retrieval_url);
    match &user {
        Some(user) => eprintln!("   User: {} ({})", user.display_name(), user.job_title),
        None => eprintln!("   User: none (set QUOTE_CHAT_FIRST_NAME and QUOTE_CHAT_USER_CODE)"),
    }
    eprintln!("   Commands: /new, /metrics, /quit\n");

    let client = ChatClient::from_config(&config, user)?;

    // Subscribe before reading the snapshot so nothing falls between them.
    let events = client.subscribe();
    let snapshot = client.snapshot().await?;
    eprintln!("   Session: {}\n", snapshot.session.id());
    for message in &snapshot.messages {
        print_message(message);
    }
    let printer = tokio::spawn(print_events(events));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprint!("> ");
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line.trim().to_string(),
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                break;
            }
        };

        match line.as_str() {
            "" => {}
            "/quit" => break,
            "/new" => {
                let session_id = client.reset().await?;
                eprintln!("   New session: {session_id}");
            }
            "/metrics" => {
                let snapshot = client.snapshot().await?;
                eprintln!(
                    "   Webhook latency: {}",
                    format_duration(snapshot.webhook_latency)
                );
                eprintln!(
                    "   Total response time: {}",
                    format_duration(snapshot.total_response_time)
                );
                if let Some(waiting) = snapshot.waiting_for {
                    eprintln!(
                        "   Waiting for reply: {} (/new starts over)",
                        format_duration(Some(waiting))
                    );
                }
            }
            text => match client.submit(text).await? {
                SubmitOutcome::Submitted { .. } => {}
                SubmitOutcome::Rejected(Rejection::Busy) => {
                    eprintln!("   Still waiting for a reply...");
                }
                SubmitOutcome::Rejected(Rejection::NotConfigured) => {
                    eprintln!("   Webhook URL is not configured; message not sent.");
                }
                SubmitOutcome::Rejected(Rejection::Blank) => {}
            },
        }
        eprint!("> ");
    }

    printer.abort();
    client.shutdown().await;
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<ChatEvent>) {
    loop {
        match events.recv().await {
            Ok(ChatEvent::MessageAppended { message }) => {
                // The user's own line is already on screen.
                if message.sender == Sender::Ai {
                    println!();
                    print_message(&message);
                    eprint!("> ");
                }
            }
            Ok(ChatEvent::PhaseChanged { phase }) => {
                if phase == ConversationPhase::AwaitingReply {
                    eprintln!("   ...thinking");
                }
            }
            Ok(ChatEvent::SessionStarted { messages, .. }) => {
                for message in &messages {
                    print_message(message);
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_message(message: &Message) {
    println!("[{}] {}", message.sender, message.text);
}

fn format_duration(duration: Option<std::time::Duration>) -> String {
    duration
        .map(|d| format!("{:.2}s", d.as_secs_f64()))
        .unwrap_or_else(|| "n/a".to_string())
}
