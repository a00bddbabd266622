/// Terminal client for menteechat
use colored::Colorize;
use menteechat_core::channel::TcpChannel;
use menteechat_core::rest::{HttpRestClient, RestService};
use menteechat_core::{Config, ConversationSummary, Message, MessagingSession, MessengerEvent};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

enum Command<'a> {
    Help,
    Quit,
    List,
    Open(&'a str),
    Close,
    Seen(&'a str),
    SendTo(&'a str, &'a str),
    Send(&'a str),
    Unknown(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    if !line.starts_with('/') {
        return Command::Send(line);
    }
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match cmd {
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        "/list" => Command::List,
        "/open" if !rest.is_empty() => Command::Open(rest),
        "/close" => Command::Close,
        "/seen" if !rest.is_empty() => Command::Seen(rest),
        "/msg" => match rest.split_once(' ') {
            Some((to, body)) => Command::SendTo(to, body),
            None => Command::Unknown(line),
        },
        _ => Command::Unknown(line),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn"))
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (self_id, config) = match Config::from_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(());
        }
    };

    let channel = TcpChannel::connect(config.hub_addr.as_str(), config.request_timeout)
        .await
        .map_err(|e| anyhow::anyhow!("Could not reach hub at {}: {}", config.hub_addr, e))?;
    let rest: Arc<dyn RestService> = Arc::new(HttpRestClient::new(&config));
    let session = MessagingSession::new(config, rest, Arc::new(channel));

    let mut events = session.subscribe_events();
    let me = self_id.clone();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event, &me),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    session.start(&self_id).await?;
    print_conversations(&session.conversations().await);
    println!("Type /help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_command(line) {
            Command::Quit => break,
            Command::Help => print_help(),
            Command::List => print_conversations(&session.conversations().await),
            Command::Open(id) => match session.open(id).await {
                Ok(messages) => print_thread(id, &messages, &self_id),
                Err(e) => eprintln!("✗ {}", e),
            },
            Command::Close => {
                session.close().await;
                println!("✓ Closed");
            }
            Command::Seen(id) => {
                if !session.mark_seen(id).await {
                    eprintln!("✗ No conversation with {}", id);
                }
            }
            Command::SendTo(to, body) => {
                if let Err(e) = session.send_message(to, body).await {
                    eprintln!("✗ {}", e);
                }
            }
            Command::Send(body) => match session.active_counterpart().await {
                Some(to) => {
                    if let Err(e) = session.send_message(&to, body).await {
                        eprintln!("✗ {}", e);
                    }
                }
                None => eprintln!("✗ Open a conversation first (/open <id>)"),
            },
            Command::Unknown(text) => {
                eprintln!("Unknown command: {}", text);
                print_help();
            }
        }
    }

    session.end().await;
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  /list                 Show conversations");
    println!("  /open <id>            Open a conversation");
    println!("  /close                Close the open conversation");
    println!("  /seen <id>            Mark a conversation as seen");
    println!("  /msg <id> <text>      Send to anyone");
    println!("  <text>                Send to the open conversation");
    println!("  /quit                 Leave");
}

fn clock(millis: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_default()
}

fn print_conversations(summaries: &[ConversationSummary]) {
    if summaries.is_empty() {
        println!("No conversations");
        return;
    }
    println!("Conversations ({}):", summaries.len());
    println!("{:-<60}", "");
    for s in summaries {
        let marker = if s.unseen { "●".yellow() } else { " ".normal() };
        println!(
            "{} {} [{}] {}",
            marker,
            s.counterpart.name.bold(),
            s.counterpart_id,
            s.latest_message.body.dimmed()
        );
    }
}

fn print_thread(counterpart_id: &str, messages: &[Message], self_id: &str) {
    println!("{:-<60}", "");
    println!("Conversation with {}", counterpart_id.bold());
    for m in messages {
        print_message(m, self_id);
    }
    println!("{:-<60}", "");
}

fn print_message(message: &Message, self_id: &str) {
    let who = if message.sender_id == self_id {
        "you".green()
    } else {
        message.sender_id.as_str().cyan()
    };
    println!("  {} {}: {}", clock(message.created_at).dimmed(), who, message.body);
}

fn print_event(event: &MessengerEvent, self_id: &str) {
    match event {
        MessengerEvent::Connected { channel } => println!("✓ Listening as {}", channel),
        MessengerEvent::Disconnected { channel } => println!("✓ Stopped listening as {}", channel),
        MessengerEvent::ThreadAppended { message, .. } if message.sender_id != self_id => {
            print_message(message, self_id)
        }
        MessengerEvent::ConversationUpdated { summary } if summary.unseen => println!(
            "{} {}: {}",
            "● new".yellow(),
            summary.counterpart.name.bold(),
            summary.latest_message.body
        ),
        _ => {}
    }
}
