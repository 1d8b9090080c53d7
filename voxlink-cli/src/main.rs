//! Console voice-chat client.
//!
//! Loads the native module, connects, prints events, and reads commands
//! from stdin:
//!
//!   /join <channel-id> [password]
//!   /msg <client-id> <text>
//!   /mute, /unmute
//!   /quit
//!
//! Bare lines go to the current channel (the last one joined).

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use voxlink_native::Library;
use voxlink_sdk::{ConnectConfig, Connection, Event, NativeModule, Target, connect};

use config::Config;

#[derive(Parser)]
#[command(name = "voxlink", about = "VoxLink console voice-chat client")]
struct Args {
    /// Server host name or address.
    #[arg(long)]
    host: Option<String>,
    /// Server port.
    #[arg(long)]
    port: Option<u16>,
    /// Nickname.
    #[arg(long)]
    nick: Option<String>,
    /// Channel id to join once connected.
    #[arg(long)]
    channel: Option<u64>,
    /// Explicit native module file name (skips candidate probing).
    #[arg(long, env = "VOXLINK_LIBRARY")]
    library: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    let mut cfg = Config::load();

    let host = args
        .host
        .or(cfg.host.clone())
        .unwrap_or_else(|| config::DEFAULT_HOST.to_string());
    let port = args.port.or(cfg.port).unwrap_or(config::DEFAULT_PORT);
    let nickname = args
        .nick
        .or(cfg.nick.clone())
        .unwrap_or_else(|| config::DEFAULT_NICK.to_string());
    let auto_channel = args.channel.or(cfg.channel);
    let library_override = args.library.or(cfg.library.clone());

    let module = load_module(library_override.as_deref())
        .context("could not load the native voice module")?;
    println!(
        "Loaded {} (version {})",
        module.module_name(),
        module.version()
    );

    let (conn, mut events) = connect(
        module,
        &ConnectConfig {
            host: host.clone(),
            port,
            nickname: nickname.clone(),
        },
    )?;
    println!("Connecting to {host}:{port} as {nickname}...");

    // Remember what worked for next time.
    cfg.host = Some(host);
    cfg.port = Some(port);
    cfg.nick = Some(nickname);
    cfg.save();

    let mut current_channel: Option<u64> = auto_channel;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    None => break,
                    Some(Event::Disconnected { reason }) => {
                        println!("Disconnected: {reason}");
                        break;
                    }
                    Some(event) => print_event(&conn, event, auto_channel)?,
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if !handle_command(&conn, line, &mut current_channel)? {
                    break;
                }
            }
        }
    }

    if let Err(err) = conn.disconnect(Some("client exiting")) {
        tracing::debug!(error = %err, "disconnect at exit");
    }
    Ok(())
}

/// Open the native module: either the explicit name from flag/config, or
/// the platform detector's candidate list.
fn load_module(library_override: Option<&str>) -> Result<std::sync::Arc<NativeModule>> {
    let detected = voxlink_native::detect()?;
    let candidates = match library_override {
        Some(name) => vec![name.to_string()],
        None => detected.candidates,
    };
    tracing::debug!(platform = %detected.platform, ?candidates, "probing native module");
    let library = Library::open(detected.platform, &candidates)?;
    Ok(NativeModule::load(library)?)
}

fn print_event(conn: &Connection, event: Event, auto_channel: Option<u64>) -> Result<()> {
    match event {
        Event::Connecting => println!("* connecting..."),
        Event::Connected => {
            println!("* connected");
            if let Some(id) = auto_channel {
                conn.join_channel(id, None)?;
                println!("* joining channel {id}");
            }
        }
        Event::ChannelAdded { channel } => {
            println!("* channel {} ({})", channel.name, channel.id);
        }
        Event::ChannelRemoved { channel_id } => println!("* channel {channel_id} removed"),
        Event::ClientJoined { client, channel_id } => {
            println!("→ {} joined channel {channel_id}", client.nickname);
        }
        Event::ClientLeft {
            client_id,
            channel_id,
        } => println!("← client {client_id} left channel {channel_id}"),
        Event::ClientMoved {
            client_id,
            channel_id,
        } => println!("↔ client {client_id} moved to channel {channel_id}"),
        Event::TalkStatusChanged { client_id, talking } => {
            if talking {
                println!("🎙 client {client_id} started talking");
            } else {
                println!("🔇 client {client_id} stopped talking");
            }
        }
        Event::TextMessage {
            from_nickname,
            text,
            ..
        } => println!("<{from_nickname}> {text}"),
        Event::Disconnected { .. } => unreachable!("handled by the caller"),
    }
    Ok(())
}

/// A parsed input line.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Join {
        channel: u64,
        password: Option<String>,
    },
    Msg {
        client: u64,
        text: String,
    },
    Mute(bool),
    Quit,
    /// Bare text for the current channel.
    Say(String),
    Usage(&'static str),
    Unknown,
}

const JOIN_USAGE: &str = "Usage: /join <channel-id> [password]";
const MSG_USAGE: &str = "Usage: /msg <client-id> <text>";

fn parse_command(line: &str) -> Command {
    if line == "/join" || line.starts_with("/join ") {
        let mut parts = line["/join".len()..].split_whitespace();
        return match parts.next().map(|s| s.parse::<u64>()) {
            Some(Ok(channel)) => Command::Join {
                channel,
                password: parts.next().map(str::to_string),
            },
            _ => Command::Usage(JOIN_USAGE),
        };
    }
    if line == "/msg" || line.starts_with("/msg ") {
        let rest = line["/msg".len()..].trim_start();
        return match rest.split_once(' ') {
            Some((id, text)) => match id.parse::<u64>() {
                Ok(client) => Command::Msg {
                    client,
                    text: text.to_string(),
                },
                Err(_) => Command::Usage(MSG_USAGE),
            },
            None => Command::Usage(MSG_USAGE),
        };
    }
    match line {
        "/mute" => Command::Mute(true),
        "/unmute" => Command::Mute(false),
        "/quit" => Command::Quit,
        _ if line.starts_with('/') => Command::Unknown,
        _ => Command::Say(line.to_string()),
    }
}

/// Returns false when the client should exit.
fn handle_command(
    conn: &Connection,
    line: &str,
    current_channel: &mut Option<u64>,
) -> Result<bool> {
    match parse_command(line) {
        Command::Join { channel, password } => {
            conn.join_channel(channel, password.as_deref())?;
            *current_channel = Some(channel);
        }
        Command::Msg { client, text } => conn.send_text(Target::Client(client), &text)?,
        Command::Mute(muted) => {
            conn.set_input_muted(muted)?;
            println!("* input {}", if muted { "muted" } else { "unmuted" });
        }
        Command::Quit => return Ok(false),
        Command::Say(text) => match *current_channel {
            Some(id) => conn.send_text(Target::Channel(id), &text)?,
            None => println!("Join a channel first (/join <channel-id>)"),
        },
        Command::Usage(usage) => println!("{usage}"),
        Command::Unknown => println!("Unknown command: {line}"),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_shows_usage_with_or_without_arguments() {
        assert_eq!(parse_command("/join"), Command::Usage(JOIN_USAGE));
        assert_eq!(parse_command("/join "), Command::Usage(JOIN_USAGE));
        assert_eq!(parse_command("/join lobby"), Command::Usage(JOIN_USAGE));
    }

    #[test]
    fn join_parses_channel_and_optional_password() {
        assert_eq!(
            parse_command("/join 5"),
            Command::Join {
                channel: 5,
                password: None
            }
        );
        assert_eq!(
            parse_command("/join 5 hunter2"),
            Command::Join {
                channel: 5,
                password: Some("hunter2".to_string())
            }
        );
    }

    #[test]
    fn msg_parses_client_and_text() {
        assert_eq!(
            parse_command("/msg 9 hello there"),
            Command::Msg {
                client: 9,
                text: "hello there".to_string()
            }
        );
        assert_eq!(parse_command("/msg"), Command::Usage(MSG_USAGE));
        assert_eq!(parse_command("/msg 9"), Command::Usage(MSG_USAGE));
    }

    #[test]
    fn bare_text_and_unknown_slash_commands() {
        assert_eq!(parse_command("hello"), Command::Say("hello".to_string()));
        assert_eq!(parse_command("/joinx"), Command::Unknown);
        assert_eq!(parse_command("/frobnicate"), Command::Unknown);
        assert_eq!(parse_command("/mute"), Command::Mute(true));
        assert_eq!(parse_command("/quit"), Command::Quit);
    }
}
