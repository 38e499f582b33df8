//! `Paircast`: pairwise chat over a broadcast relay.
//!
//! A line-oriented console front end. Plain lines are sent to the focused
//! peer; lines starting with `/` are commands (`/help` lists them).
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/paircast/config.toml`).
//!
//! ```bash
//! # Connect to a local relay as Alice
//! cargo run --bin paircast
//!
//! # Another identity, another relay
//! cargo run --bin paircast -- --identity Bob --relay-url ws://10.0.0.5:4000/ws
//!
//! # No relay at all
//! cargo run --bin paircast -- --offline
//! ```

use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use paircast::chat::ChatSession;
use paircast::chat::history::FileStore;
use paircast::chat::view::HistoryEntry;
use paircast::config::{CliArgs, ClientConfig};
use paircast::net::{self, NetCommand, NetEvent, NetHandle, SharedSession};
use paircast::transport::loopback::LoopbackHub;
use paircast_proto::message::ChatMessage;

const HELP: &str = "\
commands:
  /as NAME        switch active identity
  /chat NAME      open the conversation with NAME
  /close          leave the current conversation
  /delete N       delete message N of the current conversation
  /clear          delete every message of the current conversation
  /add NAME       add NAME to your contacts
  /remove NAME    remove NAME from your contacts
  /dismiss NAME   clear the unread count for NAME
  /peers          list peers, unread counts and peers you can add
  /history        reprint the current conversation
  /quit           exit
anything else is sent to the open conversation";

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&config.log_level, &config.log_file);
    tracing::info!(identity = %config.identity, "paircast starting");

    let store = match FileStore::open(&config.data_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error opening data directory: {e}");
            std::process::exit(1);
        }
    };
    let session: SharedSession<FileStore> = Arc::new(Mutex::new(ChatSession::open(
        store,
        config.identity.clone(),
        config.session_options(),
    )));

    let handle = start_net(&config, &session).await;
    run_console(&session, handle).await;

    let pending = {
        let mut s = session.lock();
        s.flush();
        s.pending_writes()
    };
    if pending > 0 {
        eprintln!("warning: {pending} state file(s) could not be saved");
    }
    tracing::info!("paircast exiting");
}

/// Initialize file-based logging.
///
/// Logs are written to a file (never stdout, which belongs to the console).
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, log_path: &Path) -> Option<WorkerGuard> {
    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Connect to the relay, falling back to an in-process loopback.
async fn start_net(config: &ClientConfig, session: &SharedSession<FileStore>) -> NetHandle {
    if let Some(net_config) = config.to_net_config() {
        match net::connect_relay(&net_config).await {
            Ok(transport) => {
                return net::spawn_net(transport, Arc::clone(session), net_config.channel_capacity);
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %net_config.relay_url, "relay unavailable");
                println!("relay {} unavailable ({e}); running offline", net_config.relay_url);
            }
        }
    }
    let hub = LoopbackHub::new();
    net::spawn_net(hub.connect(), Arc::clone(session), config.channel_capacity)
}

/// Outcome of one console line.
enum Flow {
    Continue,
    Quit,
}

async fn run_console(session: &SharedSession<FileStore>, mut handle: NetHandle) {
    print_status(session);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if matches!(handle_line(&line, session, &handle.commands).await, Flow::Quit) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            },
            event = handle.events.recv() => match event {
                Some(event) => on_net_event(session, event),
                None => break,
            },
        }
    }

    let _ = handle.commands.send(NetCommand::Shutdown).await;
    let _ = handle.task.await;
}

async fn handle_line(
    line: &str,
    session: &SharedSession<FileStore>,
    commands: &mpsc::Sender<NetCommand>,
) -> Flow {
    let Some(rest) = line.strip_prefix('/') else {
        let composed = session.lock().compose(line);
        match composed {
            Ok(msg) => {
                if commands.send(NetCommand::Submit(msg)).await.is_err() {
                    println!("! not connected");
                }
            }
            Err(e) => println!("! {e}"),
        }
        return Flow::Continue;
    };

    let (cmd, arg) = rest
        .split_once(' ')
        .map_or((rest, ""), |(c, a)| (c, a.trim()));
    let mut s = session.lock();
    match (cmd, arg) {
        ("quit" | "q", _) => return Flow::Quit,
        ("help", _) => println!("{HELP}"),
        ("as", name) if !name.is_empty() => {
            if s.select_identity(name) {
                drop(s);
                print_status(session);
            }
        }
        ("chat", name) if !name.is_empty() => {
            s.focus(Some(name));
            print_history(&s, name);
        }
        ("close", _) => s.focus(None),
        ("delete", n) => match (s.focused().map(str::to_owned), n.parse::<usize>()) {
            (Some(peer), Ok(n)) if n > 0 => match s.delete_message(&peer, n - 1) {
                Some(msg) => println!("deleted: {}", msg.text),
                None => println!("! no message {n}"),
            },
            (None, _) => println!("! no conversation open"),
            _ => println!("! usage: /delete N"),
        },
        ("clear", _) => match s.focused().map(str::to_owned) {
            Some(peer) => {
                s.delete_conversation(&peer);
                println!("conversation with {peer} cleared");
            }
            None => println!("! no conversation open"),
        },
        ("add", name) if !name.is_empty() => {
            if !s.add_peer(name) {
                println!("! {name} not added");
            }
        }
        ("remove", name) if !name.is_empty() => {
            if !s.remove_peer(name) {
                println!("! {name} is not a contact");
            }
        }
        ("dismiss", name) if !name.is_empty() => {
            s.dismiss(name);
        }
        ("peers", _) => print_peers(&s),
        ("history", _) => match s.focused().map(str::to_owned) {
            Some(peer) => print_history(&s, &peer),
            None => println!("! no conversation open"),
        },
        _ => println!("! unknown command, try /help"),
    }
    Flow::Continue
}

fn on_net_event(session: &SharedSession<FileStore>, event: NetEvent) {
    match event {
        NetEvent::MessageIngested(msg) => {
            let s = session.lock();
            let me = s.identity();
            let peer = if msg.from == me { &msg.to } else { &msg.from };
            let involves_me = msg.from == me || msg.to == me;
            if involves_me && s.focused() == Some(peer.as_str()) {
                print_message(&msg, me);
            } else if msg.to == me {
                println!("* new message from {} ({} unread)", msg.from, s.unread().get(&msg.from));
            }
        }
        NetEvent::ConnectionStatus {
            connected,
            transport_type,
        } => {
            let state = if connected { "connected" } else { "disconnected" };
            println!("* {transport_type} {state}");
        }
        NetEvent::Error(e) => println!("! {e}"),
    }
}

fn print_status(session: &SharedSession<FileStore>) {
    let s = session.lock();
    println!("you are {}", s.identity());
    print_peers(&s);
}

fn print_peers(s: &ChatSession<FileStore>) {
    for peer in s.peers() {
        let marker = if peer.focused { '>' } else { ' ' };
        let contact = if peer.added { "+" } else { "" };
        if peer.unread > 0 {
            println!("{marker} {}{contact} ({})", peer.name, peer.unread);
        } else {
            println!("{marker} {}{contact}", peer.name);
        }
    }
    if s.options().curated_roster {
        let available = s.available_peers();
        if !available.is_empty() {
            println!("  /add to chat with: {}", available.join(", "));
        }
    }
}

fn print_history(s: &ChatSession<FileStore>, peer: &str) {
    let today = Local::now().date_naive();
    for entry in s.history(peer, &Local, today) {
        match entry {
            HistoryEntry::DayHeader(label) => println!("-- {label} --"),
            HistoryEntry::Message {
                index,
                message,
                outgoing,
                time,
            } => {
                let arrow = if outgoing { ">>" } else { "<<" };
                println!("{:>3} {time} {arrow} {}", index + 1, message.text);
            }
        }
    }
}

fn print_message(msg: &ChatMessage, me: &str) {
    let time = msg.timestamp.with_timezone(&Local).format("%H:%M");
    let arrow = if msg.from == me { ">>" } else { "<<" };
    println!("    {time} {arrow} {}", msg.text);
}
