//! Truco terminal client.
//!
//! # Usage
//!
//! ```bash
//! # Follow match M1 as Ana, reading commands from stdin
//! truco watch --match-id M1 --player Ana
//!
//! # Create a match with random teams
//! truco create --random Ana Beto Caro Dani
//!
//! # Point at another server
//! TRUCO_SERVER=http://truco.example/api TRUCO_WS=wss://truco.example truco watch ...
//! ```

use std::io::Write;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use truco_app::{MatchView, Runtime, SessionHandle, SyncConfig, SystemEnv};
use truco_client::transport::{HttpAuthority, WsTransport};
use truco_core::{BidKind, CreateMatchRequest, RoundState, TeamSetup};

/// Truco match client
#[derive(Parser, Debug)]
#[command(name = "truco")]
#[command(about = "Follow and play a live truco match")]
#[command(version)]
struct Args {
    /// Authority REST base URL, including the API prefix
    #[arg(long, env = "TRUCO_SERVER", default_value = "http://localhost:8080/api")]
    server: String,

    /// Authority WebSocket origin
    #[arg(long, env = "TRUCO_WS", default_value = "ws://localhost:8080")]
    ws: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow a match and act on it from stdin
    Watch {
        /// Match to follow
        #[arg(short, long, env = "TRUCO_MATCH")]
        match_id: String,

        /// Local player name
        #[arg(short, long, env = "TRUCO_PLAYER")]
        player: String,
    },
    /// Create a match
    Create {
        /// Let the server draw the teams
        #[arg(long)]
        random: bool,

        /// Identifier to request instead of a server-assigned one
        #[arg(long)]
        match_id: Option<String>,

        /// Players; without --random the first half plays the second half
        #[arg(required = true)]
        players: Vec<String>,
    },
}

/// A line typed by the user.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Play(usize),
    Bid(BidKind),
    Accept,
    Decline,
    Fold,
    Refresh,
    Show,
    Help,
    Quit,
}

const HELP: &str = "commands: play <n> | truco | envido | quiero | no-quiero | mazo | refresh | \
                    show | help | quit";

fn parse_input(line: &str) -> Result<Input, String> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(Input::Show);
    };
    let input = match word.to_lowercase().as_str() {
        "play" | "jugar" => {
            let index = words.next().ok_or("play needs a card index")?;
            let index = index.parse().map_err(|_| format!("not a card index: {index}"))?;
            Input::Play(index)
        },
        "truco" => Input::Bid(BidKind::Truco),
        "envido" => Input::Bid(BidKind::Envido),
        "quiero" => Input::Accept,
        "no-quiero" => Input::Decline,
        "mazo" => Input::Fold,
        "refresh" => Input::Refresh,
        "show" => Input::Show,
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(input)
}

fn round_label(state: RoundState) -> &'static str {
    match state {
        RoundState::AwaitingPlay => "esperando jugada",
        RoundState::BidPending => "canto pendiente",
        RoundState::ResponsePending => "respuesta pendiente",
        RoundState::Finished => "ronda terminada",
    }
}

/// One-line summary of `view`.
fn render(view: &MatchView) -> String {
    let Some(match_id) = &view.match_id else {
        return "(no match)".to_string();
    };
    let mut line = format!("[{match_id}] {:?}", view.connection);
    if view.polling {
        line.push_str(" (polling)");
    }

    let Some(snapshot) = &view.snapshot else {
        line.push_str(" | loading...");
        return line;
    };
    let scores: Vec<String> =
        snapshot.teams.iter().map(|team| format!("{} {}", team.name, team.score)).collect();
    line.push_str(&format!(
        " | ronda {} vuelta {} | {} | turno: {} | {}",
        snapshot.round,
        snapshot.trick,
        round_label(snapshot.round_state),
        snapshot.turn.as_deref().unwrap_or("-"),
        scores.join(" - "),
    ));

    if let Some(hand) = &view.hand {
        let cards: Vec<String> = hand
            .cards
            .iter()
            .enumerate()
            .map(|(i, card)| format!("{i}:{} {:?}", card.value, card.suit))
            .collect();
        line.push_str(&format!(" | mano [{}]", cards.join(", ")));
    }
    line
}

async fn act(handle: &SessionHandle, input: Input) -> Option<String> {
    let outcome = match input {
        Input::Play(index) => handle.play_card(index).await,
        Input::Bid(bid) => handle.call_bid(bid).await,
        Input::Accept => handle.accept().await,
        Input::Decline => handle.decline().await,
        Input::Fold => handle.fold().await,
        Input::Refresh => handle.refresh().await.map(|()| "refreshed".to_string()),
        Input::Show => return Some(render(&handle.view())),
        Input::Help => return Some(HELP.to_string()),
        Input::Quit => return None,
    };
    Some(match outcome {
        Ok(ack) => ack,
        Err(e) => format!("error: {e}"),
    })
}

async fn watch(
    args: &Args,
    match_id: String,
    player: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let authority = HttpAuthority::new(&args.server);
    let transport = WsTransport::new(&args.ws);
    let handle = Runtime::spawn(authority, transport, SystemEnv, SyncConfig::default());

    tracing::info!(%match_id, %player, "following match");
    if let Err(e) = handle.subscribe(match_id, player).await {
        tracing::warn!(error = %e, "push unavailable, polling instead");
    }

    let mut out = std::io::stdout().lock();
    writeln!(out, "{HELP}")?;
    writeln!(out, "{}", render(&handle.view()))?;
    drop(out);

    let mut views = handle.watch();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = render(&views.borrow_and_update());
                writeln!(std::io::stdout().lock(), "{line}")?;
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let reply = match parse_input(&line) {
                    Ok(input) => match act(&handle, input).await {
                        Some(reply) => reply,
                        None => break,
                    },
                    Err(e) => format!("{e}\n{HELP}"),
                };
                writeln!(std::io::stdout().lock(), "{reply}")?;
            },
        }
    }

    handle.shutdown().await;
    Ok(())
}

async fn create(
    args: &Args,
    random: bool,
    match_id: Option<String>,
    players: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = if random {
        CreateMatchRequest::random(players)
    } else {
        let half = players.len().div_ceil(2);
        let (first, second) = players.split_at(half);
        CreateMatchRequest::with_teams(vec![
            TeamSetup { name: "Equipo 1".to_string(), players: first.to_vec() },
            TeamSetup { name: "Equipo 2".to_string(), players: second.to_vec() },
        ])
    };
    if let Some(id) = match_id {
        request = request.with_match_id(id.into());
    }

    let authority = HttpAuthority::new(&args.server);
    let transport = WsTransport::new(&args.ws);
    let handle = Runtime::spawn(authority, transport, SystemEnv, SyncConfig::default());
    let id = handle.create_match(request).await?;
    handle.shutdown().await;

    writeln!(std::io::stdout().lock(), "{id}")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match &args.command {
        Command::Watch { match_id, player } => {
            watch(&args, match_id.clone(), player.clone()).await
        },
        Command::Create { random, match_id, players } => {
            create(&args, *random, match_id.clone(), players.clone()).await
        },
    }
}
