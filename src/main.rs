//! Wizard Fight
//!
//! Runs a scripted loopback duel by default, or hosts/joins a fight over
//! WebSocket with commands read from stdin.
//!
//! ```text
//! wizard-fight [demo]
//! wizard-fight host [addr]
//! wizard-fight join <ws://host:port>
//! ```

use std::time::Duration;
use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use wizard_fight::{
    FightConfig, FightResult, FightSession, SessionHandle, Shape, Target, ViewUpdate,
    CONFIG_ENV, VERSION,
    network::{link::{AutoReadyLink, LinkState, ManualReadyLink}, transport::{LoopbackTransport, Transport}, ws},
};

/// Default host bind address.
const DEFAULT_BIND: &str = "0.0.0.0:9000";

/// Give up on the demo after this long.
const DEMO_LIMIT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Wizard Fight v{}", VERSION);
    let config = load_config()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("demo") => demo_fight(config).await,
        Some("host") => host(config, args.get(1).map_or(DEFAULT_BIND, String::as_str)).await,
        Some("join") => {
            let url = args.get(1).context("join needs a ws:// url")?;
            join(config, url).await
        }
        Some(other) => bail!("unknown mode {other:?}; expected demo, host [addr] or join <url>"),
    }
}

fn load_config() -> Result<FightConfig> {
    let Ok(path) = std::env::var(CONFIG_ENV) else {
        return Ok(FightConfig::default());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config = FightConfig::from_json(&text).with_context(|| format!("loading {path}"))?;
    info!(?config, "config loaded");
    Ok(config)
}

// =============================================================================
// DEMO
// =============================================================================

/// Two local sessions over a loopback link. Alice attacks, Bob shields once.
async fn demo_fight(config: FightConfig) -> Result<()> {
    info!("=== Starting Demo Fight ===");

    let (alice, alice_handle) = FightSession::new(config.clone(), Box::new(AutoReadyLink));
    let (bob, bob_handle) = FightSession::new(config.clone(), Box::new(AutoReadyLink));
    let mut alice_views = alice_handle.subscribe();
    let mut bob_views = bob_handle.subscribe();

    let alice_task = tokio::spawn(alice.run(LoopbackTransport::new(bob_handle.clone())));
    let bob_task = tokio::spawn(bob.run(LoopbackTransport::new(alice_handle.clone())));
    alice_handle.link_state(LinkState::Connected)?;
    bob_handle.link_state(LinkState::Connected)?;

    let bob_watch = tokio::spawn(async move { watch("bob", &mut bob_views).await });

    // Casts before the countdown ends are dropped, so wait it out.
    tokio::time::sleep(Duration::from_millis(config.countdown_ms + 100)).await;
    bob_handle.cast(Shape::Shield, None)?;

    let rotation = [Shape::V, Shape::Clock, Shape::Z, Shape::Triangle, Shape::Z];
    let mut ticker = tokio::time::interval(Duration::from_millis(700));
    let mut next = 0;

    let duel = async {
        loop {
            tokio::select! {
                result = watch("alice", &mut alice_views) => return result,
                _ = ticker.tick() => {
                    alice_handle.cast(rotation[next % rotation.len()], None).ok();
                    next += 1;
                }
            }
        }
    };
    let result = tokio::time::timeout(DEMO_LIMIT, duel).await;

    alice_handle.leave()?;
    bob_handle.leave()?;
    alice_task.await?;
    bob_task.await?;
    bob_watch.abort();

    match result {
        Ok(Some(result)) => {
            info!("=== Fight Results ===");
            info!("Session: {}", result.session_id);
            info!("Alice: {:?} with {} health", result.outcome, result.self_health);
            info!("Bob: {} health", result.enemy_health);
            info!("Ended at {}", result.ended_at.to_rfc3339());
        }
        Ok(None) => warn!("view channel closed before the fight ended"),
        Err(_) => warn!("no winner after {:?}", DEMO_LIMIT),
    }
    Ok(())
}

/// Log view updates for one player until a fight result shows up.
async fn watch(player: &'static str, views: &mut broadcast::Receiver<ViewUpdate>) -> Option<FightResult> {
    loop {
        match views.recv().await {
            Ok(view) => {
                if let Some((who, shape)) = view.cast_shape {
                    let caster = if who == Target::Me { player } else { "enemy" };
                    info!(player, caster, %shape, hp = view.self_health, mana = view.self_mana, enemy_hp = view.enemy_health, "cast");
                }
                if view.cast_rejected {
                    info!(player, mana = view.self_mana, "not enough mana");
                }
                if let Some((side, buff)) = view.added_buff {
                    info!(player, ?side, ?buff, "buff on");
                }
                if let Some(removal) = view.removed_buff {
                    if removal.by_enemy {
                        info!(player, buff = ?removal.buff, "shield broken");
                    } else {
                        debug!(player, side = ?removal.side, buff = ?removal.buff, "buff off");
                    }
                }
                if let Some(result) = view.result {
                    info!(player, outcome = ?result.outcome, "fight over");
                    return Some(result);
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(player, skipped, "view updates lagged"),
            Err(RecvError::Closed) => return None,
        }
    }
}

// =============================================================================
// NETWORK PLAY
// =============================================================================

async fn host(config: FightConfig, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    info!("waiting for a peer on ws://{}", listener.local_addr()?);

    let (session, handle) = FightSession::new(config, Box::new(ManualReadyLink));
    let transport = ws::accept(&listener, handle.clone()).await?;
    play(session, handle, transport).await
}

async fn join(config: FightConfig, url: &str) -> Result<()> {
    let (session, handle) = FightSession::new(config, Box::new(ManualReadyLink));
    let transport = ws::connect(url, handle.clone()).await?;
    play(session, handle, transport).await
}

/// A line typed by the player.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Ready,
    Cast(Shape, Option<Target>),
    Acknowledge,
    Quit,
}

fn parse_command(line: &str) -> Result<Command> {
    let mut words = line.split_whitespace();
    let first = words.next().ok_or_else(|| anyhow!("empty command"))?;
    let command = match first {
        "ready" => Command::Ready,
        "ok" => Command::Acknowledge,
        "quit" => Command::Quit,
        name => {
            let shape = Shape::ALL
                .into_iter()
                .find(|s| !s.is_sentinel() && s.to_string() == name)
                .ok_or_else(|| anyhow!("unknown shape {name:?}"))?;
            let target = match words.next() {
                None => None,
                Some("me") => Some(Target::Me),
                Some("enemy") => Some(Target::Enemy),
                Some(other) => bail!("unknown target {other:?}"),
            };
            Command::Cast(shape, target)
        }
    };
    Ok(command)
}

async fn play<T>(session: FightSession, handle: SessionHandle, transport: T) -> Result<()>
where
    T: Transport + 'static,
{
    let mut views = handle.subscribe();
    let watcher = tokio::spawn(async move { while watch("me", &mut views).await.is_some() {} });
    let session_task = tokio::spawn(session.run(transport));

    info!("commands: ready | <shape> [me|enemy] | ok | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let sent = match parse_command(&line) {
            Ok(Command::Ready) => handle.ready(),
            Ok(Command::Cast(shape, target)) => handle.cast(shape, target),
            Ok(Command::Acknowledge) => handle.acknowledge(),
            Ok(Command::Quit) => break,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };
        if sent.is_err() {
            break;
        }
    }

    // Already gone if the session stopped on its own.
    handle.leave().ok();
    if let Some(result) = session_task.await? {
        info!(outcome = ?result.outcome, hp = result.self_health, enemy_hp = result.enemy_health, "last fight");
    }
    watcher.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("ready").unwrap(), Command::Ready);
        assert_eq!(parse_command("z").unwrap(), Command::Cast(Shape::Z, None));
        assert_eq!(parse_command("  circle enemy ").unwrap(), Command::Cast(Shape::Circle, Some(Target::Enemy)));
        assert!(parse_command("fail").is_err());
        assert!(parse_command("triangle them").is_err());
        assert!(parse_command("").is_err());
    }
}
