//! # Wizard Fight
//!
//! Two-player real-time spell duel over a peer-to-peer link.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WIZARD FIGHT                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Fight rules (no I/O, explicit time)       │
//! │  ├── catalog.rs  - Shapes, spells, buffs                     │
//! │  ├── state.rs    - Player state and resolution               │
//! │  ├── timers.rs   - Keyed one-shot timers                     │
//! │  ├── events.rs   - Engine inputs and view updates            │
//! │  └── engine.rs   - Combat state machine                      │
//! │                                                              │
//! │  network/        - Peer link (async)                         │
//! │  ├── protocol.rs - 7-byte fight records                      │
//! │  ├── link.rs     - Ready/connectivity hooks                  │
//! │  ├── transport.rs- Outbound record sinks                     │
//! │  ├── session.rs  - Tokio driver and handles                  │
//! │  └── ws.rs       - WebSocket host/join                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency Model
//!
//! Each peer is authoritative for its own health, mana and buffs. The other
//! side keeps a mirror that is overwritten by the snapshot stamped on every
//! message, so the two views converge after each delivered record.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::catalog::{Buff, Shape, Target};
pub use game::engine::{CombatEngine, FightConfig};
pub use game::events::{EngineEvent, FightOutcome, FightResult, SessionState, ViewUpdate};
pub use game::state::PlayerState;
pub use network::protocol::FightMessage;
pub use network::session::{FightSession, SessionHandle};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable naming a JSON fight config file.
pub const CONFIG_ENV: &str = "WIZARD_FIGHT_CONFIG";
