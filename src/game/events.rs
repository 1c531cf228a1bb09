//! Engine Events
//!
//! Inputs the combat engine consumes from its queue, and the view-model
//! updates it publishes to the presentation layer after each one.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::game::catalog::{Buff, Shape, Target};
use crate::game::timers::TimerKey;
use crate::network::link::LinkState;

/// Session life cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Fresh states allocated, nobody announced yet.
    Setup,
    /// At least one side announced ready.
    WaitingReady,
    /// Both ready, counting down.
    Countdown,
    /// Fight in progress.
    Active,
    /// Fight over, waiting for the player to acknowledge.
    Ended,
}

impl SessionState {
    /// Whether gameplay messages are dropped in this state.
    #[inline]
    pub fn is_blocked(self) -> bool {
        self != SessionState::Active
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Setup => "setup",
            SessionState::WaitingReady => "waiting_ready",
            SessionState::Countdown => "countdown",
            SessionState::Active => "active",
            SessionState::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// One entry of the engine's input queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// The local player asked to start.
    LocalReady,
    /// The gesture recognizer produced a shape.
    LocalCast {
        /// Recognized shape.
        shape: Shape,
        /// Explicit target, or the spell's default.
        target: Option<Target>,
    },
    /// Raw record from the transport.
    Remote(Vec<u8>),
    /// Transport connectivity changed.
    Link(LinkState),
    /// A timer came due.
    TimerFired(TimerKey),
    /// The player dismissed the result; start over.
    Acknowledge,
    /// The player is leaving.
    Leave,
}

/// How a fight ended for the local player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FightOutcome {
    /// The enemy died or gave up.
    Won,
    /// The local player died.
    Lost,
    /// The transport dropped.
    ConnectionLost,
}

/// Final result of a fight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightResult {
    /// Session that ended.
    pub session_id: Uuid,
    /// Outcome for the local player.
    pub outcome: FightOutcome,
    /// Winning side in the local frame (None if the connection dropped).
    pub winner: Option<Target>,
    /// Local health at the end.
    pub self_health: u16,
    /// Enemy health at the end, as last known.
    pub enemy_health: u16,
    /// Wall-clock end time.
    pub ended_at: DateTime<Utc>,
}

/// A buff disappeared from one side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuffRemoval {
    /// Whose buff (local frame).
    pub side: Target,
    /// Which buff.
    pub buff: Buff,
    /// Cancelled by an enemy action rather than expiring.
    pub by_enemy: bool,
}

/// View-model update emitted after every processed event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewUpdate {
    /// Current session state.
    pub session_state: SessionState,
    /// Local health.
    pub self_health: u16,
    /// Local mana.
    pub self_mana: u16,
    /// Enemy health.
    pub enemy_health: u16,
    /// Enemy mana.
    pub enemy_mana: u16,
    /// Active local buffs.
    pub self_buffs: Vec<Buff>,
    /// Active enemy buffs.
    pub enemy_buffs: Vec<Buff>,
    /// Buff gained during this event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_buff: Option<(Target, Buff)>,
    /// Buff lost during this event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_buff: Option<BuffRemoval>,
    /// Shape to animate and who cast it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cast_shape: Option<(Target, Shape)>,
    /// A local cast was refused for lack of mana.
    pub cast_rejected: bool,
    /// Set once, on the event that ended the fight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<FightResult>,
}
