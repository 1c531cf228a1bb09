//! Combat Engine
//!
//! The single consumer of the fight event queue. Owns both player states,
//! drives the ready handshake and countdown, resolves casts and remote
//! messages, runs mana regeneration and buff timers, and detects the end of
//! the fight.
//!
//! The engine never reads a clock: every call takes `now` in milliseconds.
//! Outbound messages are returned in a [`Step`] and stamped with the local
//! health/mana at the moment they were produced.

use std::collections::VecDeque;
use chrono::Utc;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::catalog::{Buff, Shape, Target};
use crate::game::events::{
    BuffRemoval, EngineEvent, FightOutcome, FightResult, SessionState, ViewUpdate,
};
use crate::game::state::{PlayerLimits, PlayerRole, PlayerState};
use crate::game::timers::{Millis, TimerKey, TimerQueue};
use crate::network::link::{LinkCommand, LinkState, PeerLink, ReadyReply};
use crate::network::protocol::{FightAction, FightMessage, MalformedMessage};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Fight tuning shared by both peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FightConfig {
    /// Starting and maximum health.
    pub max_health: u16,
    /// Starting and maximum mana.
    pub max_mana: u16,
    /// Mana added per regeneration tick.
    pub mana_regen: u16,
    /// Time between regeneration ticks.
    pub mana_regen_interval_ms: Millis,
    /// Pre-fight countdown.
    pub countdown_ms: Millis,
}

impl Default for FightConfig {
    fn default() -> Self {
        Self {
            max_health: 200,
            max_mana: 100,
            mana_regen: 5,
            mana_regen_interval_ms: 2000,
            countdown_ms: 3000,
        }
    }
}

impl FightConfig {
    /// Load from JSON; missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let config: FightConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("max_health", self.max_health), ("max_mana", self.max_mana)] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
            // Snapshots travel as i16
            if value > i16::MAX as u16 {
                return Err(ConfigError::TooLarge { field, value });
            }
        }
        if self.mana_regen_interval_ms == 0 {
            return Err(ConfigError::Zero { field: "mana_regen_interval_ms" });
        }
        Ok(())
    }

    /// Per-player caps.
    pub fn limits(&self) -> PlayerLimits {
        PlayerLimits {
            max_health: self.max_health,
            max_mana: self.max_mana,
            mana_regen: self.mana_regen,
        }
    }
}

/// Invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Not valid JSON for `FightConfig`.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value that must be positive is zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Offending field.
        field: &'static str,
    },

    /// A value does not fit the wire snapshot.
    #[error("{field} = {value} exceeds {}", i16::MAX)]
    TooLarge {
        /// Offending field.
        field: &'static str,
        /// Configured value.
        value: u16,
    },
}

// =============================================================================
// ERRORS
// =============================================================================

/// Reasons an event is not applied. None of them stop the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Bytes from the peer did not decode.
    #[error("malformed message: {0}")]
    Malformed(#[from] MalformedMessage),

    /// A life-cycle action that makes no sense in the current state.
    #[error("{action:?} is not valid while {state}")]
    InvalidStateTransition {
        /// Received action.
        action: FightAction,
        /// State at the time.
        state: SessionState,
    },

    /// The transport reported the peer gone.
    #[error("peer disconnected")]
    PeerDisconnected,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Result of handling one event.
#[derive(Debug, Clone)]
pub struct Step {
    /// Messages to hand to the transport, in order.
    pub outbound: Vec<FightMessage>,
    /// View-model after the event.
    pub view: ViewUpdate,
    /// The player left; the driver should stop.
    pub left: bool,
}

/// Where a message resolved on the local player came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    Local,
    Remote,
}

/// One fight, from setup to result. Replaced wholesale on restart.
#[derive(Debug)]
struct Session {
    id: Uuid,
    state: SessionState,
    self_state: PlayerState,
    enemy_state: PlayerState,
    self_ready: bool,
    enemy_ready: bool,
}

impl Session {
    fn new(limits: PlayerLimits) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Setup,
            self_state: PlayerState::new(PlayerRole::Local, limits),
            enemy_state: PlayerState::new(PlayerRole::Mirror, limits),
            self_ready: false,
            enemy_ready: false,
        }
    }
}

/// Per-event side effects collected for the step.
#[derive(Debug, Default)]
struct Scratch {
    outbound: Vec<FightMessage>,
    added_buff: Option<(Target, Buff)>,
    removed_buff: Option<BuffRemoval>,
    cast_shape: Option<(Target, Shape)>,
    cast_rejected: bool,
    result: Option<FightResult>,
}

/// The combat state machine.
pub struct CombatEngine {
    config: FightConfig,
    link: Box<dyn PeerLink>,
    link_state: LinkState,
    session: Session,
    timers: TimerQueue,
    /// Life-cycle messages held back until the session unblocks.
    deferred: VecDeque<FightMessage>,
    last_result: Option<FightResult>,
    scratch: Scratch,
    left: bool,
}

impl CombatEngine {
    /// Create an engine in SETUP with the link assumed down.
    pub fn new(config: FightConfig, link: Box<dyn PeerLink>) -> Self {
        let session = Session::new(config.limits());
        info!(session = %session.id, link = link.name(), "fight session created");

        Self {
            config,
            link,
            link_state: LinkState::Disconnected,
            session,
            timers: TimerQueue::new(),
            deferred: VecDeque::new(),
            last_result: None,
            scratch: Scratch::default(),
            left: false,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.session.state
    }

    /// Identifier of the current session.
    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    /// Local player.
    pub fn self_state(&self) -> &PlayerState {
        &self.session.self_state
    }

    /// Local model of the opponent.
    pub fn enemy_state(&self) -> &PlayerState {
        &self.session.enemy_state
    }

    /// Pending timers.
    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    /// Result of the most recent finished fight.
    pub fn last_result(&self) -> Option<&FightResult> {
        self.last_result.as_ref()
    }

    /// Configuration in use.
    pub fn config(&self) -> &FightConfig {
        &self.config
    }

    /// Life-cycle messages waiting for the session to unblock.
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Whether the player has left.
    pub fn has_left(&self) -> bool {
        self.left
    }

    /// Earliest timer deadline.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.timers.next_deadline()
    }

    /// Take the next timer due at `now`. Feed it back as `TimerFired`.
    pub fn pop_due(&mut self, now: Millis) -> Option<TimerKey> {
        self.timers.pop_due(now)
    }

    /// Snapshot of the view without per-event deltas.
    pub fn view(&self) -> ViewUpdate {
        self.build_view(&Scratch::default())
    }

    /// Process one queue event.
    pub fn handle(&mut self, now: Millis, event: EngineEvent) -> Step {
        #[cfg(feature = "debug-tracing")]
        debug!(session = %self.session.id, state = %self.session.state, ?event, "handle");

        self.scratch = Scratch::default();

        let outcome = match event {
            EngineEvent::LocalReady => {
                self.on_local_ready(now);
                Ok(())
            }
            EngineEvent::LocalCast { shape, target } => {
                self.on_local_cast(now, shape, target);
                Ok(())
            }
            EngineEvent::Remote(bytes) => FightMessage::decode(&bytes)
                .map_err(EngineError::from)
                .and_then(|msg| self.on_remote(now, msg)),
            EngineEvent::Link(state) => self.on_link(now, state),
            EngineEvent::TimerFired(key) => {
                self.on_timer(now, key);
                Ok(())
            }
            EngineEvent::Acknowledge => {
                self.on_acknowledge(now);
                Ok(())
            }
            EngineEvent::Leave => {
                self.on_leave();
                Ok(())
            }
        };

        match outcome {
            Ok(()) => {}
            Err(EngineError::PeerDisconnected) => {
                warn!(session = %self.session.id, "connection lost");
                self.finish(FightOutcome::ConnectionLost);
            }
            Err(e) => {
                warn!(session = %self.session.id, state = %self.session.state, "dropping event: {}", e);
            }
        }

        let scratch = std::mem::take(&mut self.scratch);
        let view = self.build_view(&scratch);
        Step {
            outbound: scratch.outbound,
            view,
            left: self.left,
        }
    }

    // -------------------------------------------------------------------------
    // Handshake and life cycle
    // -------------------------------------------------------------------------

    fn on_local_ready(&mut self, now: Millis) {
        match self.session.state {
            SessionState::Setup | SessionState::WaitingReady => self.announce_ready(now),
            state => debug!(%state, "local ready ignored"),
        }
    }

    fn announce_ready(&mut self, now: Millis) {
        if self.session.self_ready {
            return;
        }
        self.session.self_ready = true;
        self.send(FightMessage::new(Target::Enemy, FightAction::EnemyReady));
        self.advance_handshake(now);
    }

    fn advance_handshake(&mut self, now: Millis) {
        let session = &mut self.session;
        if session.self_ready && session.enemy_ready {
            session.state = SessionState::Countdown;
            self.timers.schedule(TimerKey::Countdown, now + self.config.countdown_ms);
            info!(session = %session.id, "both ready, countdown started");
        } else if session.self_ready || session.enemy_ready {
            session.state = SessionState::WaitingReady;
        }
    }

    fn on_enemy_ready(&mut self, now: Millis, msg: FightMessage) {
        match self.session.state {
            SessionState::Setup | SessionState::WaitingReady => {
                if self.session.enemy_ready {
                    debug!("duplicate enemy ready ignored");
                    return;
                }
                self.session.enemy_ready = true;
                if !self.session.self_ready && self.link.on_enemy_ready() == ReadyReply::AnnounceSelf {
                    self.announce_ready(now);
                } else {
                    self.advance_handshake(now);
                }
            }
            SessionState::Countdown | SessionState::Active => {
                debug!("duplicate enemy ready ignored");
            }
            SessionState::Ended => {
                // Peer already restarted; keep it for our next session.
                self.deferred.push_back(msg);
            }
        }
    }

    fn start_fight(&mut self, now: Millis) {
        self.session.state = SessionState::Active;
        info!(session = %self.session.id, "fight started");

        self.send(FightMessage::new(Target::Enemy, FightAction::FightStart));
        self.timers.schedule(TimerKey::ManaRegen, now + self.config.mana_regen_interval_ms);
        self.replay_deferred(now);
    }

    fn replay_deferred(&mut self, now: Millis) {
        let queued = std::mem::take(&mut self.deferred);
        for msg in queued {
            if let Err(e) = self.on_remote(now, msg) {
                warn!(session = %self.session.id, "dropping replayed message: {}", e);
            }
        }
    }

    fn on_link(&mut self, now: Millis, state: LinkState) -> Result<(), EngineError> {
        self.link_state = state;
        match self.link.on_transport_state_change(state) {
            LinkCommand::AnnounceReady => {
                if matches!(self.session.state, SessionState::Setup | SessionState::WaitingReady) {
                    self.announce_ready(now);
                }
                Ok(())
            }
            LinkCommand::Nothing => Ok(()),
            LinkCommand::Disconnected if self.session.state == SessionState::Ended => Ok(()),
            LinkCommand::Disconnected => Err(EngineError::PeerDisconnected),
        }
    }

    fn on_acknowledge(&mut self, now: Millis) {
        if self.session.state != SessionState::Ended {
            debug!(state = %self.session.state, "nothing to acknowledge");
            return;
        }

        self.timers.clear();
        self.session = Session::new(self.config.limits());
        info!(session = %self.session.id, "new fight session");

        if self.link_state == LinkState::Disconnected {
            info!(session = %self.session.id, "waiting for the link");
        } else if self.link.on_transport_state_change(LinkState::Connected) == LinkCommand::AnnounceReady {
            self.announce_ready(now);
        }
        self.replay_deferred(now);
    }

    fn on_leave(&mut self) {
        if matches!(self.session.state, SessionState::Countdown | SessionState::Active) {
            // Forfeit so the peer does not wait on us.
            self.finish(FightOutcome::Lost);
        }
        self.timers.clear();
        self.left = true;
        info!(session = %self.session.id, "player left");
    }

    fn finish(&mut self, outcome: FightOutcome) {
        if self.session.state == SessionState::Ended {
            return;
        }
        self.timers.clear();
        // Only a peer's ready announcement belongs to the next session.
        self.deferred.retain(|msg| msg.action() == FightAction::EnemyReady);

        if outcome == FightOutcome::Lost {
            self.send(FightMessage::new(Target::Enemy, FightAction::FightEnd));
        }
        self.session.state = SessionState::Ended;

        let winner = match outcome {
            FightOutcome::Won => Some(Target::Me),
            FightOutcome::Lost => Some(Target::Enemy),
            FightOutcome::ConnectionLost => None,
        };
        let result = FightResult {
            session_id: self.session.id,
            outcome,
            winner,
            self_health: self.session.self_state.health(),
            enemy_health: self.session.enemy_state.health(),
            ended_at: Utc::now(),
        };
        info!(session = %self.session.id, ?outcome, "fight ended");

        self.scratch.result = Some(result.clone());
        self.last_result = Some(result);
    }

    // -------------------------------------------------------------------------
    // Remote messages
    // -------------------------------------------------------------------------

    fn on_remote(&mut self, now: Millis, msg: FightMessage) -> Result<(), EngineError> {
        let state = self.session.state;
        match msg.action() {
            FightAction::EnemyReady => {
                self.on_enemy_ready(now, msg);
                Ok(())
            }
            FightAction::FightStart => match state {
                SessionState::Countdown => {
                    self.deferred.push_back(msg);
                    Ok(())
                }
                SessionState::Active | SessionState::Ended => Ok(()),
                SessionState::Setup | SessionState::WaitingReady => {
                    Err(EngineError::InvalidStateTransition { action: msg.action(), state })
                }
            },
            FightAction::FightEnd => match state {
                SessionState::Active => {
                    self.session.enemy_state.set_health_and_mana(msg.health(), msg.mana());
                    self.finish(FightOutcome::Won);
                    Ok(())
                }
                SessionState::Countdown => {
                    self.deferred.push_back(msg);
                    Ok(())
                }
                SessionState::Ended => Ok(()),
                SessionState::Setup | SessionState::WaitingReady => {
                    Err(EngineError::InvalidStateTransition { action: msg.action(), state })
                }
            },
            _ if state.is_blocked() => {
                debug!(%msg, %state, "message dropped while blocked");
                Ok(())
            }
            _ => {
                self.handle_enemy_message(now, msg);
                Ok(())
            }
        }
    }

    fn handle_enemy_message(&mut self, now: Millis, msg: FightMessage) {
        // Every enemy message carries its current numbers.
        self.session.enemy_state.set_health_and_mana(msg.health(), msg.mana());

        match msg.target() {
            Target::Me => self.handle_message_to_self(now, msg, Origin::Remote),
            Target::Enemy => {
                let res = self.session.enemy_state.resolve(&msg, None);
                if let Some(buff) = res.removed_buff {
                    self.timers.cancel(TimerKey::BuffTick { side: Target::Enemy, buff });
                    self.scratch.removed_buff = Some(BuffRemoval {
                        side: Target::Enemy,
                        buff,
                        by_enemy: res.removed_by_enemy,
                    });
                }
                if let Some(buff) = res.added_buff {
                    self.scratch.added_buff = Some((Target::Enemy, buff));
                }
                if let Some(buff) = res.added_buff.or(res.refreshed_buff) {
                    self.timers.schedule(TimerKey::BuffTick { side: Target::Enemy, buff }, now + buff.duration_ms());
                }
            }
        }

        match msg.action() {
            FightAction::Cast(shape) | FightAction::NewHpOrMana(shape) if !shape.is_sentinel() => {
                self.scratch.cast_shape = Some((Target::Enemy, shape));
            }
            _ => {}
        }

        if self.session.state == SessionState::Active && self.session.enemy_state.is_dead() {
            self.finish(FightOutcome::Won);
        }
    }

    // -------------------------------------------------------------------------
    // Local actions
    // -------------------------------------------------------------------------

    fn on_local_cast(&mut self, now: Millis, shape: Shape, target: Option<Target>) {
        if self.session.state != SessionState::Active {
            debug!(%shape, state = %self.session.state, "cast dropped");
            return;
        }
        let Some(spell) = shape.spell() else {
            debug!(%shape, "not a spell");
            return;
        };
        let target = target.unwrap_or(spell.default_target);
        self.handle_self_message(now, FightMessage::new(target, FightAction::Cast(shape)));
    }

    fn handle_self_message(&mut self, now: Millis, msg: FightMessage) {
        if !self.session.self_state.request_spell(&msg) {
            debug!(%msg, mana = self.session.self_state.mana(), "not enough mana");
            self.scratch.cast_rejected = true;
            return;
        }

        match msg.target() {
            Target::Me => self.handle_message_to_self(now, msg, Origin::Local),
            // The receiver is the target from its point of view.
            Target::Enemy => self.send(msg.retargeted(msg.target().flipped())),
        }

        if let FightAction::Cast(shape) = msg.action() {
            self.scratch.cast_shape = Some((Target::Me, shape));
        }
    }

    fn handle_message_to_self(&mut self, now: Millis, msg: FightMessage, origin: Origin) {
        let Session { self_state, enemy_state, .. } = &mut self.session;
        let opponent = match origin {
            Origin::Remote => Some(&*enemy_state),
            Origin::Local => None,
        };
        let res = self_state.resolve(&msg, opponent);

        if self_state.is_dead() {
            self.finish(FightOutcome::Lost);
            return;
        }

        if let Some(buff) = res.removed_buff {
            self.send(FightMessage::new(Target::Enemy, FightAction::BuffOff(buff)));
            self.timers.cancel(TimerKey::BuffTick { side: Target::Me, buff });
            self.scratch.removed_buff = Some(BuffRemoval {
                side: Target::Me,
                buff,
                by_enemy: res.removed_by_enemy,
            });
        }

        if let Some(buff) = res.added_buff {
            self.send(FightMessage::new(Target::Enemy, FightAction::BuffOn(buff)));
            self.scratch.added_buff = Some((Target::Me, buff));
        }

        if let Some(buff) = res.added_buff.or(res.refreshed_buff) {
            self.timers.schedule(TimerKey::BuffTick { side: Target::Me, buff }, now + buff.duration_ms());
        }

        if res.added_buff.is_none() && res.removed_buff.is_none() {
            // Only advertise shapes we cast ourselves.
            let shape = match origin {
                Origin::Local => res.spell_shape,
                Origin::Remote => Shape::None,
            };
            self.send(FightMessage::new(Target::Enemy, FightAction::NewHpOrMana(shape)));
        }
    }

    // -------------------------------------------------------------------------
    // Timers
    // -------------------------------------------------------------------------

    fn on_timer(&mut self, now: Millis, key: TimerKey) {
        let state = self.session.state;
        match key {
            TimerKey::Countdown if state == SessionState::Countdown => self.start_fight(now),
            TimerKey::ManaRegen if state == SessionState::Active => self.handle_mana_regen(now),
            TimerKey::BuffTick { side: Target::Me, buff } if state == SessionState::Active => {
                self.handle_self_message(now, FightMessage::new(Target::Me, FightAction::BuffTick(buff)));
            }
            TimerKey::BuffTick { side: Target::Enemy, buff } if state == SessionState::Active => {
                self.mirror_tick(now, buff);
            }
            _ => debug!(?key, %state, "stale timer ignored"),
        }
    }

    fn handle_mana_regen(&mut self, now: Millis) {
        self.session.self_state.mana_tick();
        // Keep the peer's copy of our mana current.
        self.send(FightMessage::new(Target::Enemy, FightAction::NewHpOrMana(Shape::None)));
        self.timers.schedule(TimerKey::ManaRegen, now + self.config.mana_regen_interval_ms);
    }

    fn mirror_tick(&mut self, now: Millis, buff: Buff) {
        let msg = FightMessage::new(Target::Me, FightAction::BuffTick(buff));
        let res = self.session.enemy_state.resolve(&msg, None);
        if let Some(buff) = res.removed_buff {
            self.scratch.removed_buff = Some(BuffRemoval {
                side: Target::Enemy,
                buff,
                by_enemy: false,
            });
        }
        if let Some(buff) = res.refreshed_buff {
            self.timers.schedule(TimerKey::BuffTick { side: Target::Enemy, buff }, now + buff.duration_ms());
        }
    }

    // -------------------------------------------------------------------------
    // Output
    // -------------------------------------------------------------------------

    fn send(&mut self, msg: FightMessage) {
        let (health, mana) = self.session.self_state.snapshot();
        let stamped = msg.with_snapshot(health, mana);
        debug!(%stamped, "send");
        self.scratch.outbound.push(stamped);
    }

    fn build_view(&self, scratch: &Scratch) -> ViewUpdate {
        let me = &self.session.self_state;
        let enemy = &self.session.enemy_state;
        ViewUpdate {
            session_state: self.session.state,
            self_health: me.health(),
            self_mana: me.mana(),
            enemy_health: enemy.health(),
            enemy_mana: enemy.mana(),
            self_buffs: me.buffs().collect(),
            enemy_buffs: enemy.buffs().collect(),
            added_buff: scratch.added_buff,
            removed_buff: scratch.removed_buff,
            cast_shape: scratch.cast_shape,
            cast_rejected: scratch.cast_rejected,
            result: scratch.result.clone(),
        }
    }
}
