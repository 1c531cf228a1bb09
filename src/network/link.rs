//! Peer Link Hooks
//!
//! The small capability set the engine needs from whatever transport pairs
//! the two devices: how to answer a peer's ready announcement and how to
//! react when the link comes up or goes down.

use serde::{Serialize, Deserialize};

/// Transport connectivity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Peer reachable.
    Connected,
    /// Peer unreachable; the fight cannot continue.
    Disconnected,
}

/// Answer to a peer's ready announcement while the local side has not
/// announced yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyReply {
    /// Announce the local side immediately.
    AnnounceSelf,
    /// Wait for the local player.
    Wait,
}

/// What the engine should do after a link state change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkCommand {
    /// Announce the local side as ready.
    AnnounceReady,
    /// Nothing to do.
    Nothing,
    /// End the fight as a lost connection.
    Disconnected,
}

/// Transport-specific behaviour injected into the engine.
pub trait PeerLink: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// The peer announced it is ready and the local side has not.
    fn on_enemy_ready(&mut self) -> ReadyReply;

    /// Connectivity changed (also replayed for every fresh session).
    fn on_transport_state_change(&mut self, state: LinkState) -> LinkCommand;
}

/// Direct pairing: being connected means being ready.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoReadyLink;

impl PeerLink for AutoReadyLink {
    fn name(&self) -> &'static str {
        "auto-ready"
    }

    fn on_enemy_ready(&mut self) -> ReadyReply {
        ReadyReply::AnnounceSelf
    }

    fn on_transport_state_change(&mut self, state: LinkState) -> LinkCommand {
        match state {
            LinkState::Connected => LinkCommand::AnnounceReady,
            LinkState::Disconnected => LinkCommand::Disconnected,
        }
    }
}

/// Shared network: each player confirms readiness by hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualReadyLink;

impl PeerLink for ManualReadyLink {
    fn name(&self) -> &'static str {
        "manual-ready"
    }

    fn on_enemy_ready(&mut self) -> ReadyReply {
        ReadyReply::Wait
    }

    fn on_transport_state_change(&mut self, state: LinkState) -> LinkCommand {
        match state {
            LinkState::Connected => LinkCommand::Nothing,
            LinkState::Disconnected => LinkCommand::Disconnected,
        }
    }
}
