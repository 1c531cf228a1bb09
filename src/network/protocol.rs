//! Protocol Messages
//!
//! Wire format for peer-to-peer fight messages.
//! Every message is one fixed-size little-endian record:
//!
//! ```text
//! [action:1][payload:1][target:1][health:i16 LE][mana:i16 LE]
//! ```
//!
//! The target byte is expressed in the receiver's frame: `Me` means the
//! action applies to the receiver, `Enemy` means it applies to the sender.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::catalog::{Buff, Shape, Target};

/// Size of one encoded record in bytes.
pub const RECORD_LEN: usize = 7;

// =============================================================================
// ACTIONS
// =============================================================================

/// What a message asks the receiver to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum FightAction {
    /// The sender is ready to fight.
    EnemyReady,
    /// The sender finished its countdown.
    FightStart,
    /// The sender lost (or left); the fight is over.
    FightEnd,
    /// State sync. Carries the shape the sender cast on itself, or `None`.
    NewHpOrMana(Shape),
    /// A buff was applied.
    BuffOn(Buff),
    /// A buff was removed.
    BuffOff(Buff),
    /// A buff ticked.
    BuffTick(Buff),
    /// A spell cast at the target.
    Cast(Shape),
}

impl FightAction {
    const ENEMY_READY: u8 = 0;
    const FIGHT_START: u8 = 1;
    const FIGHT_END: u8 = 2;
    const NEW_HP_OR_MANA: u8 = 3;
    const BUFF_ON: u8 = 4;
    const BUFF_OFF: u8 = 5;
    const BUFF_TICK: u8 = 6;
    const CAST: u8 = 7;

    /// Whether this action drives the session life cycle rather than state.
    #[inline]
    pub fn is_life_cycle(self) -> bool {
        matches!(self, FightAction::EnemyReady | FightAction::FightStart | FightAction::FightEnd)
    }

    /// Shape carried by this action, `Shape::None` if there is none.
    pub fn shape(self) -> Shape {
        match self {
            FightAction::Cast(shape) | FightAction::NewHpOrMana(shape) => shape,
            _ => Shape::None,
        }
    }

    /// Discriminant and payload bytes.
    fn to_bytes(self) -> (u8, u8) {
        match self {
            FightAction::EnemyReady => (Self::ENEMY_READY, 0),
            FightAction::FightStart => (Self::FIGHT_START, 0),
            FightAction::FightEnd => (Self::FIGHT_END, 0),
            FightAction::NewHpOrMana(shape) => (Self::NEW_HP_OR_MANA, shape as u8),
            FightAction::BuffOn(buff) => (Self::BUFF_ON, buff as u8),
            FightAction::BuffOff(buff) => (Self::BUFF_OFF, buff as u8),
            FightAction::BuffTick(buff) => (Self::BUFF_TICK, buff as u8),
            FightAction::Cast(shape) => (Self::CAST, shape as u8),
        }
    }

    fn from_bytes(action: u8, payload: u8) -> Result<Self, MalformedMessage> {
        let shape = || Shape::from_index(payload)
            .ok_or(MalformedMessage::InvalidPayload { action, payload });
        let buff = || Buff::from_index(payload)
            .ok_or(MalformedMessage::InvalidPayload { action, payload });

        Ok(match action {
            Self::ENEMY_READY => FightAction::EnemyReady,
            Self::FIGHT_START => FightAction::FightStart,
            Self::FIGHT_END => FightAction::FightEnd,
            Self::NEW_HP_OR_MANA => FightAction::NewHpOrMana(shape()?),
            Self::BUFF_ON => FightAction::BuffOn(buff()?),
            Self::BUFF_OFF => FightAction::BuffOff(buff()?),
            Self::BUFF_TICK => FightAction::BuffTick(buff()?),
            Self::CAST => FightAction::Cast(shape()?),
            other => return Err(MalformedMessage::UnknownAction(other)),
        })
    }
}

// =============================================================================
// MESSAGE
// =============================================================================

/// One fight message.
///
/// Immutable: retargeting or stamping a snapshot produces a new value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightMessage {
    target: Target,
    action: FightAction,
    health: i16,
    mana: i16,
}

impl FightMessage {
    /// Create a message with an empty snapshot.
    pub const fn new(target: Target, action: FightAction) -> Self {
        Self {
            target,
            action,
            health: 0,
            mana: 0,
        }
    }

    /// Copy of this message carrying the given health/mana snapshot.
    pub const fn with_snapshot(self, health: i16, mana: i16) -> Self {
        Self {
            health,
            mana,
            ..self
        }
    }

    /// Copy of this message with a different target.
    pub const fn retargeted(self, target: Target) -> Self {
        Self { target, ..self }
    }

    /// Whose state the action applies to.
    #[inline]
    pub fn target(&self) -> Target {
        self.target
    }

    /// The action.
    #[inline]
    pub fn action(&self) -> FightAction {
        self.action
    }

    /// Sender's health when the message was stamped.
    #[inline]
    pub fn health(&self) -> i16 {
        self.health
    }

    /// Sender's mana when the message was stamped.
    #[inline]
    pub fn mana(&self) -> i16 {
        self.mana
    }

    /// Encode to the fixed wire record.
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let (action, payload) = self.action.to_bytes();
        let health = self.health.to_le_bytes();
        let mana = self.mana.to_le_bytes();
        [
            action,
            payload,
            self.target as u8,
            health[0],
            health[1],
            mana[0],
            mana[1],
        ]
    }

    /// Decode a wire record.
    ///
    /// Health and mana are taken as-is; the receiving state clamps them.
    pub fn decode(data: &[u8]) -> Result<Self, MalformedMessage> {
        if data.len() < RECORD_LEN {
            return Err(MalformedMessage::Truncated { len: data.len() });
        }
        if data.len() > RECORD_LEN {
            return Err(MalformedMessage::TrailingBytes { len: data.len() });
        }

        let action = FightAction::from_bytes(data[0], data[1])?;
        let target = Target::from_index(data[2])
            .ok_or(MalformedMessage::UnknownTarget(data[2]))?;

        Ok(Self {
            target,
            action,
            health: i16::from_le_bytes([data[3], data[4]]),
            mana: i16::from_le_bytes([data[5], data[6]]),
        })
    }
}

impl std::fmt::Display for FightMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} -> {:?} (hp {}, mana {})",
            self.action, self.target, self.health, self.mana
        )
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// A byte sequence that is not a valid fight message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedMessage {
    /// Shorter than one record.
    #[error("truncated record: {len} of {} bytes", RECORD_LEN)]
    Truncated {
        /// Received length.
        len: usize,
    },

    /// Longer than one record.
    #[error("trailing bytes: {len} bytes, expected {}", RECORD_LEN)]
    TrailingBytes {
        /// Received length.
        len: usize,
    },

    /// Action discriminant outside the known set.
    #[error("unknown action {0}")]
    UnknownAction(u8),

    /// Payload ordinal not valid for the action.
    #[error("invalid payload {payload} for action {action}")]
    InvalidPayload {
        /// Action discriminant.
        action: u8,
        /// Offending payload.
        payload: u8,
    },

    /// Target byte outside the known set.
    #[error("unknown target {0}")]
    UnknownTarget(u8),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn all_actions() -> Vec<FightAction> {
        let mut actions = vec![
            FightAction::EnemyReady,
            FightAction::FightStart,
            FightAction::FightEnd,
        ];
        for shape in Shape::ALL {
            actions.push(FightAction::Cast(shape));
            actions.push(FightAction::NewHpOrMana(shape));
        }
        for buff in Buff::ALL {
            actions.push(FightAction::BuffOn(buff));
            actions.push(FightAction::BuffOff(buff));
            actions.push(FightAction::BuffTick(buff));
        }
        actions
    }

    #[test]
    fn test_record_layout() {
        let msg = FightMessage::new(Target::Me, FightAction::BuffOn(Buff::HolyShield))
            .with_snapshot(200, 90);

        let bytes = msg.encode();
        assert_eq!(bytes, [4, 3, 0, 200, 0, 90, 0]);
    }

    #[test]
    fn test_life_cycle_payload_is_zero() {
        let bytes = FightMessage::new(Target::Enemy, FightAction::FightEnd).encode();
        assert_eq!(bytes[0], 2);
        assert_eq!(bytes[1], 0);
        assert_eq!(bytes[2], 1);
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = FightMessage::new(Target::Me, FightAction::FightStart).encode();
        let err = FightMessage::decode(&bytes[..RECORD_LEN - 1]).unwrap_err();
        assert_eq!(err, MalformedMessage::Truncated { len: 6 });
        assert!(matches!(FightMessage::decode(&[]), Err(MalformedMessage::Truncated { len: 0 })));
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut bytes = FightMessage::new(Target::Me, FightAction::FightStart).encode().to_vec();
        bytes.push(0);
        assert!(matches!(
            FightMessage::decode(&bytes),
            Err(MalformedMessage::TrailingBytes { len: 8 })
        ));
    }

    #[test]
    fn test_decode_unknown_action() {
        let bytes = [8, 0, 0, 0, 0, 0, 0];
        assert_eq!(FightMessage::decode(&bytes), Err(MalformedMessage::UnknownAction(8)));
        let bytes = [0xFF, 0, 0, 0, 0, 0, 0];
        assert_eq!(FightMessage::decode(&bytes), Err(MalformedMessage::UnknownAction(0xFF)));
    }

    #[test]
    fn test_decode_invalid_payload() {
        // BUFF_ON with buff ordinal 9
        let bytes = [4, 9, 0, 0, 0, 0, 0];
        assert_eq!(
            FightMessage::decode(&bytes),
            Err(MalformedMessage::InvalidPayload { action: 4, payload: 9 })
        );
    }

    #[test]
    fn test_decode_unknown_target() {
        let bytes = [7, 0, 2, 0, 0, 0, 0];
        assert_eq!(FightMessage::decode(&bytes), Err(MalformedMessage::UnknownTarget(2)));
    }

    #[test]
    fn test_out_of_range_snapshot_is_accepted() {
        let bytes = [3, 8, 1, 0xFF, 0x7F, 0x00, 0x80];
        let msg = FightMessage::decode(&bytes).unwrap();
        assert_eq!(msg.health(), i16::MAX);
        assert_eq!(msg.mana(), i16::MIN);
    }

    #[test]
    fn test_every_action_roundtrips() {
        for action in all_actions() {
            for target in [Target::Me, Target::Enemy] {
                let msg = FightMessage::new(target, action).with_snapshot(123, 45);
                assert_eq!(FightMessage::decode(&msg.encode()), Ok(msg));
            }
        }
    }

    #[test]
    fn test_retarget_keeps_fields() {
        let msg = FightMessage::new(Target::Enemy, FightAction::Cast(Shape::Z)).with_snapshot(10, 20);
        let flipped = msg.retargeted(Target::Me);
        assert_eq!(flipped.target(), Target::Me);
        assert_eq!(flipped.action(), msg.action());
        assert_eq!(flipped.health(), 10);
        assert_eq!(msg.target(), Target::Enemy);
    }

    proptest! {
        #[test]
        fn prop_snapshot_roundtrip(health in any::<i16>(), mana in any::<i16>(), idx in 0usize..45) {
            let actions = all_actions();
            let action = actions[idx % actions.len()];
            let msg = FightMessage::new(Target::Enemy, action).with_snapshot(health, mana);
            prop_assert_eq!(FightMessage::decode(&msg.encode()), Ok(msg));
        }

        #[test]
        fn prop_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..12)) {
            let _ = FightMessage::decode(&bytes);
        }
    }
}
