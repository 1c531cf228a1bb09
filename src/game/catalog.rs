//! Spell and Buff Catalog
//!
//! Static combat data: the shapes a player can draw, the spell each shape
//! casts, and the timed buffs those spells can leave behind.
//! Nothing here is computed at runtime; both peers must agree on every table.

use serde::{Serialize, Deserialize};

// =============================================================================
// TARGET
// =============================================================================

/// Whose state an action applies to.
///
/// The frame depends on where the value lives: local casts and view updates
/// use the local player's frame, wire messages use the receiver's frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Target {
    /// The player holding this value.
    Me = 0,
    /// That player's opponent.
    Enemy = 1,
}

impl Target {
    /// The same target seen from the other peer.
    #[inline]
    pub fn flipped(self) -> Target {
        match self {
            Target::Me => Target::Enemy,
            Target::Enemy => Target::Me,
        }
    }

    /// Get target from its wire byte.
    pub fn from_index(index: u8) -> Option<Target> {
        match index {
            0 => Some(Target::Me),
            1 => Some(Target::Enemy),
            _ => None,
        }
    }
}

// =============================================================================
// SHAPE
// =============================================================================

/// A recognized gesture.
///
/// `Fail` and `None` are sentinels produced by the recognizer and never cast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Shape {
    /// Fireball.
    Triangle = 0,
    /// Heal.
    Circle = 1,
    /// Concentration.
    Clock = 2,
    /// Lightning.
    Z = 3,
    /// Weakness curse.
    V = 4,
    /// Blessing.
    Pi = 5,
    /// Holy shield.
    Shield = 6,
    /// Gesture was drawn but not recognized.
    Fail = 7,
    /// No gesture.
    #[default]
    None = 8,
}

impl Shape {
    /// Every shape, in ordinal order.
    pub const ALL: [Shape; 9] = [
        Shape::Triangle,
        Shape::Circle,
        Shape::Clock,
        Shape::Z,
        Shape::V,
        Shape::Pi,
        Shape::Shield,
        Shape::Fail,
        Shape::None,
    ];

    /// Get shape from ordinal.
    pub fn from_index(index: u8) -> Option<Shape> {
        Self::ALL.get(index as usize).copied()
    }

    /// Whether this shape is a sentinel rather than a spell.
    #[inline]
    pub fn is_sentinel(self) -> bool {
        matches!(self, Shape::Fail | Shape::None)
    }

    /// The spell this shape casts.
    pub fn spell(self) -> Option<&'static Spell> {
        SPELLS.get(self as usize)
    }

    /// Mana needed to cast this shape (0 for sentinels).
    pub fn mana_cost(self) -> u16 {
        self.spell().map_or(0, |s| s.mana_cost)
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Shape::Triangle => "triangle",
            Shape::Circle => "circle",
            Shape::Clock => "clock",
            Shape::Z => "z",
            Shape::V => "v",
            Shape::Pi => "pi",
            Shape::Shield => "shield",
            Shape::Fail => "fail",
            Shape::None => "none",
        };
        f.write_str(name)
    }
}

// =============================================================================
// BUFF
// =============================================================================

/// Timed status effect attached to a player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Buff {
    /// Damage over time.
    Weakness = 0,
    /// Holder's damage spells hit harder.
    Concentration = 1,
    /// Heal over time.
    Blessing = 2,
    /// Absorbs the next damaging spell.
    HolyShield = 3,
}

/// Static description of a buff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuffInfo {
    /// Time between ticks; the last tick expires the buff.
    pub duration_ms: u64,
    /// Number of ticks before expiry.
    pub ticks: u8,
    /// Health change applied on every tick.
    pub health_per_tick: i32,
    /// Whether an opposing action can cancel it early.
    pub removable_by_enemy: bool,
}

static BUFFS: [BuffInfo; 4] = [
    // Weakness
    BuffInfo { duration_ms: 2000, ticks: 4, health_per_tick: -5, removable_by_enemy: false },
    // Concentration
    BuffInfo { duration_ms: 8000, ticks: 1, health_per_tick: 0, removable_by_enemy: false },
    // Blessing
    BuffInfo { duration_ms: 2000, ticks: 3, health_per_tick: 10, removable_by_enemy: false },
    // HolyShield
    BuffInfo { duration_ms: 10000, ticks: 1, health_per_tick: 0, removable_by_enemy: true },
];

/// Damage multiplier granted by Concentration, in percent.
pub const CONCENTRATION_DAMAGE_PERCENT: u32 = 150;

impl Buff {
    /// Every buff, in ordinal order.
    pub const ALL: [Buff; 4] = [
        Buff::Weakness,
        Buff::Concentration,
        Buff::Blessing,
        Buff::HolyShield,
    ];

    /// Get buff from ordinal.
    pub fn from_index(index: u8) -> Option<Buff> {
        Self::ALL.get(index as usize).copied()
    }

    /// Static description.
    #[inline]
    pub fn info(self) -> &'static BuffInfo {
        &BUFFS[self as usize]
    }

    /// Time until the next tick (or expiry).
    #[inline]
    pub fn duration_ms(self) -> u64 {
        self.info().duration_ms
    }

    /// Whether an enemy action can cancel this buff early.
    #[inline]
    pub fn removable_by_enemy(self) -> bool {
        self.info().removable_by_enemy
    }
}

// =============================================================================
// SPELLS
// =============================================================================

/// What a spell does to its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpellEffect {
    /// Subtract health.
    Damage(u16),
    /// Add health.
    Heal(u16),
    /// Apply (or refresh) a buff.
    Apply(Buff),
}

/// One entry of the spell table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Spell {
    /// Shape that casts it.
    pub shape: Shape,
    /// Mana deducted from the caster.
    pub mana_cost: u16,
    /// Target used when the gesture does not name one.
    pub default_target: Target,
    /// Effect on the target.
    pub effect: SpellEffect,
}

/// Spell table, indexed by shape ordinal. Sentinels have no entry.
pub static SPELLS: [Spell; 7] = [
    Spell { shape: Shape::Triangle, mana_cost: 20, default_target: Target::Enemy, effect: SpellEffect::Damage(25) },
    Spell { shape: Shape::Circle, mana_cost: 10, default_target: Target::Me, effect: SpellEffect::Heal(15) },
    Spell { shape: Shape::Clock, mana_cost: 15, default_target: Target::Me, effect: SpellEffect::Apply(Buff::Concentration) },
    Spell { shape: Shape::Z, mana_cost: 35, default_target: Target::Enemy, effect: SpellEffect::Damage(45) },
    Spell { shape: Shape::V, mana_cost: 20, default_target: Target::Enemy, effect: SpellEffect::Apply(Buff::Weakness) },
    Spell { shape: Shape::Pi, mana_cost: 30, default_target: Target::Me, effect: SpellEffect::Apply(Buff::Blessing) },
    Spell { shape: Shape::Shield, mana_cost: 20, default_target: Target::Me, effect: SpellEffect::Apply(Buff::HolyShield) },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spell_table_indexed_by_shape() {
        for spell in SPELLS.iter() {
            assert_eq!(spell.shape.spell(), Some(spell));
        }
    }

    #[test]
    fn test_sentinels_have_no_spell() {
        assert!(Shape::Fail.spell().is_none());
        assert!(Shape::None.spell().is_none());
        assert_eq!(Shape::None.mana_cost(), 0);
        assert!(Shape::Fail.is_sentinel());
        assert!(!Shape::Triangle.is_sentinel());
        assert_eq!(Shape::default(), Shape::None);
    }

    #[test]
    fn test_circle_costs_ten() {
        assert_eq!(Shape::Circle.mana_cost(), 10);
    }

    #[test]
    fn test_ordinals() {
        for (i, shape) in Shape::ALL.iter().enumerate() {
            assert_eq!(*shape as usize, i);
            assert_eq!(Shape::from_index(i as u8), Some(*shape));
        }
        for (i, buff) in Buff::ALL.iter().enumerate() {
            assert_eq!(Buff::from_index(i as u8), Some(*buff));
        }
        assert_eq!(Shape::from_index(9), None);
        assert_eq!(Buff::from_index(4), None);
    }

    #[test]
    fn test_only_shield_removable_by_enemy() {
        assert!(Buff::HolyShield.removable_by_enemy());
        assert!(!Buff::Weakness.removable_by_enemy());
        assert!(!Buff::Blessing.removable_by_enemy());
        assert!(!Buff::Concentration.removable_by_enemy());
    }

    #[test]
    fn test_target_flip() {
        assert_eq!(Target::Me.flipped(), Target::Enemy);
        assert_eq!(Target::Enemy.flipped(), Target::Me);
        assert_eq!(Target::from_index(2), None);
    }
}
