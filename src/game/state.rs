//! Player State
//!
//! Health, mana and active buffs of one combatant, and the rules that turn a
//! fight message into state deltas.
//! Uses BTreeMap for deterministic buff iteration order.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::game::catalog::{Buff, Shape, Spell, SpellEffect, CONCENTRATION_DAMAGE_PERCENT};
use crate::network::protocol::{FightAction, FightMessage};

/// Which copy of a combatant this is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerRole {
    /// The local player. Owns its numbers.
    Local,
    /// The local model of the opponent. Health and mana come from the
    /// opponent's snapshots; buff ticks only count down.
    Mirror,
}

/// Caps and regeneration shared by both combatants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLimits {
    /// Maximum (and starting) health.
    pub max_health: u16,
    /// Maximum (and starting) mana.
    pub max_mana: u16,
    /// Mana added by one regeneration tick.
    pub mana_regen: u16,
}

impl Default for PlayerLimits {
    fn default() -> Self {
        Self {
            max_health: 200,
            max_mana: 100,
            mana_regen: 5,
        }
    }
}

/// State deltas produced by one `resolve` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Buff that was not active before and is now.
    pub added_buff: Option<Buff>,
    /// Buff that was active before and is gone now.
    pub removed_buff: Option<Buff>,
    /// Buff that stays active and needs its next tick scheduled.
    pub refreshed_buff: Option<Buff>,
    /// Whether `removed_buff` was cancelled by an enemy action.
    pub removed_by_enemy: bool,
    /// Shape carried by the resolved action.
    pub spell_shape: Shape,
}

/// One combatant.
#[derive(Clone, Debug)]
pub struct PlayerState {
    role: PlayerRole,
    limits: PlayerLimits,
    health: u16,
    mana: u16,
    /// Active buffs: kind -> remaining ticks.
    buffs: BTreeMap<Buff, u8>,
    last: Resolution,
}

impl PlayerState {
    /// Create a combatant at full health and mana with no buffs.
    pub fn new(role: PlayerRole, limits: PlayerLimits) -> Self {
        Self {
            role,
            limits,
            health: limits.max_health,
            mana: limits.max_mana,
            buffs: BTreeMap::new(),
            last: Resolution::default(),
        }
    }

    /// Role of this copy.
    #[inline]
    pub fn role(&self) -> PlayerRole {
        self.role
    }

    /// Current health.
    #[inline]
    pub fn health(&self) -> u16 {
        self.health
    }

    /// Current mana.
    #[inline]
    pub fn mana(&self) -> u16 {
        self.mana
    }

    /// Health reached zero. Terminal until the state is replaced.
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.health == 0
    }

    /// Whether a buff of this kind is active.
    #[inline]
    pub fn has_buff(&self, buff: Buff) -> bool {
        self.buffs.contains_key(&buff)
    }

    /// Ticks left before the buff expires.
    pub fn remaining_ticks(&self, buff: Buff) -> Option<u8> {
        self.buffs.get(&buff).copied()
    }

    /// Active buffs in ordinal order.
    pub fn buffs(&self) -> impl Iterator<Item = Buff> + '_ {
        self.buffs.keys().copied()
    }

    /// Health/mana snapshot as carried on the wire.
    pub fn snapshot(&self) -> (i16, i16) {
        (to_wire(self.health), to_wire(self.mana))
    }

    // -------------------------------------------------------------------------
    // Last resolution accessors (cleared by every `resolve`)
    // -------------------------------------------------------------------------

    /// Buff added by the last resolution.
    pub fn added_buff(&self) -> Option<Buff> {
        self.last.added_buff
    }

    /// Buff removed by the last resolution.
    pub fn removed_buff(&self) -> Option<Buff> {
        self.last.removed_buff
    }

    /// Buff refreshed by the last resolution.
    pub fn refreshed_buff(&self) -> Option<Buff> {
        self.last.refreshed_buff
    }

    /// Shape of the last resolved action.
    pub fn spell_shape(&self) -> Shape {
        self.last.spell_shape
    }

    /// Whether the last removal was caused by the enemy.
    pub fn is_buff_removed_by_enemy(&self) -> bool {
        self.last.removed_by_enemy
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Apply a message addressed to this combatant.
    ///
    /// `opponent` is the caster's state when the action came from the other
    /// side; it is only read. A dead combatant ignores everything.
    pub fn resolve(&mut self, message: &FightMessage, opponent: Option<&PlayerState>) -> Resolution {
        self.last = Resolution::default();
        if self.is_dead() {
            return self.last;
        }

        let mut res = Resolution {
            spell_shape: message.action().shape(),
            ..Resolution::default()
        };

        match message.action() {
            FightAction::Cast(shape) => {
                if let Some(spell) = shape.spell() {
                    self.apply_spell(spell, opponent, &mut res);
                }
            }
            FightAction::BuffOn(buff) => self.add_buff(buff, &mut res),
            FightAction::BuffOff(buff) => {
                if self.buffs.remove(&buff).is_some() {
                    res.removed_buff = Some(buff);
                }
            }
            FightAction::BuffTick(buff) => self.tick_buff(buff, &mut res),
            FightAction::NewHpOrMana(_)
            | FightAction::EnemyReady
            | FightAction::FightStart
            | FightAction::FightEnd => {}
        }

        self.last = res;
        res
    }

    /// Admission check for a local action.
    ///
    /// Deducts the mana cost and returns true, or returns false and changes
    /// nothing. Only casts cost mana.
    pub fn request_spell(&mut self, message: &FightMessage) -> bool {
        if self.is_dead() {
            return false;
        }
        let cost = match message.action() {
            FightAction::Cast(shape) => shape.mana_cost(),
            _ => 0,
        };
        if cost > self.mana {
            return false;
        }
        self.mana -= cost;
        true
    }

    /// Periodic mana regeneration.
    pub fn mana_tick(&mut self) {
        if self.is_dead() {
            return;
        }
        self.mana = self.mana.saturating_add(self.limits.mana_regen).min(self.limits.max_mana);
    }

    /// Overwrite health and mana from a peer snapshot, clamped.
    pub fn set_health_and_mana(&mut self, health: i16, mana: i16) {
        self.health = clamp(i32::from(health), self.limits.max_health);
        self.mana = clamp(i32::from(mana), self.limits.max_mana);
    }

    fn apply_spell(&mut self, spell: &Spell, opponent: Option<&PlayerState>, res: &mut Resolution) {
        match spell.effect {
            SpellEffect::Damage(base) => {
                let mut amount = u32::from(base);
                if opponent.is_some_and(|o| o.has_buff(Buff::Concentration)) {
                    amount = amount * CONCENTRATION_DAMAGE_PERCENT / 100;
                }

                // Only the opponent's damage is absorbed; self-inflicted hits go through.
                let from_enemy = opponent.is_some();
                if from_enemy && self.has_buff(Buff::HolyShield) && Buff::HolyShield.removable_by_enemy() {
                    self.buffs.remove(&Buff::HolyShield);
                    res.removed_buff = Some(Buff::HolyShield);
                    res.removed_by_enemy = true;
                } else {
                    self.change_health(-(amount as i32));
                }
            }
            SpellEffect::Heal(amount) => self.change_health(i32::from(amount)),
            SpellEffect::Apply(buff) => self.add_buff(buff, res),
        }
    }

    fn add_buff(&mut self, buff: Buff, res: &mut Resolution) {
        let ticks = buff.info().ticks;
        if self.buffs.insert(buff, ticks).is_some() {
            res.refreshed_buff = Some(buff);
        } else {
            res.added_buff = Some(buff);
        }
    }

    fn tick_buff(&mut self, buff: Buff, res: &mut Resolution) {
        let Some(remaining) = self.buffs.get_mut(&buff) else {
            // Already removed; a late tick is harmless.
            return;
        };
        *remaining = remaining.saturating_sub(1);
        let expired = *remaining == 0;

        if self.role == PlayerRole::Local {
            self.change_health(buff.info().health_per_tick);
        }

        if expired {
            self.buffs.remove(&buff);
            res.removed_buff = Some(buff);
        } else {
            res.refreshed_buff = Some(buff);
        }
    }

    fn change_health(&mut self, delta: i32) {
        self.health = clamp(i32::from(self.health) + delta, self.limits.max_health);
    }
}

fn clamp(value: i32, max: u16) -> u16 {
    value.clamp(0, i32::from(max)) as u16
}

fn to_wire(value: u16) -> i16 {
    i16::try_from(value).unwrap_or(i16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::game::catalog::Target;

    fn local() -> PlayerState {
        PlayerState::new(PlayerRole::Local, PlayerLimits::default())
    }

    fn mirror() -> PlayerState {
        PlayerState::new(PlayerRole::Mirror, PlayerLimits::default())
    }

    fn msg(action: FightAction) -> FightMessage {
        FightMessage::new(Target::Me, action)
    }

    #[test]
    fn test_fresh_state() {
        let state = local();
        assert_eq!(state.health(), 200);
        assert_eq!(state.mana(), 100);
        assert_eq!(state.buffs().count(), 0);
        assert!(!state.is_dead());
    }

    #[test]
    fn test_request_spell_deducts_cost() {
        let mut state = local();
        assert!(state.request_spell(&msg(FightAction::Cast(Shape::Circle))));
        assert_eq!(state.mana(), 90);
    }

    #[test]
    fn test_request_spell_rejects_without_mana() {
        let mut state = local();
        state.set_health_and_mana(200, 30);
        assert!(!state.request_spell(&msg(FightAction::Cast(Shape::Z))));
        assert_eq!(state.mana(), 30);
        assert!(state.request_spell(&msg(FightAction::Cast(Shape::Triangle))));
        assert_eq!(state.mana(), 10);
    }

    #[test]
    fn test_request_spell_free_actions() {
        let mut state = local();
        state.set_health_and_mana(200, 0);
        assert!(state.request_spell(&msg(FightAction::BuffTick(Buff::Weakness))));
        assert_eq!(state.mana(), 0);
    }

    #[test]
    fn test_damage_and_heal_clamp() {
        let mut state = local();
        state.resolve(&msg(FightAction::Cast(Shape::Circle)), None);
        assert_eq!(state.health(), 200);

        state.resolve(&msg(FightAction::Cast(Shape::Triangle)), None);
        assert_eq!(state.health(), 175);

        state.set_health_and_mana(30, 100);
        state.resolve(&msg(FightAction::Cast(Shape::Z)), None);
        assert_eq!(state.health(), 0);
        assert!(state.is_dead());
    }

    #[test]
    fn test_dead_state_is_terminal() {
        let mut state = local();
        state.set_health_and_mana(10, 100);
        state.resolve(&msg(FightAction::Cast(Shape::Triangle)), None);
        assert!(state.is_dead());

        let res = state.resolve(&msg(FightAction::Cast(Shape::Circle)), None);
        assert_eq!(res, Resolution::default());
        assert_eq!(state.health(), 0);
        assert!(!state.request_spell(&msg(FightAction::Cast(Shape::Circle))));
        state.mana_tick();
        assert_eq!(state.mana(), 100);
    }

    #[test]
    fn test_buff_added_then_refreshed() {
        let mut state = local();
        let res = state.resolve(&msg(FightAction::Cast(Shape::V)), None);
        assert_eq!(res.added_buff, Some(Buff::Weakness));
        assert_eq!(state.added_buff(), Some(Buff::Weakness));

        state.resolve(&msg(FightAction::BuffTick(Buff::Weakness)), None);
        assert_eq!(state.remaining_ticks(Buff::Weakness), Some(3));

        let res = state.resolve(&msg(FightAction::Cast(Shape::V)), None);
        assert_eq!(res.added_buff, None);
        assert_eq!(res.refreshed_buff, Some(Buff::Weakness));
        assert_eq!(state.remaining_ticks(Buff::Weakness), Some(4));
        assert_eq!(state.buffs().count(), 1);
    }

    #[test]
    fn test_accessors_cleared_each_resolve() {
        let mut state = local();
        state.resolve(&msg(FightAction::Cast(Shape::Shield)), None);
        assert_eq!(state.added_buff(), Some(Buff::HolyShield));

        state.resolve(&msg(FightAction::NewHpOrMana(Shape::None)), None);
        assert_eq!(state.added_buff(), None);
        assert_eq!(state.refreshed_buff(), None);
        assert_eq!(state.spell_shape(), Shape::None);
    }

    #[test]
    fn test_weakness_ticks_then_expires() {
        let mut state = local();
        state.resolve(&msg(FightAction::BuffOn(Buff::Weakness)), None);

        for _ in 0..3 {
            let res = state.resolve(&msg(FightAction::BuffTick(Buff::Weakness)), None);
            assert_eq!(res.refreshed_buff, Some(Buff::Weakness));
        }
        let res = state.resolve(&msg(FightAction::BuffTick(Buff::Weakness)), None);
        assert_eq!(res.removed_buff, Some(Buff::Weakness));
        assert!(!res.removed_by_enemy);
        assert_eq!(state.health(), 180);
        assert!(!state.has_buff(Buff::Weakness));

        // Late tick after expiry does nothing
        let res = state.resolve(&msg(FightAction::BuffTick(Buff::Weakness)), None);
        assert_eq!(res.removed_buff, None);
        assert_eq!(state.health(), 180);
    }

    #[test]
    fn test_blessing_heals_per_tick() {
        let mut state = local();
        state.set_health_and_mana(100, 100);
        state.resolve(&msg(FightAction::Cast(Shape::Pi)), None);
        state.resolve(&msg(FightAction::BuffTick(Buff::Blessing)), None);
        assert_eq!(state.health(), 110);
    }

    #[test]
    fn test_shield_absorbs_damage() {
        let caster = mirror();
        let mut state = local();
        state.resolve(&msg(FightAction::Cast(Shape::Shield)), None);

        let res = state.resolve(&msg(FightAction::Cast(Shape::Z)), Some(&caster));
        assert_eq!(state.health(), 200);
        assert_eq!(res.removed_buff, Some(Buff::HolyShield));
        assert!(res.removed_by_enemy);
        assert!(state.is_buff_removed_by_enemy());

        state.resolve(&msg(FightAction::Cast(Shape::Z)), Some(&caster));
        assert_eq!(state.health(), 155);
    }

    #[test]
    fn test_shield_ignores_own_damage() {
        let mut state = local();
        state.resolve(&msg(FightAction::Cast(Shape::Shield)), None);

        let res = state.resolve(&msg(FightAction::Cast(Shape::Triangle)), None);
        assert_eq!(state.health(), 175);
        assert_eq!(res.removed_buff, None);
        assert!(!res.removed_by_enemy);
        assert!(state.has_buff(Buff::HolyShield));
    }

    #[test]
    fn test_shield_natural_expiry_not_by_enemy() {
        let mut state = local();
        state.resolve(&msg(FightAction::BuffOn(Buff::HolyShield)), None);
        let res = state.resolve(&msg(FightAction::BuffTick(Buff::HolyShield)), None);
        assert_eq!(res.removed_buff, Some(Buff::HolyShield));
        assert!(!res.removed_by_enemy);
    }

    #[test]
    fn test_opponent_concentration_amplifies_damage() {
        let mut caster = mirror();
        caster.resolve(&msg(FightAction::BuffOn(Buff::Concentration)), None);

        let mut state = local();
        state.resolve(&msg(FightAction::Cast(Shape::Triangle)), Some(&caster));
        assert_eq!(state.health(), 200 - 37);
    }

    #[test]
    fn test_mirror_ticks_do_not_touch_health() {
        let mut state = mirror();
        state.set_health_and_mana(100, 50);
        state.resolve(&msg(FightAction::BuffOn(Buff::Weakness)), None);
        state.resolve(&msg(FightAction::BuffTick(Buff::Weakness)), None);
        assert_eq!(state.health(), 100);
        assert_eq!(state.remaining_ticks(Buff::Weakness), Some(3));
    }

    #[test]
    fn test_snapshot_clamped() {
        let mut state = mirror();
        state.set_health_and_mana(i16::MAX, -40);
        assert_eq!(state.health(), 200);
        assert_eq!(state.mana(), 0);
    }

    #[test]
    fn test_two_mana_ticks() {
        let mut state = local();
        state.set_health_and_mana(200, 50);
        state.mana_tick();
        state.mana_tick();
        assert_eq!(state.mana(), 60);

        state.set_health_and_mana(200, 98);
        state.mana_tick();
        state.mana_tick();
        assert_eq!(state.mana(), 100);
    }

    fn arb_action() -> impl Strategy<Value = FightAction> {
        prop_oneof![
            (0u8..9).prop_map(|i| FightAction::Cast(Shape::from_index(i).unwrap())),
            (0u8..4).prop_map(|i| FightAction::BuffOn(Buff::from_index(i).unwrap())),
            (0u8..4).prop_map(|i| FightAction::BuffOff(Buff::from_index(i).unwrap())),
            (0u8..4).prop_map(|i| FightAction::BuffTick(Buff::from_index(i).unwrap())),
            Just(FightAction::NewHpOrMana(Shape::None)),
        ]
    }

    proptest! {
        #[test]
        fn prop_bounds_hold(actions in proptest::collection::vec((arb_action(), any::<bool>(), any::<bool>()), 0..64)) {
            let mut state = local();
            let mut opponent = mirror();
            opponent.resolve(&msg(FightAction::BuffOn(Buff::Concentration)), None);

            for (action, request, regen) in actions {
                let m = msg(action);
                if request {
                    let before = state.mana();
                    if state.request_spell(&m) {
                        prop_assert_eq!(before - state.mana(), m.action().shape().mana_cost() * u16::from(matches!(action, FightAction::Cast(_))));
                    } else {
                        prop_assert_eq!(before, state.mana());
                    }
                }
                state.resolve(&m, Some(&opponent));
                if regen {
                    state.mana_tick();
                }
                prop_assert!(state.health() <= 200);
                prop_assert!(state.mana() <= 100);
                prop_assert!(state.buffs().count() <= Buff::ALL.len());
            }
        }
    }
}
