//! Game Logic Module
//!
//! Everything that decides the outcome of a fight. No I/O and no clocks:
//! time enters as explicit milliseconds, bytes leave as encoded records.
//!
//! ## Module Structure
//!
//! - `catalog`: Shapes, spells and buffs
//! - `state`: Player state and message resolution
//! - `timers`: Keyed one-shot timers
//! - `events`: Engine inputs and view-model outputs
//! - `engine`: The combat state machine

pub mod catalog;
pub mod state;
pub mod timers;
pub mod events;
pub mod engine;

// Re-export key types
pub use catalog::{Buff, Shape, Target, Spell, SpellEffect};
pub use state::{PlayerState, PlayerRole, PlayerLimits, Resolution};
pub use timers::{Millis, TimerKey, TimerQueue};
pub use events::{EngineEvent, SessionState, ViewUpdate, FightOutcome, FightResult};
pub use engine::{CombatEngine, FightConfig, ConfigError, EngineError, Step};
