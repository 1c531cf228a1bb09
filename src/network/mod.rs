//! Network Layer
//!
//! Wire format, peer link hooks, transports and the async session driver.
//! This layer is **non-deterministic** - all fight rules run through `game/`.

pub mod protocol;
pub mod link;
pub mod transport;
pub mod session;
pub mod ws;

pub use protocol::{FightAction, FightMessage, MalformedMessage, RECORD_LEN};
pub use link::{PeerLink, LinkState, LinkCommand, ReadyReply, AutoReadyLink, ManualReadyLink};
pub use transport::{Transport, TransportError, LoopbackTransport, ChannelTransport};
pub use session::{FightSession, SessionHandle, SessionError};
pub use ws::WsError;
