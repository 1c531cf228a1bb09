//! Fight Session Driver
//!
//! Runs one [`CombatEngine`] on a tokio task. Every input (local gestures,
//! peer records, link changes, timers) goes through a single queue, so the
//! engine never sees two events at once. View updates are broadcast to any
//! number of subscribers.

use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument};

use crate::game::catalog::{Shape, Target};
use crate::game::engine::{CombatEngine, FightConfig, Step};
use crate::game::events::{EngineEvent, FightResult, ViewUpdate};
use crate::game::timers::Millis;
use crate::network::link::{LinkState, PeerLink};
use crate::network::transport::Transport;

/// Capacity of the view broadcast channel.
const VIEW_CHANNEL_CAPACITY: usize = 256;

/// Session driver errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The driver task has stopped.
    #[error("session closed")]
    Closed,
}

/// Cloneable front door to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<EngineEvent>,
    views: broadcast::Sender<ViewUpdate>,
}

impl SessionHandle {
    /// The local player is ready.
    pub fn ready(&self) -> Result<(), SessionError> {
        self.send(EngineEvent::LocalReady)
    }

    /// The recognizer produced a shape.
    pub fn cast(&self, shape: Shape, target: Option<Target>) -> Result<(), SessionError> {
        self.send(EngineEvent::LocalCast { shape, target })
    }

    /// A record arrived from the peer.
    pub fn deliver(&self, record: Vec<u8>) -> Result<(), SessionError> {
        self.send(EngineEvent::Remote(record))
    }

    /// The transport came up or went down.
    pub fn link_state(&self, state: LinkState) -> Result<(), SessionError> {
        self.send(EngineEvent::Link(state))
    }

    /// The player dismissed the result.
    pub fn acknowledge(&self) -> Result<(), SessionError> {
        self.send(EngineEvent::Acknowledge)
    }

    /// The player is leaving.
    pub fn leave(&self) -> Result<(), SessionError> {
        self.send(EngineEvent::Leave)
    }

    /// Receive view updates from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewUpdate> {
        self.views.subscribe()
    }

    fn send(&self, event: EngineEvent) -> Result<(), SessionError> {
        self.events.send(event).map_err(|_| SessionError::Closed)
    }
}

/// Owns the engine and its input queue.
pub struct FightSession {
    engine: CombatEngine,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    views: broadcast::Sender<ViewUpdate>,
}

impl FightSession {
    /// Create a session and the handle that feeds it.
    pub fn new(config: FightConfig, link: Box<dyn PeerLink>) -> (Self, SessionHandle) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (views, _) = broadcast::channel(VIEW_CHANNEL_CAPACITY);

        let handle = SessionHandle {
            events: events_tx,
            views: views.clone(),
        };
        let session = Self {
            engine: CombatEngine::new(config, link),
            events,
            views,
        };
        (session, handle)
    }

    /// Process events until the player leaves or every handle is dropped.
    ///
    /// Returns the result of the last finished fight, if any.
    #[instrument(skip_all)]
    pub async fn run<T: Transport>(mut self, transport: T) -> Option<FightResult> {
        let origin = Instant::now();
        let clock = move || origin.elapsed().as_millis() as Millis;

        info!("fight session running");
        while !self.engine.has_left() {
            let now = clock();
            while let Some(key) = self.engine.pop_due(now) {
                self.apply(now, EngineEvent::TimerFired(key), &transport);
            }
            if self.engine.has_left() {
                break;
            }

            let deadline = self.engine.next_deadline();
            let timer = async move {
                match deadline {
                    Some(at) => sleep_until(origin + Duration::from_millis(at)).await,
                    None => std::future::pending().await,
                }
            };

            let received = tokio::select! {
                event = self.events.recv() => Some(event),
                _ = timer => None,
            };

            match received {
                Some(Some(event)) => self.apply(clock(), event, &transport),
                Some(None) => {
                    debug!("all handles dropped");
                    break;
                }
                // Timer due; fired at the top of the loop.
                None => {}
            }
        }

        info!("fight session stopped");
        self.engine.last_result().cloned()
    }

    fn apply<T: Transport>(&mut self, now: Millis, event: EngineEvent, transport: &T) {
        let step = self.engine.handle(now, event);
        let delivered = self.flush(&step, transport);
        self.publish(step);

        if !delivered {
            let step = self.engine.handle(now, EngineEvent::Link(LinkState::Disconnected));
            self.publish(step);
        }
    }

    /// Send the step's records in order. False if the transport failed.
    fn flush<T: Transport>(&self, step: &Step, transport: &T) -> bool {
        for msg in &step.outbound {
            if let Err(e) = transport.send(&msg.encode()) {
                error!("send failed: {}", e);
                return false;
            }
        }
        true
    }

    fn publish(&self, step: Step) {
        // No subscribers is fine.
        let _ = self.views.send(step.view);
    }
}
