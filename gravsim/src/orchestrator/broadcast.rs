//! Cadence loop and subscriber fan-out.
//!
//! One task owns the [`Orchestrator`] and the subscriber set. It selects
//! between inbound commands and the next cadence deadline, so a step,
//! its snapshot encoding and the fan-out of that snapshot never interleave
//! with a control message.
//!
//! Every subscriber has its own bounded frame channel. Sends never wait: a
//! full channel loses that frame for that subscriber only, a closed channel
//! removes the subscriber.
//!
//! [`SimulationHandle`] is the cloneable front end used by connections.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::orchestrator::messages::{self, ControlCommand, ControlMessage, StateMessage};
use crate::orchestrator::orchestrator::Orchestrator;
use crate::tiled::device::DeviceError;

/// Interval between periodic state messages while running
pub const STATE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Binary position snapshot
    Snapshot(Arc<[u8]>),
    /// JSON state message
    State(Arc<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

pub struct Subscription {
    pub id: SubscriberId,
    pub frames: mpsc::Receiver<Frame>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BroadcastSettings {
    /// Cadence at speed 1
    pub tick_interval: Duration,
    /// Frames buffered per subscriber before frames are dropped
    pub subscriber_buffer: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(16),
            subscriber_buffer: 64,
        }
    }
}

/// The live subscriber set
#[derive(Debug, Default)]
pub struct Subscribers {
    next_id: u64,
    live: Vec<(SubscriberId, mpsc::Sender<Frame>)>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, buffer: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.live.push((id, tx));
        Subscription { id, frames: rx }
    }

    pub fn remove(&mut self, id: SubscriberId) {
        self.live.retain(|(sid, _)| *sid != id);
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Offer `frame` to one subscriber
    pub fn send_to(&mut self, id: SubscriberId, frame: Frame) {
        let closed = match self.live.iter().find(|(sid, _)| *sid == id) {
            Some((_, tx)) => offer(id, tx, frame),
            None => false,
        };
        if closed {
            self.remove(id);
        }
    }

    /// Offer `frame` to every subscriber; returns how many accepted it
    pub fn broadcast(&mut self, frame: &Frame) -> usize {
        let mut dropped = 0;
        self.live.retain(|(id, tx)| match tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                dropped += 1;
                debug!(subscriber = id.0, "subscriber lagging, frame dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(subscriber = id.0, "subscriber gone");
                false
            }
        });
        self.live.len() - dropped
    }
}

/// Returns true if the channel is closed
fn offer(id: SubscriberId, tx: &mpsc::Sender<Frame>, frame: Frame) -> bool {
    match tx.try_send(frame) {
        Ok(()) => false,
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!(subscriber = id.0, "subscriber lagging, frame dropped");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => true,
    }
}

enum Command {
    Subscribe { reply: oneshot::Sender<Subscription> },
    Unsubscribe(SubscriberId),
    Text(String),
    Message(ControlMessage),
    State { reply: oneshot::Sender<StateMessage> },
    Shutdown { reply: oneshot::Sender<Result<(), DeviceError>> },
}

/// Cloneable handle to the simulation service
#[derive(Clone)]
pub struct SimulationHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SimulationHandle {
    /// Start the service on the current runtime.
    /// The orchestrator is reset to its default scenario before the first tick.
    pub fn spawn(orchestrator: Orchestrator, settings: BroadcastSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Service {
            orchestrator,
            subscribers: Subscribers::new(),
            settings,
        };
        tokio::spawn(service.run(rx));
        Self { tx }
    }

    /// Register a new subscriber; it receives the current state right away
    pub async fn subscribe(&self) -> Option<Subscription> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Subscribe { reply }).ok()?;
        rx.await.ok()
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        let _ = self.tx.send(Command::Unsubscribe(id));
    }

    /// Forward one raw text message from a client; decoding happens in the service
    pub fn submit_text(&self, text: impl Into<String>) {
        let _ = self.tx.send(Command::Text(text.into()));
    }

    pub fn submit(&self, message: ControlMessage) {
        let _ = self.tx.send(Command::Message(message));
    }

    pub async fn state(&self) -> Option<StateMessage> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::State { reply }).ok()?;
        rx.await.ok()
    }

    /// Stop the service and release the active solver.
    /// Device teardown failures are returned.
    pub async fn shutdown(&self) -> Result<(), DeviceError> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown { reply }).is_err() {
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }
}

struct Service {
    orchestrator: Orchestrator,
    subscribers: Subscribers,
    settings: BroadcastSettings,
}

impl Service {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        self.orchestrator.reset().await;

        let mut cadence = self.cadence();
        let mut next_tick = self.schedule(Instant::now());
        let mut next_state = Instant::now() + STATE_INTERVAL;

        let reply = loop {
            let running = !self.orchestrator.is_paused();
            let tick = async move {
                match next_tick {
                    Some(at) => sleep_until(at).await,
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                command = rx.recv() => {
                    let Some(command) = command else { break None };
                    if let Command::Shutdown { reply } = command {
                        break Some(reply);
                    }
                    self.handle(command).await;

                    // play, pause or a new speed restart the cadence from now
                    if self.cadence() != cadence {
                        cadence = self.cadence();
                        next_tick = self.schedule(Instant::now());
                    }
                }
                _ = tick => {
                    self.tick().await;
                    next_tick = self.schedule(Instant::now());
                }
                _ = sleep_until(next_state), if running => {
                    self.broadcast_state();
                    next_state = Instant::now() + STATE_INTERVAL;
                }
            }
        };

        let result = self.orchestrator.shutdown().await;
        if let Err(e) = &result {
            warn!(error = %e, "simulation shutdown failed");
        }
        info!("simulation service stopped");
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    fn cadence(&self) -> (bool, u64) {
        (self.orchestrator.is_paused(), self.orchestrator.speed().to_bits())
    }

    /// Next cadence deadline, `None` while paused or at speed 0
    fn schedule(&self, now: Instant) -> Option<Instant> {
        let speed = self.orchestrator.speed();
        if self.orchestrator.is_paused() || speed <= 0.0 {
            return None;
        }
        let interval = self.settings.tick_interval.as_secs_f64() / speed;
        Duration::try_from_secs_f64(interval).ok().map(|d| now + d)
    }

    /// One cadence tick: step, then send the resulting snapshot
    async fn tick(&mut self) {
        if self.orchestrator.step().await {
            self.broadcast_snapshot().await;
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Subscribe { reply } => {
                let subscription = self.subscribers.add(self.settings.subscriber_buffer);
                let id = subscription.id;
                if reply.send(subscription).is_ok() {
                    if let Some(frame) = self.state_frame() {
                        self.subscribers.send_to(id, frame);
                    }
                    info!(subscriber = id.0, total = self.subscribers.len(), "subscriber connected");
                } else {
                    self.subscribers.remove(id);
                }
            }
            Command::Unsubscribe(id) => {
                self.subscribers.remove(id);
                info!(subscriber = id.0, total = self.subscribers.len(), "subscriber disconnected");
            }
            Command::Text(text) => match messages::decode(&text) {
                Ok(message) => self.apply(message).await,
                Err(e) => warn!(error = %e, "ignoring control message"),
            },
            Command::Message(message) => self.apply(message).await,
            Command::State { reply } => {
                let _ = reply.send(self.orchestrator.state_message());
            }
            // handled by the loop
            Command::Shutdown { .. } => {}
        }
    }

    async fn apply(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Init(init) => {
                self.orchestrator.init(init.mode, init.body_count, init.scenario).await;
            }
            ControlMessage::Control(command) => match command {
                ControlCommand::Play => self.orchestrator.play(),
                ControlCommand::Pause => self.orchestrator.pause(),
                ControlCommand::Step => {
                    // out of band, regardless of pause
                    if self.orchestrator.step().await {
                        self.broadcast_snapshot().await;
                    }
                }
                ControlCommand::Reset => {
                    self.orchestrator.reset().await;
                }
                ControlCommand::Speed { speed } => self.orchestrator.set_speed(speed),
            },
            ControlMessage::Params(update) => self.orchestrator.set_params(&update),
            ControlMessage::AddBodies(request) => self.orchestrator.inject_bodies(&request).await,
            ControlMessage::Unknown => {
                debug!("ignoring control message of unknown type");
                return;
            }
        }
        self.broadcast_state();
    }

    async fn broadcast_snapshot(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }
        if let Some(frame) = self.orchestrator.snapshot().await {
            self.subscribers.broadcast(&Frame::Snapshot(frame.into()));
        }
    }

    fn broadcast_state(&mut self) {
        if let Some(frame) = self.state_frame() {
            self.subscribers.broadcast(&frame);
        }
    }

    fn state_frame(&mut self) -> Option<Frame> {
        match self.orchestrator.state_message().to_json() {
            Ok(json) => Some(Frame::State(json.into())),
            Err(e) => {
                warn!(error = %e, "state message encoding failed");
                None
            }
        }
    }
}
