//! Per-agent runtime envelopes.
//!
//! A context is split along its ownership boundary:
//! - [`ContextShared`]: the work queue every other thread touches — one
//!   mutex, one condition variable, the coalesced game packet, the latest
//!   prediction, the inbound comm queue, and the quit flag.
//! - [`ContextDriver`]: owned by exactly one thread at a time — the worker
//!   thread for ordinary contexts, the I/O thread for the primary context —
//!   and the only place agent callbacks run. No library lock is held across
//!   a callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use botwire_core::event::Event;
use botwire_core::message::Message;

use crate::agent::{Agent, IndexSet};
use crate::schema::{
    BallPrediction, FieldInfo, GamePacket, MatchComm, MatchConfiguration, PlayerInput,
    RemoveRenderGroup, RenderGroup,
};
use crate::transport::Connection;

#[derive(Default)]
struct Work {
    /// Coalesced: a packet arriving before the previous one was consumed
    /// overwrites it.
    game_packet: Message,
    /// Latest-wins, snapshot by handle at tick start. Never wakes the
    /// worker on its own.
    ball_prediction: Message,
    /// FIFO inbound comms, delivered before the tick's update.
    match_comms: Vec<Message>,
}

/// The cross-thread face of one agent context.
pub(crate) struct ContextShared {
    pub indices: IndexSet,
    pub team: u32,
    work: Mutex<Work>,
    cv: Condvar,
    quit: AtomicBool,
    /// Signalled once the agent is constructed and its loadouts polled.
    pub ready: Event,
}

impl ContextShared {
    pub fn new(indices: IndexSet, team: u32) -> Arc<Self> {
        Arc::new(Self {
            indices,
            team,
            work: Mutex::new(Work::default()),
            cv: Condvar::new(),
            quit: AtomicBool::new(false),
            ready: Event::new(),
        })
    }

    pub fn set_game_packet(&self, message: Message, notify: bool) {
        {
            let mut work = self.work.lock().expect("context mutex");
            work.game_packet = message;
        }
        if notify {
            self.cv.notify_one();
        }
    }

    pub fn set_ball_prediction(&self, message: Message) {
        let mut work = self.work.lock().expect("context mutex");
        work.ball_prediction = message;
    }

    /// Queue an inbound comm, applying the self/team filters. Returns
    /// whether the comm was accepted.
    pub fn add_match_comm(&self, message: Message, comm: &MatchComm, notify: bool) -> bool {
        // no self-delivery
        if self.indices.contains(&comm.index) {
            return false;
        }
        // team-only stays on the sender's team
        if comm.team_only && comm.team != self.team {
            return false;
        }

        {
            let mut work = self.work.lock().expect("context mutex");
            work.match_comms.push(message);
        }
        if notify {
            self.cv.notify_one();
        }
        true
    }

    pub fn terminate(&self) {
        self.quit.store(true, Ordering::Release);
        self.cv.notify_one();
    }

    fn quitting(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }
}

/// The contexts currently live in one manager, primary first.
///
/// Drivers consult it to loop outbound comms back to sibling contexts; the
/// manager swaps it wholesale on spawn and restart.
#[derive(Default)]
pub(crate) struct ContextRegistry {
    entries: RwLock<Vec<Arc<ContextShared>>>,
}

impl ContextRegistry {
    pub fn snapshot(&self) -> Vec<Arc<ContextShared>> {
        self.entries.read().expect("registry lock").clone()
    }

    pub fn replace(&self, entries: Vec<Arc<ContextShared>>) {
        *self.entries.write().expect("registry lock") = entries;
    }
}

/// Owns the agent and runs its callbacks. Exactly one thread drives it.
pub(crate) struct ContextDriver {
    shared: Arc<ContextShared>,
    registry: Arc<ContextRegistry>,
    conn: Arc<Connection>,
    agent: Box<dyn Agent>,
    field_info: Arc<FieldInfo>,
    match_config: Arc<MatchConfiguration>,
    /// Reused every tick; only the index and controller state change.
    input: PlayerInput,
    /// Swap target for the inbound comm queue.
    comms_work: Vec<Message>,
}

impl ContextDriver {
    pub fn new(
        shared: Arc<ContextShared>,
        registry: Arc<ContextRegistry>,
        conn: Arc<Connection>,
        agent: Box<dyn Agent>,
        field_info: Arc<FieldInfo>,
        match_config: Arc<MatchConfiguration>,
    ) -> Self {
        Self {
            shared,
            registry,
            conn,
            agent,
            field_info,
            match_config,
            input: PlayerInput::default(),
            comms_work: Vec::with_capacity(128),
        }
    }

    /// One pass of the service loop. Returns whether any work was taken.
    pub fn loop_once(&mut self) -> bool {
        let (packet, prediction) = {
            let mut work = self.shared.work.lock().expect("context mutex");
            if work.match_comms.is_empty() && !work.game_packet.is_valid() {
                return false;
            }
            std::mem::swap(&mut work.match_comms, &mut self.comms_work);
            (
                std::mem::take(&mut work.game_packet),
                work.ball_prediction.clone(),
            )
        };

        // comms first, in arrival order
        for message in self.comms_work.drain(..) {
            match message.payload::<MatchComm>() {
                Ok(comm) => self.agent.match_comm(&comm),
                Err(err) => warn!(%err, "dropping comm"),
            }
        }

        if packet.is_valid() {
            self.run_tick(&packet, &prediction);
        }

        self.flush_outbox();
        true
    }

    fn run_tick(&mut self, packet: &Message, prediction: &Message) {
        let game_packet: GamePacket = match packet.payload() {
            Ok(game_packet) => game_packet,
            Err(err) => {
                warn!(%err, "dropping game packet");
                return;
            }
        };
        let ball_prediction: Option<BallPrediction> = prediction
            .is_valid()
            .then(|| prediction.payload().ok())
            .flatten();

        self.agent.update(
            &game_packet,
            ball_prediction.as_ref(),
            &self.field_info,
            &self.match_config,
        );

        for &index in &self.shared.indices {
            if game_packet.players.len() <= index as usize {
                continue;
            }
            self.input.player_index = index;
            self.input.controller_state = self.agent.output(index);
            self.conn.send(&self.input);
        }
    }

    /// Drain the agent's queued outputs, honoring the match toggles.
    fn flush_outbox(&mut self) {
        if let Some(comms) = self.agent.take_match_comms() {
            for comm in comms {
                debug_assert!(self.shared.indices.contains(&comm.index));
                debug_assert_eq!(comm.team, self.shared.team);
                self.send_match_comm(&comm);
            }
        }

        if let Some(groups) = self.agent.take_render_messages() {
            if self.match_config.enable_rendering {
                for (id, render_messages) in groups {
                    if render_messages.is_empty() {
                        // empty group indicates remove
                        self.conn.send(&RemoveRenderGroup { id });
                    } else {
                        self.conn.send(&RenderGroup {
                            id,
                            render_messages,
                        });
                    }
                }
            }
        }

        if let Some(state) = self.agent.take_desired_game_state() {
            if self.match_config.enable_state_setting {
                self.conn.send(&state);
            }
        }
    }

    /// Write an outbound comm and loop it back to sibling contexts.
    fn send_match_comm(&self, comm: &MatchComm) {
        let Some(message) = self.conn.encode_payload(comm) else {
            return;
        };
        self.conn.enqueue(message.clone());

        let peers = self.registry.snapshot();
        if peers.len() <= 1 {
            return;
        }

        let mut primary_has_work = false;
        for (position, peer) in peers.iter().enumerate() {
            if Arc::ptr_eq(peer, &self.shared) {
                continue;
            }
            let delivered = peer.add_match_comm(message.clone(), comm, position != 0);
            if delivered && position == 0 {
                primary_has_work = true;
            }
        }
        // the primary context has no thread of its own; run it on the I/O
        // thread via the wakeup completion
        if primary_has_work {
            self.conn.wake_agent();
        }
    }

    /// Worker-thread entry: wait for work or quit, loop.
    pub fn run(mut self) {
        self.shared.ready.signal();

        loop {
            if self.shared.quitting() {
                break;
            }
            if self.loop_once() {
                continue;
            }

            let work = self.shared.work.lock().expect("context mutex");
            let _work = self
                .shared
                .cv
                .wait_while(work, |work| {
                    !self.shared.quitting()
                        && work.match_comms.is_empty()
                        && !work.game_packet.is_valid()
                })
                .expect("context mutex");
        }
        debug!(indices = ?self.shared.indices, "context thread exit");
    }
}

/// One agent's runtime envelope: the shared queue plus, until a worker
/// thread takes it, the driver.
pub(crate) struct AgentContext {
    pub shared: Arc<ContextShared>,
    driver: Option<ContextDriver>,
    thread: Option<JoinHandle<()>>,
}

impl AgentContext {
    pub fn new(shared: Arc<ContextShared>, driver: ContextDriver) -> Self {
        Self {
            shared,
            driver: Some(driver),
            thread: None,
        }
    }

    /// Move the driver onto its own service thread.
    pub fn start_service(&mut self) {
        let driver = self.driver.take().expect("driver not yet started");
        let name = format!(
            "agent-{}",
            self.shared.indices.iter().min().copied().unwrap_or(0)
        );
        let thread = std::thread::Builder::new()
            .name(name)
            .spawn(move || driver.run())
            .expect("spawn context thread");
        self.thread = Some(thread);
    }

    /// Borrow the driver for an inline loop iteration (primary context).
    pub fn take_driver(&mut self) -> Option<ContextDriver> {
        self.driver.take()
    }

    pub fn put_driver(&mut self, driver: ContextDriver) {
        debug_assert!(self.driver.is_none());
        self.driver = Some(driver);
    }

    pub fn terminate(&self) {
        self.shared.terminate();
    }

    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("context thread panicked");
            }
        }
    }
}

impl Drop for AgentContext {
    fn drop(&mut self) {
        self.terminate();
        self.join();
    }
}
