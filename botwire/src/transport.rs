//! Single-connection transport: one service thread driving a
//! completion-based I/O runtime.
//!
//! The service thread owns a single-threaded compio runtime (io_uring on
//! Linux, IOCP on Windows) and multiplexes everything on it: the read pump,
//! write submissions, agent wakeups, and quit. Other threads talk to it
//! through the writer queue and a wake channel; nothing else ever touches
//! the socket.
//!
//! Writer discipline: at most one vectored submission is in flight; the
//! enqueue that finds the queue drained arms the writer with a single wake,
//! and the submission task drains the queue to idle before parking itself.

use std::io;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncWrite};
use compio::net::TcpStream;
use flume::{Receiver, Sender};
use futures::FutureExt;
use tracing::{debug, error, trace, warn};

use botwire_core::codec::{self, Dialect, FrameReader, WriteQueue};
use botwire_core::endpoint::ServerEndpoint;
use botwire_core::error::{Error, Result};
use botwire_core::event::Event;
use botwire_core::message::{Kind, Message};
use botwire_core::pool::{BufferPools, EncodeBuffer, Pool};
use botwire_core::{config, tcp};

use crate::schema::OutboundPayload;

/// Receives everything the service thread dequeues.
///
/// `on_message` runs on the service thread for every inbound frame, in
/// arrival order; `on_agent_wake` runs there when another thread requested
/// primary-context work.
pub trait Handler: Send + Sync + 'static {
    /// Called once with the connection handle before the first read is
    /// issued.
    fn attached(&self, connection: &Arc<Connection>) {
        let _ = connection;
    }

    fn on_message(&self, message: Message);

    fn on_agent_wake(&self) {}
}

/// Handler that discards everything; the match-launcher use case.
pub struct NullHandler;

impl Handler for NullHandler {
    fn on_message(&self, _message: Message) {}
}

/// Connection lifecycle. Only `Running` accepts enqueues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Idle = 0,
    Connected = 1,
    Running = 2,
    Draining = 3,
    Closed = 4,
}

impl State {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connected,
            2 => Self::Running,
            3 => Self::Draining,
            4 => Self::Closed,
            _ => Self::Idle,
        }
    }
}

/// Events injected into the service thread's completion loop.
enum Wake {
    WriteQueue,
    Agent,
    Quit,
}

struct Shared {
    state: AtomicU8,
    quit: AtomicBool,
    dialect: Dialect,
    pools: BufferPools,
    builders: Arc<Pool<EncodeBuffer>>,
    writer: Mutex<WriteQueue>,
    writer_idle: Condvar,
    wake_tx: Sender<Wake>,
}

impl Shared {
    fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: State) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Cooperative teardown: release idle waiters, flag quit, inject the
    /// quit completion.
    fn request_quit(&self) {
        {
            let mut writer = self.writer.lock().expect("writer mutex");
            writer.set_idle(true);
        }
        self.writer_idle.notify_all();

        if self.state() == State::Running {
            self.set_state(State::Draining);
        }
        self.quit.store(true, Ordering::Release);
        let _ = self.wake_tx.send(Wake::Quit);
    }
}

/// A live connection to the match server.
pub struct Connection {
    shared: Arc<Shared>,
    service: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Resolve, connect, configure the socket, and start the service
    /// thread. Any setup failure is returned here and no service thread
    /// keeps running.
    pub fn connect(endpoint: &ServerEndpoint, handler: Arc<dyn Handler>) -> Result<Arc<Self>> {
        let addr = endpoint.resolve().map_err(Error::setup)?;
        debug!(%endpoint, %addr, "connecting");

        let (wake_tx, wake_rx) = flume::unbounded();
        let shared = Arc::new(Shared {
            state: AtomicU8::new(State::Idle as u8),
            quit: AtomicBool::new(false),
            dialect: Dialect::Tagged,
            pools: BufferPools::new(),
            builders: Pool::create("builder"),
            writer: Mutex::new(WriteQueue::new()),
            writer_idle: Condvar::new(),
            wake_tx,
        });

        // Preallocate the transport's working set. The buffers are tagged
        // and marked preferred, so acquire keeps recycling this same
        // storage on the hot path.
        let preallocated: Vec<_> = (0..config::PREALLOCATED_BUFFERS)
            .map(|tag| {
                let buffer = shared.pools.acquire();
                buffer.set_tag(tag as u32);
                buffer.set_preferred(true);
                buffer
            })
            .collect();
        drop(preallocated);

        let (setup_tx, setup_rx) = std::sync::mpsc::channel::<Result<()>>();
        let go = Arc::new(Event::new());

        let thread = {
            let shared = Arc::clone(&shared);
            let handler = Arc::clone(&handler);
            let go = Arc::clone(&go);
            std::thread::Builder::new()
                .name("botwire-io".to_owned())
                .spawn(move || service_thread(addr, shared, handler, wake_rx, setup_tx, &go))
                .map_err(Error::setup)?
        };

        match setup_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::setup(io::Error::other(
                    "service thread exited during connect",
                )));
            }
        }

        let connection = Arc::new(Self {
            shared,
            service: Mutex::new(Some(thread)),
        });

        // Attach before the first read so no inbound frame races the
        // handler's view of the connection.
        handler.attached(&connection);
        connection.shared.set_state(State::Running);
        go.signal();

        Ok(connection)
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.shared.state()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.state() == State::Running
    }

    /// Queue an already-encoded frame for writing.
    ///
    /// Frames are drained in insertion order. Enqueues outside `Running`
    /// are dropped silently.
    pub fn enqueue(&self, message: Message) {
        if !message.is_valid() {
            return;
        }
        if self.shared.state() != State::Running {
            trace!("enqueue dropped: connection not running");
            return;
        }

        let needs_wake = {
            let mut writer = self.shared.writer.lock().expect("writer mutex");
            writer.push(message)
        };
        if needs_wake {
            let _ = self.shared.wake_tx.send(Wake::WriteQueue);
        }
    }

    /// Encode `payload` into a pooled frame without enqueueing it.
    ///
    /// An oversize payload is warned about and yields `None`; the
    /// connection stays healthy.
    pub(crate) fn encode_payload<P: OutboundPayload>(&self, payload: &P) -> Option<Message> {
        let mut builder = self.shared.builders.acquire();
        if let Err(err) = rmp_serde::encode::write(builder.get_mut().as_mut_vec(), payload) {
            warn!(%err, "payload serialization failed");
            return None;
        }
        codec::encode(
            &self.shared.pools,
            self.shared.dialect,
            P::KIND,
            builder.as_slice(),
        )
        .ok()
    }

    /// Encode and enqueue one typed payload.
    pub fn send<P: OutboundPayload>(&self, payload: &P) {
        if let Some(message) = self.encode_payload(payload) {
            self.enqueue(message);
        }
    }

    /// Enqueue the disconnect signal (an empty `None` frame).
    pub fn send_disconnect(&self) {
        if let Ok(message) = codec::encode(
            &self.shared.pools,
            self.shared.dialect,
            Kind::None,
            &[],
        ) {
            self.enqueue(message);
        }
    }

    /// Ask the service thread to run the primary context once.
    pub(crate) fn wake_agent(&self) {
        let _ = self.shared.wake_tx.send(Wake::Agent);
    }

    /// Block until the writer queue is empty and no submission is in
    /// flight.
    pub fn wait_for_writer_idle(&self) {
        let mut writer = self.shared.writer.lock().expect("writer mutex");
        while !writer.is_idle() {
            writer = self
                .shared
                .writer_idle
                .wait(writer)
                .expect("writer mutex");
        }
    }

    /// Request cooperative teardown. Safe to call from any thread, any
    /// number of times.
    pub fn terminate(&self) {
        self.shared.request_quit();
    }

    /// Join the service thread and release queued frames.
    pub fn join(&self) {
        let thread = self.service.lock().expect("service handle").take();
        if let Some(thread) = thread {
            let _ = thread.join();
        }
        self.shared
            .writer
            .lock()
            .expect("writer mutex")
            .clear();
        self.shared.set_state(State::Closed);
    }

    /// Per-shard `(watermark, free length)` of the buffer pools. At
    /// quiescence every pair is equal.
    #[must_use]
    pub fn pool_stats(&self) -> Vec<(usize, usize)> {
        self.shared.pools.stats()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.terminate();
        self.join();
    }
}

fn service_thread(
    addr: std::net::SocketAddr,
    shared: Arc<Shared>,
    handler: Arc<dyn Handler>,
    wake_rx: Receiver<Wake>,
    setup_tx: std::sync::mpsc::Sender<Result<()>>,
    go: &Event,
) {
    let runtime = match compio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = setup_tx.send(Err(Error::setup(err)));
            return;
        }
    };

    let shared_for_quit = Arc::clone(&shared);
    runtime.block_on(async move {
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(err) => {
                let _ = setup_tx.send(Err(Error::setup(err)));
                return;
            }
        };
        if let Err(err) = tcp::configure_stream(&stream) {
            let _ = setup_tx.send(Err(Error::setup(err)));
            return;
        }

        shared.set_state(State::Connected);
        let _ = setup_tx.send(Ok(()));
        go.wait();

        let stream = Rc::new(stream);
        let reader = read_pump(
            Rc::clone(&stream),
            Arc::clone(&shared),
            Arc::clone(&handler),
        )
        .fuse();
        let control = control_pump(stream, Arc::clone(&shared), handler, wake_rx).fuse();
        futures::pin_mut!(reader, control);

        // Either pump finishing (peer close, I/O error, quit) cancels the
        // other's in-flight operation.
        futures::select! {
            _ = reader => {},
            _ = control => {},
        }
    });

    shared_for_quit.request_quit();
    debug!("service thread exit");
}

/// One outstanding read at a time; frames dispatched inline, in order.
async fn read_pump(stream: Rc<TcpStream>, shared: Arc<Shared>, handler: Arc<dyn Handler>) {
    let mut reader = FrameReader::new(shared.dialect, &shared.pools);

    while !shared.quit.load(Ordering::Acquire) {
        let window = reader.read_window();
        let BufResult(result, window) = (&*stream).read(window).await;
        drop(window);

        match result {
            Ok(0) => {
                debug!("peer closed connection");
                break;
            }
            Ok(count) => {
                reader.on_read(count, &shared.pools, &mut |message| {
                    handler.on_message(message);
                });
            }
            Err(err) => {
                if !shared.quit.load(Ordering::Acquire) {
                    error!(%err, "read failed");
                }
                break;
            }
        }
    }
}

/// Consumes injected completions: write-queue arms a submission task, agent
/// wakes run the primary context, quit re-raises and exits.
async fn control_pump(
    stream: Rc<TcpStream>,
    shared: Arc<Shared>,
    handler: Arc<dyn Handler>,
    wake_rx: Receiver<Wake>,
) {
    while let Ok(wake) = wake_rx.recv_async().await {
        match wake {
            Wake::WriteQueue => {
                let stream = Rc::clone(&stream);
                let shared = Arc::clone(&shared);
                compio::runtime::spawn(drain_writes(stream, shared)).detach();
            }
            Wake::Agent => handler.on_agent_wake(),
            Wake::Quit => {
                // chain so a sibling consumer of the same queue also wakes
                let _ = shared.wake_tx.send(Wake::Quit);
                break;
            }
        }
        if shared.quit.load(Ordering::Acquire) {
            break;
        }
    }
}

/// Drains the writer queue: one vectored submission at a time until empty,
/// then flags idle and parks (the next enqueue re-arms it).
async fn drain_writes(stream: Rc<TcpStream>, shared: Arc<Shared>) {
    loop {
        let slices = {
            let mut writer = shared.writer.lock().expect("writer mutex");
            match writer.begin_submission() {
                Some(slices) => slices,
                None => return,
            }
        };

        let BufResult(result, _slices) = (&*stream).write_vectored(slices).await;
        match result {
            Ok(count) => {
                let drained = {
                    let mut writer = shared.writer.lock().expect("writer mutex");
                    writer.complete_submission(count);
                    let drained = writer.is_drained();
                    if drained {
                        writer.set_idle(true);
                    }
                    drained
                };
                if drained {
                    shared.writer_idle.notify_all();
                    return;
                }
            }
            Err(err) => {
                error!(%err, "write failed");
                shared.request_quit();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips() {
        for state in [
            State::Idle,
            State::Connected,
            State::Running,
            State::Draining,
            State::Closed,
        ] {
            assert_eq!(State::from_u8(state as u8), state);
        }
    }
}
