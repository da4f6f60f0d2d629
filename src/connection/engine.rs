//! Connection engine
//!
//! Owns the poll loop for one transport. The loop runs as a tokio task that
//! wakes once per poll interval, fetches at most one packet, decodes it and
//! hands it to the matching callback. Outbound frames bypass the loop and go
//! straight to the transport, except for deferred sends which the loop
//! flushes one per idle tick.

use bytes::Bytes;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

use super::queue::{OutboundQueue, Priority};
use super::{
    BinaryCallback, CommandCallback, ConnectionConfig, ConnectionError, ConnectionEvent,
    ConnectionResult, ConnectionState,
};
use crate::protocol::{self, Acknowledgement, Frame};
use crate::transport::{SendResult, Transport};

/// Capacity of the event channel; events beyond it are dropped
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Connection statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Frames handed to the transport
    pub frames_sent: u64,
    /// Frames decoded and dispatched
    pub frames_received: u64,
    /// Bytes handed to the transport
    pub bytes_sent: u64,
    /// Bytes returned by the transport, valid or not
    pub bytes_received: u64,
    /// Packets discarded as malformed
    pub decode_errors: u64,
    /// Failed transport polls
    pub fetch_errors: u64,
    /// Callbacks that panicked
    pub callback_panics: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    decode_errors: AtomicU64,
    fetch_errors: AtomicU64,
    callback_panics: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the connection handle and its poll loop
struct Shared<T> {
    transport: Mutex<T>,
    max_packet_size: usize,
    on_command: CommandCallback,
    on_binary: BinaryCallback,
    queue: OutboundQueue,
    stats: StatsCounters,
    events: mpsc::Sender<ConnectionEvent>,
}

impl<T: Transport> Shared<T> {
    fn lock_transport(&self) -> MutexGuard<'_, T> {
        // A panic inside a transport call leaves the transport usable
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            tracing::trace!("Event channel full, dropping {:?}", event);
        }
    }

    fn send_raw(&self, frame: &[u8]) -> SendResult<()> {
        self.lock_transport().send(frame)?;
        StatsCounters::bump(&self.stats.frames_sent, 1);
        StatsCounters::bump(&self.stats.bytes_sent, frame.len() as u64);
        Ok(())
    }

    /// One iteration of the poll loop
    fn poll_step(&self) {
        // The guard is released before any callback runs
        let polled = self.lock_transport().poll();

        match polled {
            Ok(Some(packet)) => self.handle_packet(&packet),
            Ok(None) => self.flush_queued(),
            Err(e) => {
                StatsCounters::bump(&self.stats.fetch_errors, 1);
                tracing::warn!("Transport fetch failed: {}", e);
                self.emit(ConnectionEvent::FetchFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    fn handle_packet(&self, packet: &Bytes) {
        StatsCounters::bump(&self.stats.bytes_received, packet.len() as u64);

        let frame = match protocol::decode(packet) {
            Ok(frame) => frame,
            Err(e) => {
                StatsCounters::bump(&self.stats.decode_errors, 1);
                tracing::warn!("Discarding malformed {} byte frame: {}", packet.len(), e);
                self.emit(ConnectionEvent::DecodeFailed {
                    message: e.to_string(),
                });
                return;
            }
        };

        StatsCounters::bump(&self.stats.frames_received, 1);
        tracing::debug!("Received {:?}", frame);
        self.dispatch(&frame);
    }

    fn dispatch(&self, frame: &Frame) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match frame {
            Frame::Command { opcode, value } => (self.on_command)(*opcode, *value),
            Frame::Binary { payload } => (self.on_binary)(&payload[..]),
        }));

        if outcome.is_err() {
            StatsCounters::bump(&self.stats.callback_panics, 1);
            tracing::error!("Callback panicked while handling frame kind {:#04x}", frame.kind());
        }
    }

    /// Send at most one deferred frame; only called on idle ticks
    fn flush_queued(&self) {
        let Some(frame) = self.queue.pop() else {
            return;
        };

        match self.send_raw(&frame) {
            Ok(()) => tracing::debug!("Sent queued {} byte frame", frame.len()),
            Err(e) => {
                tracing::warn!("Dropping queued frame: {}", e);
                self.emit(ConnectionEvent::QueuedSendFailed {
                    message: e.to_string(),
                });
            }
        }
    }
}

async fn poll_loop<T: Transport>(
    shared: Arc<Shared<T>>,
    period: Duration,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!("Poll loop started ({:?} interval)", period);

    loop {
        tokio::select! {
            biased;

            // Resolves on an explicit signal or when the handle is dropped
            _ = shutdown_rx.recv() => break,

            _ = ticker.tick() => shared.poll_step(),
        }
    }

    tracing::info!("Poll loop stopped");
}

struct Worker {
    // Taken on the first shutdown request; the task handle stays until joined
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: JoinHandle<()>,
}

/// A running protocol connection over one transport
pub struct Connection<T: Transport> {
    id: Uuid,
    shared: Arc<Shared<T>>,
    acknowledgement: Acknowledgement,
    state: Mutex<ConnectionState>,
    worker: tokio::sync::Mutex<Option<Worker>>,
    event_rx: Option<mpsc::Receiver<ConnectionEvent>>,
}

impl<T: Transport> Connection<T> {
    /// Configure a connection and start its poll loop on the current runtime
    pub fn open(
        config: ConnectionConfig,
        mut transport: T,
        on_command: CommandCallback,
        on_binary: BinaryCallback,
    ) -> ConnectionResult<Self> {
        if config.poll_interval.is_zero() {
            return Err(ConnectionError::InvalidPollInterval);
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ConnectionError::NoRuntime)?;

        let max_packet_size = transport.max_packet_size();
        let ack = config.acknowledgement;
        if ack.is_empty() || ack.len() > max_packet_size {
            return Err(ConnectionError::InvalidAcknowledgement {
                len: ack.len(),
                max: max_packet_size,
            });
        }
        // Transports drop matching packets, so an ack must never look like a frame
        if let Ok(frame) = protocol::decode(ack.as_bytes()) {
            return Err(ConnectionError::AmbiguousAcknowledgement(frame));
        }
        transport.attach_acknowledgement(&ack);

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            transport: Mutex::new(transport),
            max_packet_size,
            on_command,
            on_binary,
            queue: OutboundQueue::default(),
            stats: StatsCounters::default(),
            events: event_tx,
        });

        // Queued ahead of anything the loop reports
        shared.emit(ConnectionEvent::Started);

        let id = Uuid::new_v4();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let span = tracing::info_span!("connection", id = %id);
        let task = runtime.spawn(
            poll_loop(shared.clone(), config.poll_interval, shutdown_rx).instrument(span),
        );

        let connection = Self {
            id,
            shared,
            acknowledgement: ack,
            state: Mutex::new(ConnectionState::Running),
            worker: tokio::sync::Mutex::new(Some(Worker {
                shutdown_tx: Some(shutdown_tx),
                task,
            })),
            event_rx: Some(event_rx),
        };

        tracing::info!(
            "Connection {} running (max packet {} bytes)",
            id,
            max_packet_size
        );

        Ok(connection)
    }

    /// Unique id, also attached to the poll loop's log span
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.state() == ConnectionState::Running
    }

    /// The acknowledgement payload this connection was configured with
    pub fn acknowledgement(&self) -> &Acknowledgement {
        &self.acknowledgement
    }

    /// Largest frame the transport accepts
    pub fn max_packet_size(&self) -> usize {
        self.shared.max_packet_size
    }

    /// Get connection statistics
    pub fn stats(&self) -> ConnectionStats {
        self.shared.stats.snapshot()
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.event_rx.take()
    }

    /// Run `f` with exclusive access to the transport
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.shared.lock_transport())
    }

    /// Encode and send a command frame right away
    pub fn send_command(&self, opcode: u8, value: f32) -> ConnectionResult<()> {
        self.send_frame(&Frame::command(opcode, value))
    }

    /// Encode and send a binary frame right away
    pub fn send_binary(&self, payload: impl Into<Bytes>) -> ConnectionResult<()> {
        self.send_frame(&Frame::binary(payload))
    }

    /// Encode and send any frame right away
    pub fn send_frame(&self, frame: &Frame) -> ConnectionResult<()> {
        self.ensure_running()?;
        let encoded = protocol::encode(frame, self.shared.max_packet_size)?;
        self.shared.send_raw(&encoded)?;
        tracing::debug!("Sent {:?}", frame);
        Ok(())
    }

    /// Queue a command frame for the poll loop to send on an idle tick
    pub fn enqueue_command(&self, opcode: u8, value: f32, priority: Priority) -> ConnectionResult<()> {
        self.enqueue_frame(&Frame::command(opcode, value), priority)
    }

    /// Queue a binary frame for the poll loop to send on an idle tick
    pub fn enqueue_binary(&self, payload: impl Into<Bytes>, priority: Priority) -> ConnectionResult<()> {
        self.enqueue_frame(&Frame::binary(payload), priority)
    }

    fn enqueue_frame(&self, frame: &Frame, priority: Priority) -> ConnectionResult<()> {
        self.ensure_running()?;
        let encoded = protocol::encode(frame, self.shared.max_packet_size)?;
        self.shared.queue.push(encoded, priority);
        Ok(())
    }

    /// Frames waiting in the deferred queue
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Stop the poll loop
    ///
    /// Waits for an iteration in progress to finish, so no callback runs
    /// once this returns. Calling it again is a no-op.
    ///
    /// Cancel safe: the worker stays registered until its task is joined, so
    /// a later call still waits for the loop if an earlier one was dropped.
    pub async fn stop(&self) {
        let mut worker = self.worker.lock().await;
        let Some(active) = worker.as_mut() else {
            return;
        };

        self.set_state(ConnectionState::Stopped);
        drop(active.shutdown_tx.take());

        let joined = (&mut active.task).await;
        *worker = None;
        if let Err(e) = joined {
            tracing::error!("Poll loop for connection {} ended abnormally: {}", self.id, e);
        }

        let dropped = self.shared.queue.clear();
        if dropped > 0 {
            tracing::debug!("Discarded {} queued frames on stop", dropped);
        }

        self.shared.emit(ConnectionEvent::Stopped);
        tracing::info!("Connection {} stopped", self.id);
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn ensure_running(&self) -> ConnectionResult<()> {
        match self.state() {
            ConnectionState::Running => Ok(()),
            _ => Err(ConnectionError::Stopped),
        }
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        // Closing the shutdown channel ends the loop at its next suspension point
        if let Some(worker) = self.worker.get_mut().as_mut() {
            drop(worker.shutdown_tx.take());
            tracing::debug!("Connection {} dropped without stop()", self.id);
        }
    }
}
