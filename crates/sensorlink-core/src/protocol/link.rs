//! Serial link lifecycle
//!
//! Owns the port handle, runs the background reader and dispatches parsed
//! samples to a single registered handler per event.
//!
//! Two threads run per connection:
//!
//! - the **reader** polls the channel, frames and parses lines, and pushes
//!   samples into a bounded queue. It never blocks on the queue: when the
//!   queue is full the sample is dropped and counted.
//! - the **dispatcher** drains the queue and invokes the data handler, so a
//!   slow subscriber delays delivery but never stalls the port.
//!
//! `disconnect` raises an atomic stop flag that the reader checks before and
//! after every read, and the dispatcher checks before every delivery. A read
//! already in flight when the flag is raised may still complete; its bytes
//! are dropped rather than dispatched.
//!
//! The link reports `Connected` until teardown has joined both threads and
//! closed the port, so a new connect cannot start while the old session is
//! still alive.

use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::line::{self, Line, LineBuffer};
use super::{
    open_port, ConnectError, ConnectionState, LinkConfig, LinkStats, ReadFault, SensorChannel,
    SerialChannel,
};
use crate::sample::Sample;

type SampleHandler = Arc<dyn Fn(Sample) + Send + Sync>;
type TextHandler = Arc<dyn Fn(&str) + Send + Sync>;
type NotifyHandler = Arc<dyn Fn() + Send + Sync>;
type SharedWriter = Arc<Mutex<Box<dyn SensorChannel>>>;

/// One slot per event; registering again replaces the previous handler
#[derive(Default)]
struct Handlers {
    data_received: Option<SampleHandler>,
    connect_success: Option<TextHandler>,
    connect_error: Option<TextHandler>,
    disconnected: Option<NotifyHandler>,
}

#[derive(Default)]
struct Counters {
    lines_received: AtomicU64,
    samples_parsed: AtomicU64,
    lines_rejected: AtomicU64,
    error_lines: AtomicU64,
    read_faults: AtomicU64,
    samples_dropped: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        for c in [
            &self.lines_received,
            &self.samples_parsed,
            &self.lines_rejected,
            &self.error_lines,
            &self.read_faults,
            &self.samples_dropped,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> LinkStats {
        LinkStats {
            lines_received: self.lines_received.load(Ordering::Relaxed),
            samples_parsed: self.samples_parsed.load(Ordering::Relaxed),
            lines_rejected: self.lines_rejected.load(Ordering::Relaxed),
            error_lines: self.error_lines.load(Ordering::Relaxed),
            read_faults: self.read_faults.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Live connection resources
struct Session {
    port_name: String,
    /// Write half; dropping it (together with the reader's clone) closes the port
    writer: SharedWriter,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

struct Inner {
    state: ConnectionState,
    port_name: Option<String>,
    session: Option<Session>,
    /// Set while `disconnect` tears the session down outside the lock
    closing: bool,
}

/// Serial connection to the sensor board
pub struct SerialLink {
    config: LinkConfig,
    inner: Mutex<Inner>,
    handlers: Arc<RwLock<Handlers>>,
    counters: Arc<Counters>,
}

impl SerialLink {
    /// Create a new link (not yet connected)
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                port_name: None,
                session: None,
                closing: false,
            }),
            handlers: Arc::new(RwLock::new(Handlers::default())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Link configuration
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers(&self) -> RwLockReadGuard<'_, Handlers> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers_mut(&self) -> RwLockWriteGuard<'_, Handlers> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handler for every parsed sample. Runs on the dispatch thread.
    pub fn on_data_received<F>(&self, handler: F)
    where
        F: Fn(Sample) + Send + Sync + 'static,
    {
        self.handlers_mut().data_received = Some(Arc::new(handler));
    }

    /// Handler called with the port name once the reader is running
    pub fn on_connect_success<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.handlers_mut().connect_success = Some(Arc::new(handler));
    }

    /// Handler called with an error message when a port cannot be opened
    pub fn on_connect_error<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.handlers_mut().connect_error = Some(Arc::new(handler));
    }

    /// Handler called after an explicit disconnect closed the port
    pub fn on_disconnected<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.handlers_mut().disconnected = Some(Arc::new(handler));
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// True while the port handle is open and not being closed
    pub fn is_connected(&self) -> bool {
        let inner = self.lock();
        inner.state == ConnectionState::Connected && inner.session.is_some()
    }

    /// Name of the connected (or connecting) port
    pub fn port_name(&self) -> Option<String> {
        self.lock().port_name.clone()
    }

    /// Ingestion counters since the last connect
    pub fn stats(&self) -> LinkStats {
        self.counters.snapshot()
    }

    /// Open a serial port and start reading
    ///
    /// Blocks for the settle delay after the port opens. Fails with
    /// [`ConnectError::AlreadyConnected`] if a connection is active or being
    /// established; there is no automatic retry.
    pub fn connect(&self, port_name: &str) -> Result<(), ConnectError> {
        self.begin_connect(port_name)?;

        let port = match open_port(port_name, &self.config) {
            Ok(port) => port,
            Err(e) => {
                self.fail_connect(&e);
                return Err(e);
            }
        };

        self.finish_connect(port_name, Box::new(SerialChannel::new(port)))
    }

    /// Attach an already-open channel (demo board, capture replay) and start reading
    pub fn connect_channel(
        &self,
        port_name: &str,
        channel: Box<dyn SensorChannel>,
    ) -> Result<(), ConnectError> {
        self.begin_connect(port_name)?;
        self.finish_connect(port_name, channel)
    }

    fn begin_connect(&self, port_name: &str) -> Result<(), ConnectError> {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Disconnected {
            let current = inner.port_name.clone().unwrap_or_default();
            warn!("connect to {port_name} rejected: already attached to {current}");
            return Err(ConnectError::AlreadyConnected(current));
        }
        inner.state = ConnectionState::Connecting;
        inner.port_name = Some(port_name.to_string());
        info!("Connecting to {port_name}");
        Ok(())
    }

    fn fail_connect(&self, err: &ConnectError) {
        {
            let mut inner = self.lock();
            inner.state = ConnectionState::Disconnected;
            inner.port_name = None;
        }
        warn!("Connection failed: {err}");
        let handler = self.handlers().connect_error.clone();
        if let Some(handler) = handler {
            handler(&err.to_string());
        }
    }

    fn finish_connect(
        &self,
        port_name: &str,
        mut channel: Box<dyn SensorChannel>,
    ) -> Result<(), ConnectError> {
        if !self.config.settle_delay.is_zero() {
            debug!("waiting {:?} for the board to settle", self.config.settle_delay);
            thread::sleep(self.config.settle_delay);
        }

        // Boot banner and half-lines printed during reset
        if let Err(e) = channel.clear_input_buffer() {
            debug!("could not clear input buffer: {e} (continuing)");
        }

        let reader_channel = match channel.try_clone() {
            Ok(c) => c,
            Err(e) => {
                let err = ConnectError::from(e);
                self.fail_connect(&err);
                return Err(err);
            }
        };

        self.counters.reset();
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::sync_channel(self.config.queue_capacity.max(1));

        let dispatcher = {
            let handlers = Arc::clone(&self.handlers);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("sensorlink-dispatch".into())
                .spawn(move || dispatch_loop(rx, handlers, stop))
        };
        let dispatcher = match dispatcher {
            Ok(h) => h,
            Err(e) => {
                let err = ConnectError::from(e);
                self.fail_connect(&err);
                return Err(err);
            }
        };

        let reader = {
            let stop = Arc::clone(&stop);
            let counters = Arc::clone(&self.counters);
            let poll_interval = self.config.poll_interval;
            thread::Builder::new()
                .name("sensorlink-reader".into())
                .spawn(move || reader_loop(reader_channel, stop, tx, counters, poll_interval))
        };
        let reader = match reader {
            Ok(h) => h,
            Err(e) => {
                // tx was moved into the failed closure and dropped, so the dispatcher exits
                let _ = dispatcher.join();
                let err = ConnectError::from(e);
                self.fail_connect(&err);
                return Err(err);
            }
        };

        {
            let mut inner = self.lock();
            inner.session = Some(Session {
                port_name: port_name.to_string(),
                writer: Arc::new(Mutex::new(channel)),
                stop,
                reader: Some(reader),
                dispatcher: Some(dispatcher),
            });
            inner.state = ConnectionState::Connected;
        }
        info!("Connected to {port_name}");

        let handler = self.handlers().connect_success.clone();
        if let Some(handler) = handler {
            handler(port_name);
        }
        Ok(())
    }

    /// Stop the reader and close the port. No-op when not connected or
    /// when another call is already closing it.
    pub fn disconnect(&self) {
        let session = {
            let mut inner = self.lock();
            if inner.state != ConnectionState::Connected || inner.closing {
                return;
            }
            inner.closing = true;
            inner.session.take()
        };
        let Some(mut session) = session else {
            self.lock().closing = false;
            return;
        };

        session.stop.store(true, Ordering::Release);
        if let Some(reader) = session.reader.take() {
            if reader.join().is_err() {
                error!("reader thread panicked");
            }
        }
        // The stop flag and the dropped sender both end the dispatcher.
        // Skip the join when a data handler is the one disconnecting.
        if let Some(dispatcher) = session.dispatcher.take() {
            if dispatcher.thread().id() != thread::current().id() && dispatcher.join().is_err() {
                error!("dispatch thread panicked");
            }
        }

        let port_name = session.port_name.clone();
        drop(session);
        {
            let mut inner = self.lock();
            inner.state = ConnectionState::Disconnected;
            inner.port_name = None;
            inner.closing = false;
        }
        info!("Disconnected from {port_name}");

        let handler = self.handlers().disconnected.clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    /// Write raw bytes to the board
    ///
    /// Returns false if not connected or if the write fails.
    pub fn send_command(&self, payload: &[u8]) -> bool {
        let (writer, port_name) = {
            let inner = self.lock();
            match inner.session.as_ref() {
                Some(session) => (Arc::clone(&session.writer), session.port_name.clone()),
                None => {
                    debug!("send_command: not connected, {} byte(s) not sent", payload.len());
                    return false;
                }
            }
        };

        // Write outside the state lock
        let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
        match writer.write_all(payload).and_then(|_| writer.flush()) {
            Ok(()) => true,
            Err(e) => {
                warn!("write to {port_name} failed: {e}");
                false
            }
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Read whatever is waiting, up to `buf.len()` bytes. `Ok(0)` means nothing to read.
fn read_available(channel: &mut dyn SensorChannel, buf: &mut [u8]) -> Result<usize, ReadFault> {
    let available = channel.bytes_to_read()? as usize;
    if available == 0 {
        return Ok(0);
    }
    let want = available.min(buf.len());
    match channel.read(&mut buf[..want]) {
        Ok(n) => Ok(n),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(0)
        }
        Err(e) => Err(e.into()),
    }
}

fn reader_loop(
    mut channel: Box<dyn SensorChannel>,
    stop: Arc<AtomicBool>,
    tx: SyncSender<Sample>,
    counters: Arc<Counters>,
    poll_interval: Duration,
) {
    let mut lines = LineBuffer::new();
    let mut buf = [0u8; 512];
    let mut consecutive_faults: u32 = 0;

    debug!("reader started");
    while !stop.load(Ordering::Acquire) {
        let n = match read_available(channel.as_mut(), &mut buf) {
            Ok(0) => {
                thread::sleep(poll_interval);
                continue;
            }
            Ok(n) => n,
            Err(fault) => {
                Counters::bump(&counters.read_faults);
                if consecutive_faults == 0 {
                    warn!("{fault}");
                } else {
                    debug!("{fault} ({} in a row)", consecutive_faults + 1);
                }
                consecutive_faults = consecutive_faults.saturating_add(1);
                thread::sleep(poll_interval);
                continue;
            }
        };
        if consecutive_faults > 0 {
            info!("reads recovered after {consecutive_faults} fault(s)");
            consecutive_faults = 0;
        }

        // Disconnect raced with this read; drop what it returned
        if stop.load(Ordering::Acquire) {
            break;
        }

        for raw in lines.push(&buf[..n]) {
            let raw = match raw {
                Ok(raw) => raw,
                Err(fault) => {
                    Counters::bump(&counters.read_faults);
                    debug!("{fault}");
                    continue;
                }
            };
            Counters::bump(&counters.lines_received);
            match line::classify(&raw) {
                Line::Sample(sample) => {
                    Counters::bump(&counters.samples_parsed);
                    match tx.try_send(sample) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            Counters::bump(&counters.samples_dropped);
                            warn!("dispatch queue full, sample dropped");
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            error!("dispatch thread gone, stopping reader");
                            return;
                        }
                    }
                }
                Line::Diagnostic(text) => {
                    Counters::bump(&counters.error_lines);
                    debug!("device diagnostic: {text}");
                }
                Line::Rejected(e) => {
                    Counters::bump(&counters.lines_rejected);
                    debug!("discarding line {:?}: {e}", line::decode_latin1(&raw));
                }
                Line::Empty => {}
            }
        }
    }
    debug!("reader stopped");
}

fn dispatch_loop(rx: Receiver<Sample>, handlers: Arc<RwLock<Handlers>>, stop: Arc<AtomicBool>) {
    for sample in rx {
        // Queued samples are discarded once a disconnect begins
        if stop.load(Ordering::Acquire) {
            break;
        }
        // Clone out of the lock so a handler may re-register handlers
        let handler = handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .data_received
            .clone();
        let Some(handler) = handler else {
            continue;
        };
        if let Err(panic_info) = panic::catch_unwind(AssertUnwindSafe(|| handler(sample))) {
            error!("data handler panicked: {}", panic_message(&*panic_info));
        }
    }
}

pub(crate) fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
