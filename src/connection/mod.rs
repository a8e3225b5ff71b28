pub mod machine;

use crate::constants::READ_BUFFER_SIZE;
use crate::framer::ByteFramer;
use crate::transport::{is_idle_read, Port, PortConfig, Transport, TransportError};
use machine::{ConnectionState, Effect, Input, LifecycleEvent, Step};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

pub use machine::DisconnectStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("serial devices are not supported here")]
    TransportUnsupported,
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("failed to open port: {0}")]
    OpenError(String),
    #[error("read failed: {0}")]
    ReadError(String),
    #[error("device was disconnected")]
    ExternalDisconnect,
    #[error("not connected")]
    NotOpen,
    #[error("write failed: {0}")]
    WriteError(String),
}

impl From<TransportError> for ConnectionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unsupported => ConnectionError::TransportUnsupported,
            TransportError::AccessDenied(msg) => ConnectionError::AccessDenied(msg),
            TransportError::Open(msg) => ConnectionError::OpenError(msg),
        }
    }
}

// Data, lifecycle and reader notices share one channel to keep their order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    Chunk(String),
    Line(String),
    Lifecycle(LifecycleEvent),
    ReaderExited {
        generation: u64,
        error: String,
    },
    DeviceRemoved {
        generation: u64,
    },
}

struct ReaderHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<Box<dyn Port>>,
}

pub struct Connection {
    transport: Box<dyn Transport>,
    state: ConnectionState,
    port: Option<Box<dyn Port>>,
    reader: Option<ReaderHandle>,
    writer: Option<Box<dyn Write + Send>>,
    config: PortConfig,
    max_chunk_length: usize,
    // Notices carrying an older generation belong to a torn-down port or
    // reader and are dropped.
    port_generation: u64,
    reader_generation: u64,
    events: Sender<SerialEvent>,
    last_error: Option<ConnectionError>,
}

impl Connection {
    pub fn new(transport: Box<dyn Transport>, events: Sender<SerialEvent>, max_chunk_length: usize) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            port: None,
            reader: None,
            writer: None,
            config: PortConfig {
                baud_rate: crate::constants::DEFAULT_BAUD_RATE,
            },
            max_chunk_length,
            port_generation: 0,
            reader_generation: 0,
            events,
            last_error: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_reading(&self) -> bool {
        self.state == ConnectionState::PortOpen
    }

    pub fn has_handle(&self) -> bool {
        self.state != ConnectionState::Disconnected
    }

    pub fn port_label(&self) -> String {
        self.transport.label()
    }

    pub fn connect(&mut self, config: PortConfig) -> Result<(), ConnectionError> {
        self.config = config;
        self.last_error = None;
        self.dispatch(Input::Connect);
        if self.is_reading() {
            Ok(())
        } else {
            Err(self.last_error.take().unwrap_or(ConnectionError::NotOpen))
        }
    }

    /// Blocks until the reader has exited and the port is closed. A no-op
    /// when already disconnected.
    pub fn disconnect(&mut self) {
        self.dispatch(Input::Disconnect);
    }

    pub fn send(&mut self, text: &str) -> Result<(), ConnectionError> {
        if !self.is_reading() {
            return Err(ConnectionError::NotOpen);
        }
        let writer = self.writer.as_mut().ok_or(ConnectionError::NotOpen)?;
        let mut payload = String::with_capacity(text.len() + 1);
        payload.push_str(text);
        payload.push('\n');
        writer
            .write_all(payload.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| ConnectionError::WriteError(e.to_string()))
    }

    pub fn on_reader_exited(&mut self, generation: u64, error: String) {
        if self.reader.is_none() || generation != self.reader_generation {
            tracing::debug!(generation, "ignoring exit of a stale reader");
            return;
        }
        self.dispatch(Input::ReaderFailed(error));
    }

    pub fn on_device_removed(&mut self, generation: u64) {
        if !self.has_handle() || generation != self.port_generation {
            return;
        }
        tracing::warn!(device = %self.port_label(), "device removed");
        self.dispatch(Input::ExternalDisconnect);
    }

    fn dispatch(&mut self, input: Input) {
        let mut queue = VecDeque::from([input]);
        while let Some(input) = queue.pop_front() {
            let Step { next, effects } = machine::step(self.state, &input);
            if next != self.state {
                tracing::debug!(from = ?self.state, to = ?next, ?input, "connection state");
            }
            self.state = next;
            for effect in effects {
                if let Some(follow_up) = self.run(effect) {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    fn run(&mut self, effect: Effect) -> Option<Input> {
        match effect {
            Effect::RequestAccess => match self.transport.request_access() {
                Ok(mut port) => {
                    self.port_generation += 1;
                    let generation = self.port_generation;
                    let events = self.events.clone();
                    port.on_external_disconnect(Arc::new(move || {
                        let _ = events.send(SerialEvent::DeviceRemoved { generation });
                    }));
                    self.port = Some(port);
                    Some(Input::AccessGranted)
                }
                Err(e) => Some(Input::Failed(e.into())),
            },
            Effect::Open { reused } => {
                let Some(port) = self.port.as_mut() else {
                    return Some(Input::Failed(ConnectionError::NotOpen));
                };
                match port.open(self.config) {
                    Ok(()) => {
                        self.writer = port.writer();
                        Some(Input::Opened {
                            reused,
                            baud_rate: self.config.baud_rate,
                        })
                    }
                    Err(e) => Some(Input::Failed(e.into())),
                }
            }
            Effect::StartReader => {
                self.start_reader();
                None
            }
            Effect::StopReader => {
                self.stop_reader();
                Some(Input::ReaderStopped)
            }
            Effect::ClosePort => {
                self.writer = None;
                if let Some(port) = self.port.as_mut() {
                    port.close();
                }
                None
            }
            Effect::ReleasePort => {
                if self.port.take().is_some() {
                    tracing::info!(device = %self.port_label(), "access released");
                }
                None
            }
            Effect::Emit(event) => {
                if let LifecycleEvent::Failed(err) = &event {
                    tracing::warn!(error = %err, "connection failed");
                    self.last_error = Some(err.clone());
                }
                let _ = self.events.send(SerialEvent::Lifecycle(event));
                None
            }
        }
    }

    fn start_reader(&mut self) {
        let Some(port) = self.port.take() else {
            tracing::warn!("no port to read from");
            return;
        };
        self.reader_generation += 1;
        let generation = self.reader_generation;
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            let events = self.events.clone();
            let max_chunk_length = self.max_chunk_length;
            thread::spawn(move || read_loop(port, stop, events, generation, max_chunk_length))
        };
        tracing::debug!(generation, "reader started");
        self.reader = Some(ReaderHandle { stop, thread });
    }

    fn stop_reader(&mut self) {
        self.writer = None;
        let Some(reader) = self.reader.take() else {
            return;
        };
        reader.stop.store(true, Ordering::Release);
        match reader.thread.join() {
            Ok(port) => self.port = Some(port),
            Err(_) => tracing::warn!("reader thread panicked, port dropped"),
        }
        tracing::debug!(generation = self.reader_generation, "reader stopped");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn read_loop(
    mut port: Box<dyn Port>,
    stop: Arc<AtomicBool>,
    events: Sender<SerialEvent>,
    generation: u64,
    max_chunk_length: usize,
) -> Box<dyn Port> {
    let mut framer = ByteFramer::new(max_chunk_length);
    let mut buf = [0u8; READ_BUFFER_SIZE];

    let error = loop {
        if stop.load(Ordering::Acquire) {
            break None;
        }
        let n = match port.read(&mut buf) {
            Ok(0) => break Some("end of stream".to_string()),
            Ok(n) => n,
            Err(e) if is_idle_read(&e) => continue,
            Err(e) => break Some(e.to_string()),
        };
        let framed = framer.feed(&buf[..n]);
        if framed.is_empty() {
            continue;
        }
        let delivered = framed
            .lines
            .into_iter()
            .map(SerialEvent::Line)
            .chain(framed.chunk.map(SerialEvent::Chunk))
            .all(|event| events.send(event).is_ok());
        if !delivered {
            break None;
        }
    };

    if let Some(error) = error {
        if !stop.load(Ordering::Acquire) {
            tracing::debug!(generation, %error, "reader exited");
            let _ = events.send(SerialEvent::ReaderExited { generation, error });
        }
    }
    port
}
