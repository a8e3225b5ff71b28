use crate::constants::{READ_TIMEOUT_MS, TCP_CONNECT_TIMEOUT_MS};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[cfg_attr(unix, allow(dead_code))]
    #[error("serial devices are not supported on this platform")]
    Unsupported,
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("{0}")]
    Open(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    pub baud_rate: u32,
}

pub type RemovalCallback = Arc<dyn Fn() + Send + Sync>;

pub trait Port: Send {
    fn label(&self) -> String;

    fn open(&mut self, config: PortConfig) -> Result<(), TransportError>;

    /// `Ok(0)` means end of stream. `WouldBlock`/`TimedOut` mean nothing
    /// arrived within the poll interval.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn writer(&self) -> Option<Box<dyn Write + Send>>;

    /// Closing a port that is not open is a no-op.
    fn close(&mut self);

    fn on_external_disconnect(&mut self, _callback: RemovalCallback) {}
}

pub trait Transport {
    fn label(&self) -> String;

    fn request_access(&mut self) -> Result<Box<dyn Port>, TransportError>;
}

pub fn transport_for(target: &str) -> Box<dyn Transport> {
    match target.strip_prefix("tcp://") {
        Some(addr) => Box::new(TcpTransport::new(addr)),
        None => Box::new(SerialDeviceTransport::new(target)),
    }
}

pub fn is_idle_read(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

pub struct SerialDeviceTransport {
    path: PathBuf,
}

impl SerialDeviceTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Transport for SerialDeviceTransport {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    #[cfg(unix)]
    fn request_access(&mut self) -> Result<Box<dyn Port>, TransportError> {
        use nix::errno::Errno;
        use nix::unistd::{access, AccessFlags};

        access(&self.path, AccessFlags::R_OK | AccessFlags::W_OK).map_err(|e| match e {
            Errno::ENOENT => TransportError::AccessDenied(format!("{} does not exist", self.label())),
            Errno::EACCES | Errno::EPERM => TransportError::AccessDenied(format!(
                "no read/write permission on {}",
                self.label()
            )),
            other => TransportError::AccessDenied(other.desc().to_string()),
        })?;
        tracing::info!(device = %self.label(), "device access granted");
        Ok(Box::new(device::SerialDevicePort::new(self.path.clone())))
    }

    #[cfg(not(unix))]
    fn request_access(&mut self) -> Result<Box<dyn Port>, TransportError> {
        Err(TransportError::Unsupported)
    }
}

#[cfg(unix)]
mod device {
    use super::{PortConfig, RemovalCallback, TransportError};
    use crate::constants::READ_TIMEOUT_MS;
    use nix::fcntl::OFlag;
    use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
    use nix::sys::termios::{self, BaudRate, ControlFlags, FlushArg, SetArg};
    use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
    use std::fs::{File, OpenOptions};
    use std::io::{self, Read, Write};
    use std::os::fd::AsFd;
    use std::os::unix::fs::OpenOptionsExt;
    use std::path::PathBuf;

    fn baud_rate_flag(baud: u32) -> Option<BaudRate> {
        let flag = match baud {
            300 => BaudRate::B300,
            1200 => BaudRate::B1200,
            2400 => BaudRate::B2400,
            4800 => BaudRate::B4800,
            9600 => BaudRate::B9600,
            19200 => BaudRate::B19200,
            38400 => BaudRate::B38400,
            57600 => BaudRate::B57600,
            115200 => BaudRate::B115200,
            230400 => BaudRate::B230400,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            500000 => BaudRate::B500000,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            1000000 => BaudRate::B1000000,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            2000000 => BaudRate::B2000000,
            _ => return None,
        };
        Some(flag)
    }

    fn open_error(context: &str, err: impl std::fmt::Display) -> TransportError {
        TransportError::Open(format!("{}: {}", context, err))
    }

    pub struct SerialDevicePort {
        path: PathBuf,
        file: Option<File>,
        // Held only to keep the removal watch alive.
        _watcher: Option<RecommendedWatcher>,
    }

    impl SerialDevicePort {
        pub fn new(path: PathBuf) -> Self {
            Self {
                path,
                file: None,
                _watcher: None,
            }
        }
    }

    impl super::Port for SerialDevicePort {
        fn label(&self) -> String {
            self.path.display().to_string()
        }

        fn open(&mut self, config: PortConfig) -> Result<(), TransportError> {
            let baud = baud_rate_flag(config.baud_rate).ok_or_else(|| {
                TransportError::Open(format!("{} baud is not available on this system", config.baud_rate))
            })?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags((OFlag::O_NOCTTY | OFlag::O_NONBLOCK).bits())
                .open(&self.path)
                .map_err(|e| open_error(&self.label(), e))?;

            let mut tio = termios::tcgetattr(&file).map_err(|e| open_error("tcgetattr", e))?;
            termios::cfmakeraw(&mut tio);
            termios::cfsetspeed(&mut tio, baud).map_err(|e| open_error("cfsetspeed", e))?;
            tio.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
            termios::tcsetattr(&file, SetArg::TCSANOW, &tio).map_err(|e| open_error("tcsetattr", e))?;
            termios::tcflush(&file, FlushArg::TCIOFLUSH).map_err(|e| open_error("tcflush", e))?;

            tracing::info!(device = %self.label(), baud = config.baud_rate, "device opened");
            self.file = Some(file);
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(file) = self.file.as_mut() else {
                return Ok(0);
            };
            let revents = {
                let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLIN)];
                let ready = poll(&mut fds, PollTimeout::from(READ_TIMEOUT_MS as u16))?;
                if ready == 0 {
                    return Err(io::ErrorKind::TimedOut.into());
                }
                fds[0].revents().unwrap_or(PollFlags::empty())
            };
            if revents.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device reported an error"));
            }
            file.read(buf)
        }

        fn writer(&self) -> Option<Box<dyn Write + Send>> {
            let clone = self.file.as_ref()?.try_clone().ok()?;
            Some(Box::new(clone))
        }

        fn close(&mut self) {
            if self.file.take().is_some() {
                tracing::info!(device = %self.label(), "device closed");
            }
        }

        fn on_external_disconnect(&mut self, callback: RemovalCallback) {
            let Some(parent) = self.path.parent().map(PathBuf::from) else {
                return;
            };
            let target = self.path.clone();
            let handler = move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    if matches!(event.kind, EventKind::Remove(_)) && event.paths.contains(&target) {
                        callback();
                    }
                }
            };
            let watcher = RecommendedWatcher::new(handler, notify::Config::default()).and_then(
                |mut w| {
                    w.watch(&parent, RecursiveMode::NonRecursive)?;
                    Ok(w)
                },
            );
            match watcher {
                Ok(w) => self._watcher = Some(w),
                Err(e) => tracing::warn!(error = %e, "cannot watch for device removal"),
            }
        }
    }
}

/// Serial-over-TCP bridge (ser2net, ESP-link and the like). The bridge owns
/// the line settings, so the requested baud rate is only reported.
pub struct TcpTransport {
    address: String,
}

impl TcpTransport {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
        }
    }
}

impl Transport for TcpTransport {
    fn label(&self) -> String {
        format!("tcp://{}", self.address)
    }

    fn request_access(&mut self) -> Result<Box<dyn Port>, TransportError> {
        let valid = self
            .address
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !valid {
            return Err(TransportError::AccessDenied(format!(
                "'{}' is not a host:port address",
                self.address
            )));
        }
        Ok(Box::new(TcpPort {
            address: self.address.clone(),
            stream: None,
        }))
    }
}

struct TcpPort {
    address: String,
    stream: Option<TcpStream>,
}

impl TcpPort {
    fn connect(&self) -> io::Result<TcpStream> {
        let addr = self
            .address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "address did not resolve"))?;
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_keepalive(true)?;
        socket.connect_timeout(&addr.into(), Duration::from_millis(TCP_CONNECT_TIMEOUT_MS))?;
        socket.set_nodelay(true)?;
        socket.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)))?;
        Ok(socket.into())
    }
}

impl Port for TcpPort {
    fn label(&self) -> String {
        format!("tcp://{}", self.address)
    }

    fn open(&mut self, config: PortConfig) -> Result<(), TransportError> {
        let stream = self
            .connect()
            .map_err(|e| TransportError::Open(format!("{}: {}", self.label(), e)))?;
        tracing::info!(bridge = %self.address, baud = config.baud_rate, "bridge connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.as_mut() {
            Some(stream) => stream.read(buf),
            None => Ok(0),
        }
    }

    fn writer(&self) -> Option<Box<dyn Write + Send>> {
        let clone = self.stream.as_ref()?.try_clone().ok()?;
        Some(Box::new(clone))
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            tracing::info!(bridge = %self.address, "bridge closed");
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::thread;

    #[derive(Default)]
    pub struct MockState {
        pub incoming: VecDeque<Vec<u8>>,
        pub read_error: Option<String>,
        pub deny_access: bool,
        pub fail_open: Option<String>,
        pub access_requests: usize,
        pub opened_with: Vec<u32>,
        pub closes: usize,
        pub is_open: bool,
        pub written: Vec<u8>,
        pub removal: Option<RemovalCallback>,
    }

    #[derive(Clone, Default)]
    pub struct MockDevice {
        pub state: Arc<Mutex<MockState>>,
    }

    impl MockDevice {
        pub fn push(&self, bytes: &[u8]) {
            self.state.lock().unwrap().incoming.push_back(bytes.to_vec());
        }

        pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
            f(&mut self.state.lock().unwrap())
        }

        /// Removal notice first, then reads start failing, as a real
        /// device node disappearing would look.
        pub fn unplug(&self) {
            if let Some(callback) = self.with(|s| s.removal.clone()) {
                callback();
            }
            self.with(|s| s.read_error = Some("device gone".to_string()));
        }
    }

    impl Transport for MockDevice {
        fn label(&self) -> String {
            "mock".to_string()
        }

        fn request_access(&mut self) -> Result<Box<dyn Port>, TransportError> {
            let mut state = self.state.lock().unwrap();
            state.access_requests += 1;
            if state.deny_access {
                return Err(TransportError::AccessDenied("user declined".to_string()));
            }
            Ok(Box::new(MockPort {
                device: self.clone(),
            }))
        }
    }

    pub struct MockPort {
        device: MockDevice,
    }

    impl Port for MockPort {
        fn label(&self) -> String {
            "mock".to_string()
        }

        fn open(&mut self, config: PortConfig) -> Result<(), TransportError> {
            self.device.with(|s| {
                if let Some(msg) = s.fail_open.clone() {
                    return Err(TransportError::Open(msg));
                }
                s.opened_with.push(config.baud_rate);
                s.is_open = true;
                Ok(())
            })
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let next = self.device.with(|s| {
                if !s.is_open {
                    return Ok(Some(0));
                }
                if let Some(mut bytes) = s.incoming.pop_front() {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        s.incoming.push_front(bytes.split_off(n));
                    }
                    return Ok(Some(n));
                }
                if let Some(msg) = s.read_error.clone() {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, msg));
                }
                Ok(None)
            })?;
            match next {
                Some(n) => Ok(n),
                None => {
                    thread::sleep(Duration::from_millis(5));
                    Err(io::ErrorKind::TimedOut.into())
                }
            }
        }

        fn writer(&self) -> Option<Box<dyn Write + Send>> {
            Some(Box::new(MockWriter {
                device: self.device.clone(),
            }))
        }

        fn close(&mut self) {
            self.device.with(|s| {
                if s.is_open {
                    s.is_open = false;
                    s.closes += 1;
                }
            });
        }

        fn on_external_disconnect(&mut self, callback: RemovalCallback) {
            self.device.with(|s| s.removal = Some(callback));
        }
    }

    struct MockWriter {
        device: MockDevice,
    }

    impl Write for MockWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.device.with(|s| s.written.extend_from_slice(buf));
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_for_picks_bridge_by_scheme() {
        assert_eq!(transport_for("tcp://localhost:4000").label(), "tcp://localhost:4000");
        assert_eq!(transport_for("/dev/ttyUSB0").label(), "/dev/ttyUSB0");
    }

    #[test]
    fn test_bridge_rejects_malformed_address() {
        let mut transport = TcpTransport::new("localhost");
        assert!(matches!(
            transport.request_access(),
            Err(TransportError::AccessDenied(_))
        ));
        let mut transport = TcpTransport::new("localhost:4000");
        assert!(transport.request_access().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_device_is_access_denied() {
        let mut transport = SerialDeviceTransport::new("/dev/does-not-exist-serialterm");
        match transport.request_access() {
            Err(TransportError::AccessDenied(msg)) => assert!(msg.contains("does not exist")),
            other => panic!("unexpected: {:?}", other.map(|p| p.label())),
        }
    }

    #[test]
    fn test_bridge_reads_from_socket() {
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"hello\n").unwrap();
        });

        let mut transport = TcpTransport::new(&addr.to_string());
        let mut port = transport.request_access().unwrap();
        port.open(PortConfig { baud_rate: 9600 }).unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match port.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e) if is_idle_read(&e) => continue,
                Err(e) => panic!("read failed: {}", e),
            }
        }
        server.join().unwrap();
        port.close();
        assert_eq!(received, b"hello\n");
    }
}
