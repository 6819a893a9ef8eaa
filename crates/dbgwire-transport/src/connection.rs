//! TCP connection between a debugger front end and a backend host.
//!
//! A connection is either a [`Role::Listener`], which accepts exactly one
//! peer at a time and goes back to polling when it leaves, or a
//! [`Role::Connector`], which dials a host once. Any failed transfer drops
//! the peer immediately; there is no retry and no reconnect.

use std::io::{self, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::framing::{
    COMMAND_LEN, Command, FrameError, Incoming, MAX_PAYLOAD_LEN, read_message, write_blocks,
};

/// Which end of the link this connection is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Listener,
    Connector,
}

/// A single-peer socket connection.
#[derive(Debug)]
pub struct Connection {
    role: Role,
    config: TransportConfig,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
}

impl Connection {
    /// Binds a listener. Peers are picked up by [`poll_accept`](Self::poll_accept).
    pub fn listen(config: TransportConfig) -> TransportResult<Self> {
        let addr = SocketAddr::new(config.bind_addr, config.port);
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        listener.set_nonblocking(true)?;
        info!(addr = %listener.local_addr()?, "listening for debugger peer");

        Ok(Self {
            role: Role::Listener,
            config,
            listener: Some(listener),
            stream: None,
            peer: None,
        })
    }

    /// Connects to `host:port`, trying each resolved address in turn.
    pub fn connect(host: &str, port: u16, config: TransportConfig) -> TransportResult<Self> {
        let target = format!("{host}:{port}");
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                target: target.clone(),
                source,
            })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, config.connect_timeout) {
                Ok(stream) => {
                    configure(&stream, &config)?;
                    info!(peer = %addr, "connected to backend host");
                    return Ok(Self {
                        role: Role::Connector,
                        config,
                        listener: None,
                        stream: Some(stream),
                        peer: Some(addr),
                    });
                }
                Err(e) => {
                    debug!(peer = %addr, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(TransportError::Connect {
            target,
            source: last_error
                .unwrap_or_else(|| io::Error::new(ErrorKind::NotFound, "no address resolved")),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Address of the listening socket, or of our end of the stream.
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        match (&self.listener, &self.stream) {
            (Some(listener), _) => Ok(listener.local_addr()?),
            (None, Some(stream)) => Ok(stream.local_addr()?),
            (None, None) => Err(TransportError::NotConnected),
        }
    }

    /// Accepts a waiting peer without blocking.
    ///
    /// Returns true when a peer is connected (already, or just now). A
    /// connector only reports its own state.
    pub fn poll_accept(&mut self) -> bool {
        if self.stream.is_some() {
            return true;
        }
        let Some(listener) = &self.listener else {
            return false;
        };

        match listener.accept() {
            Ok((stream, addr)) => {
                if let Err(e) = configure(&stream, &self.config) {
                    warn!(peer = %addr, error = %e, "failed to configure peer socket");
                    return false;
                }
                info!(peer = %addr, "peer connected");
                self.stream = Some(stream);
                self.peer = Some(addr);
                true
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(e) => {
                warn!(error = %e, "accept failed");
                false
            }
        }
    }

    /// Checks without blocking whether the peer has sent anything.
    ///
    /// A peer that closed its end is dropped here and reported as not
    /// readable.
    pub fn poll_read(&mut self) -> bool {
        let Some(stream) = &self.stream else {
            return false;
        };

        let mut probe = [0u8; 1];
        let peeked = stream
            .set_nonblocking(true)
            .and_then(|()| stream.peek(&mut probe));
        let restored = stream.set_nonblocking(false);

        match (peeked, restored) {
            (Ok(0), _) => {
                info!(peer = ?self.peer, "peer closed the connection");
                self.disconnect();
                false
            }
            (Ok(_), Ok(())) => true,
            (Err(e), Ok(())) if e.kind() == ErrorKind::WouldBlock => false,
            (Err(e), _) | (Ok(_), Err(e)) => {
                warn!(peer = ?self.peer, error = %e, "readiness check failed, dropping peer");
                self.disconnect();
                false
            }
        }
    }

    /// Sends a bare action command.
    pub fn send_action(&mut self, code: u16) -> TransportResult<()> {
        self.send_raw("send action", &Command::Action(code).encode())?;
        debug!(code, "sent action");
        Ok(())
    }

    /// Sends a finalized buffer. Its length prefix doubles as the command
    /// header.
    pub fn send_buffer(&mut self, buf: &[u8]) -> TransportResult<()> {
        let Some(prefix) = buf.first_chunk::<COMMAND_LEN>() else {
            return Err(TransportError::invalid_buffer("missing length prefix"));
        };
        let declared = u32::from_be_bytes(*prefix);
        if declared as usize != buf.len() {
            return Err(TransportError::invalid_buffer(format!(
                "prefix says {declared} bytes, buffer holds {}",
                buf.len()
            )));
        }
        if declared > MAX_PAYLOAD_LEN {
            return Err(TransportError::PayloadTooLarge {
                size: buf.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        self.send_raw("send buffer", buf)?;
        debug!(len = buf.len(), "sent buffer");
        Ok(())
    }

    /// Reads one message if the peer has sent anything.
    ///
    /// Returns `Ok(None)` when nothing is waiting. Once a message has
    /// started, the rest of it is read with the configured read deadline; a
    /// failure at that point drops the peer.
    pub fn recv(&mut self) -> TransportResult<Option<Incoming>> {
        if !self.poll_read() {
            return Ok(None);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        match read_message(stream, self.config.max_payload) {
            Ok(message) => {
                if let Incoming::Buffer(buf) = &message {
                    debug!(len = buf.len(), "received buffer");
                }
                Ok(Some(message))
            }
            Err(FrameError::Io(source)) => Err(self.drop_peer("receive", source)),
            Err(FrameError::TooShort(len)) => {
                warn!(len, "peer announced a payload shorter than its header");
                self.disconnect();
                Err(TransportError::InvalidCommand { len })
            }
            Err(FrameError::TooLarge(len)) => {
                warn!(len, max = self.config.max_payload, "peer announced an oversized payload");
                self.disconnect();
                Err(TransportError::PayloadTooLarge {
                    size: len as usize,
                    max: self.config.max_payload,
                })
            }
        }
    }

    /// Drops the current peer. A listener keeps listening.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            info!(peer = ?self.peer, "peer disconnected");
        }
        self.peer = None;
    }

    fn send_raw(&mut self, operation: &'static str, bytes: &[u8]) -> TransportResult<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        write_blocks(stream, bytes).map_err(|source| self.drop_peer(operation, source))
    }

    fn drop_peer(&mut self, operation: &'static str, source: io::Error) -> TransportError {
        warn!(operation, error = %source, "transfer failed, dropping peer");
        self.disconnect();
        TransportError::Disconnected { operation, source }
    }
}

/// Puts an accepted or dialled stream into blocking mode with deadlines.
fn configure(stream: &TcpStream, config: &TransportConfig) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(config.nodelay)?;
    stream.set_read_timeout(config.read_timeout)?;
    stream.set_write_timeout(config.write_timeout)?;
    Ok(())
}
