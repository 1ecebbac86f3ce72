use std::cell::RefCell;
use std::io::ErrorKind;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::os::fd::AsRawFd;
use std::rc::Rc;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::socket::{
    AddressFamily, SockFlag, SockType, SockaddrIn, bind, setsockopt, socket, sockopt,
};
use seqraii::{Sequencer, Step, StepError, StepStatus};
use tracing::{debug, info, warn};

use crate::error::{EchoError, Result};

type Endpoint = Rc<RefCell<Option<UdpSocket>>>;

/// Runtime knobs for the echo loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EchoOptions {
    pub(crate) buffer_size: usize,
    pub(crate) sentinel: Vec<u8>,
    pub(crate) idle_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    Sentinel,
    /// No datagram arrived within the idle timeout.
    Idle,
    IoError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EchoSummary {
    pub(crate) echoed: usize,
    pub(crate) stop: StopReason,
}

/// A bound UDP endpoint. Dropping it closes the socket.
pub(crate) struct EchoServer {
    setup: Sequencer<'static>,
    endpoint: Endpoint,
}

impl EchoServer {
    /// Open, configure and bind the socket.
    ///
    /// On failure every stage that completed has already been undone.
    pub(crate) fn open(addr: SocketAddrV4) -> Result<Self> {
        let endpoint: Endpoint = Rc::new(RefCell::new(None));
        let mut setup = setup_sequence(&endpoint, addr);

        let (ready, audit_log) = setup.initialize_with_audit();
        debug!("endpoint setup:\n{}", audit_log.summary());
        if !ready {
            let source = audit_log
                .records()
                .iter()
                .find(|r| r.status == StepStatus::Failed)
                .and_then(|r| r.error.clone())
                .unwrap_or(StepError::Rejected);
            return Err(EchoError::Setup { addr, source });
        }

        Ok(Self { setup, endpoint })
    }

    pub(crate) fn local_addr(&self) -> Result<SocketAddr> {
        let endpoint = self.endpoint.borrow();
        let socket = endpoint.as_ref().ok_or(EchoError::EndpointClosed)?;
        Ok(socket.local_addr()?)
    }

    /// Echo datagrams until the sentinel arrives, the idle timeout passes or
    /// the socket errors.
    ///
    /// None of these fail the call. The endpoint is torn down the same way
    /// whichever one ends the loop.
    pub(crate) fn serve(&self, options: &EchoOptions) -> Result<EchoSummary> {
        let endpoint = self.endpoint.borrow();
        let socket = endpoint.as_ref().ok_or(EchoError::EndpointClosed)?;
        socket.set_read_timeout(options.idle_timeout)?;

        let mut buffer = vec![0_u8; options.buffer_size];
        let mut echoed = 0;

        loop {
            let (len, peer) = match socket.recv_from(&mut buffer) {
                Ok(received) => received,
                Err(error) if is_idle_timeout(&error) => {
                    info!("idle timeout reached, stopping");
                    return Ok(EchoSummary {
                        echoed,
                        stop: StopReason::Idle,
                    });
                }
                Err(error) => {
                    warn!(%error, "receive failed, stopping");
                    return Ok(EchoSummary {
                        echoed,
                        stop: StopReason::IoError,
                    });
                }
            };
            let datagram = &buffer[..len];
            println!("{peer} -> {}", String::from_utf8_lossy(datagram));

            if datagram == options.sentinel.as_slice() {
                info!(%peer, "sentinel received, stopping");
                return Ok(EchoSummary {
                    echoed,
                    stop: StopReason::Sentinel,
                });
            }

            if let Err(error) = socket.send_to(datagram, peer) {
                warn!(%peer, %error, "send failed, stopping");
                return Ok(EchoSummary {
                    echoed,
                    stop: StopReason::IoError,
                });
            }
            echoed += 1;
        }
    }

    /// Close the socket. Safe to call more than once.
    pub(crate) fn shutdown(&mut self) {
        self.setup.uninitialize();
    }
}

/// Socket setup as three stages: create (undone by closing), allow address
/// reuse, bind.
fn setup_sequence(endpoint: &Endpoint, addr: SocketAddrV4) -> Sequencer<'static> {
    let mut setup = Sequencer::new();

    let opened = Rc::clone(endpoint);
    let closed = Rc::clone(endpoint);
    setup.push(
        Step::new(move || -> nix::Result<()> {
            let fd = socket(
                AddressFamily::Inet,
                SockType::Datagram,
                SockFlag::empty(),
                None,
            )?;
            *opened.borrow_mut() = Some(UdpSocket::from(fd));
            Ok(())
        })
        .with_undo(move || {
            if closed.borrow_mut().take().is_some() {
                debug!("closed UDP endpoint");
            }
        })
        .named("open endpoint"),
    );

    let reusable = Rc::clone(endpoint);
    setup.push(
        Step::new(move || {
            with_socket(&reusable, |socket| {
                setsockopt(socket, sockopt::ReuseAddr, &true)
            })
        })
        .named("reuse address"),
    );

    let bound = Rc::clone(endpoint);
    setup.push(
        Step::new(move || {
            with_socket(&bound, |socket| {
                bind(socket.as_raw_fd(), &SockaddrIn::from(addr))
            })
        })
        .named("bind"),
    );

    setup
}

/// A receive timeout surfaces as `WouldBlock` on Unix and `TimedOut` elsewhere.
fn is_idle_timeout(error: &std::io::Error) -> bool {
    matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn with_socket<T>(
    endpoint: &Endpoint,
    op: impl FnOnce(&UdpSocket) -> nix::Result<T>,
) -> nix::Result<T> {
    match endpoint.borrow().as_ref() {
        Some(socket) => op(socket),
        None => Err(Errno::EBADF),
    }
}
