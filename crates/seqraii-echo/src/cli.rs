use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use clap::Parser;

use crate::server::EchoOptions;

const DEFAULT_PORT: u16 = 1234;
const DEFAULT_BUFFER_SIZE: usize = 1024;

#[derive(Parser, Debug)]
#[command(name = "udp-echo")]
#[command(bin_name = "udp-echo")]
#[command(about = "Echo UDP datagrams back to their sender", long_about = None)]
pub(crate) struct Cli {
    /// IPv4 address to bind
    #[arg(long, default_value_t = Ipv4Addr::UNSPECIFIED)]
    pub(crate) bind: Ipv4Addr,

    /// UDP port to listen on
    #[arg(long, short = 'p', default_value_t = DEFAULT_PORT)]
    pub(crate) port: u16,

    /// Largest datagram read in one receive, in bytes
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE, value_parser = parse_buffer_size)]
    pub(crate) buffer_size: usize,

    /// Datagram that stops the server
    #[arg(long, default_value = "x")]
    pub(crate) sentinel: String,

    /// Stop after this many seconds without traffic (0 waits forever)
    #[arg(long, value_name = "SECONDS")]
    pub(crate) idle_timeout: Option<u64>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short = 'v')]
    pub(crate) verbose: bool,
}

impl Cli {
    pub(crate) fn address(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.bind, self.port)
    }

    pub(crate) fn options(&self) -> EchoOptions {
        EchoOptions {
            buffer_size: self.buffer_size,
            sentinel: self.sentinel.clone().into_bytes(),
            idle_timeout: self
                .idle_timeout
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

fn parse_buffer_size(value: &str) -> Result<usize, String> {
    let size: usize = value
        .parse()
        .map_err(|_| format!("'{value}' is not a valid buffer size"))?;
    if size == 0 {
        return Err("buffer size must be at least 1 byte".to_string());
    }
    Ok(size)
}
