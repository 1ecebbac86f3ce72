use std::net::SocketAddrV4;

use seqraii::StepError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum EchoError {
    #[error("failed to set up UDP endpoint on {addr}")]
    Setup {
        addr: SocketAddrV4,
        #[source]
        source: StepError,
    },

    #[error("UDP endpoint is not open")]
    EndpointClosed,

    #[error("IO error")]
    Io(#[from] std::io::Error),
}

pub(crate) type Result<T> = std::result::Result<T, EchoError>;
