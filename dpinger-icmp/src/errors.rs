#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to initialize ICMP socket: {0}")]
    SocketInit(#[source] std::io::Error),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("socket write failed on every probe to {address}: {source}")]
    SocketWrite {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
