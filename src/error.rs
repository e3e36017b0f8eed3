use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("interface {index} not found")]
    InterfaceNotFound { index: u32 },

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("transmit failed: {0}")]
    Transmit(String),

    #[error("fragmentation failed: {0}")]
    Fragment(String),
}

pub type Result<T> = std::result::Result<T, Error>;
