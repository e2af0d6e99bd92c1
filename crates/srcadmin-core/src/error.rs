//! Error types for srcadmin

/// srcadmin error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already running: {0}")]
    AlreadyRunning(String),

    #[error("already connected: {0}")]
    AlreadyConnected(String),

    #[error("not connected: {0}")]
    NotConnected(String),

    #[error("rcon: authentication failed")]
    AuthFailed,

    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("stopped")]
    Stopped,

    #[error("failed to spawn process: {0}")]
    Spawn(String),

    #[error("database error: {0}")]
    Db(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for srcadmin
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Error::NotFound(what.into())
    }

    pub fn db<S: Into<String>>(msg: S) -> Self {
        Error::Db(msg.into())
    }

    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Error::Malformed(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// An io error carrying `ErrorKind::TimedOut`, used for deadline-guarded
    /// socket operations.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            msg.into(),
        ))
    }
}
