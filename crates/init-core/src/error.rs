/// Setup-time failure. Every variant is fatal: the supervisor exits
/// with status 1 before entering (or immediately leaving) the reaping
/// loop.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("config error: {0}")]
    Config(String),

    #[error("signal setup failed: {0}")]
    Signal(String),

    #[error("spawn failed: {0}")]
    Spawn(String),

    #[error("cannot read process table: {0}")]
    ProcTable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type InitResult<T> = Result<T, InitError>;
