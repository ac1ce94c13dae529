use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("rotation interval must be greater than zero")]
    ZeroInterval,
    #[error("allow-list must contain at least one gateway")]
    EmptyAllowList,
    #[error("scheduler is already ticking")]
    AlreadyStarted,
    #[error("scheduler has been stopped")]
    Stopped,
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}
