use std::{io, result::Result as StdResult};

use thiserror::Error;

use crate::supervisor::ServiceKind;

/// Convenient result type for the engine crate.
pub type Result<T> = StdResult<T, Error>;

/// Unified error type for the topwin engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The settings store failed to persist a write. The in-memory desired
    /// state must not be assumed applied.
    #[error("settings store error: {0}")]
    Store(#[from] settings::Error),

    /// Spawning a collaborator service process failed.
    #[error("failed to start {kind}: {source}")]
    Spawn {
        /// Which collaborator failed to start.
        kind: ServiceKind,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },

    /// The notice channel has been closed by the receiver.
    #[error("notice channel closed")]
    ChannelClosed,
}
