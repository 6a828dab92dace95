use std::io;

use thiserror::Error;

pub use corral_api::errors::{
    ConfigError, ControlError, IdError, SubmitError, WaitError, WorkError,
};

/// Errors raised while building a pool.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}
