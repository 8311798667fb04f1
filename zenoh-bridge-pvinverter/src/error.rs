use thiserror::Error;

/// Error type for the inverter bridge.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CBOR serialization error: {0}")]
    Cbor(String),

    #[error("Invalid command: {0}")]
    Command(String),

    #[error("Register table error: {0}")]
    Catalog(#[from] pvsight_modbus::ConstructionError),
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

/// Result type alias using the bridge [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
