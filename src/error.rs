use std::fmt;
use std::io;

// Custom error type for everything the controller can recover from.
// None of these terminate the app; they end up in the status line.
#[derive(Debug)]
pub enum EqError {
    Io(io::Error),
    InvalidRange { start_freq: f32, end_freq: f32 },
    UnknownBand(u64),
    NoAssetLoaded(&'static str),
    Processing(String),
    Decode(String),
}

impl fmt::Display for EqError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EqError::Io(err) => write!(f, "IO error: {}", err),
            EqError::InvalidRange {
                start_freq,
                end_freq,
            } => write!(
                f,
                "Invalid band range: {} Hz .. {} Hz",
                start_freq, end_freq
            ),
            EqError::UnknownBand(id) => write!(f, "No band with id {}", id),
            EqError::NoAssetLoaded(channel) => {
                write!(f, "No audio loaded for {} channel", channel)
            }
            EqError::Processing(msg) => write!(f, "Processing failed: {}", msg),
            EqError::Decode(msg) => write!(f, "Decoding error: {}", msg),
        }
    }
}

impl std::error::Error for EqError {}

impl From<io::Error> for EqError {
    fn from(err: io::Error) -> Self {
        EqError::Io(err)
    }
}
