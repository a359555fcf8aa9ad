use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ToneDecodeError {
    #[error("Sample buffer is empty")]
    EmptyBuffer,

    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ToneDecodeError {
    /// True for the malformed-audio family (as opposed to bad configuration)
    pub fn is_input_error(&self) -> bool {
        !matches!(self, ToneDecodeError::InvalidConfig(_))
    }
}

pub type Result<T> = std::result::Result<T, ToneDecodeError>;
