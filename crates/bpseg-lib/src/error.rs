use thiserror::Error;

/// Errors raised by the numeric core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// PCHIP needs at least two valid samples to fit.
    #[error("cannot interpolate: {valid} valid sample(s), at least 2 required")]
    Interpolation { valid: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, Error>;
