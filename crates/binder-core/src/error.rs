use thiserror::Error;

/// The single fatal-return condition for the core: the caller handed us bytes
/// we cannot even split into lines.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("input is not valid UTF-8 at byte {0}")]
    InvalidUtf8(usize),
}

impl CoreError {
    pub(crate) fn from_utf8_error(err: std::str::Utf8Error) -> Self {
        CoreError::InvalidUtf8(err.valid_up_to())
    }
}
