use thiserror::Error;

use crate::crc::CrcRawType;
use crate::eid::EndpointIdError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("invalid endpoint id: {0}")]
    InvalidEID(#[from] EndpointIdError),
    #[error("unsupported bundle protocol version {found}, expected 7")]
    VersionMismatch { found: u32 },
    #[error("invalid crc type {0}")]
    InvalidCrcType(CrcRawType),
    #[error("lifetime must be a positive number of milliseconds")]
    InvalidLifetime,
    #[error("fragment offset {offset} plus payload length {payload_len} exceeds total application data unit length {total}")]
    FragmentRangeError {
        offset: u64,
        payload_len: u64,
        total: u64,
    },
    #[error("inconsistent fragment fields: {0}")]
    InconsistentFragmentFields(String),
    #[error("{}: {reason}", block_position(.block_index))]
    CodecError {
        block_index: Option<usize>,
        reason: String,
    },
    #[error("crc mismatch in block {0}")]
    CrcMismatch(u64),
    #[error("bundle validation failed: {}", join_errors(.0))]
    ValidationError(ErrorList),
    #[error("canonical block: {0}")]
    CanonicalBlockError(String),
    #[error("bundle: {0}")]
    BundleError(String),
    #[error("bundle control flags: {0}")]
    BundleControlFlagsError(String),
    #[error("json: {0}")]
    JsonError(String),
    #[error("administrative record: {0}")]
    AdministrativeRecordError(String),
}

pub type ErrorList = Vec<Error>;

impl Error {
    pub(crate) fn codec(block_index: Option<usize>, reason: impl ToString) -> Self {
        Error::CodecError {
            block_index,
            reason: reason.to_string(),
        }
    }
}

fn block_position(block_index: &Option<usize>) -> String {
    match block_index {
        Some(idx) => format!("malformed block at index {}", idx),
        None => "malformed bundle".to_string(),
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_error_names_block_index() {
        let err = Error::codec(Some(2), "missing field");
        assert_eq!(err.to_string(), "malformed block at index 2: missing field");
        let err = Error::codec(None, "empty input");
        assert_eq!(err.to_string(), "malformed bundle: empty input");
    }

    #[test]
    fn validation_error_joins_violations() {
        let err = Error::ValidationError(vec![Error::InvalidLifetime, Error::CrcMismatch(1)]);
        assert_eq!(
            err.to_string(),
            "bundle validation failed: lifetime must be a positive number of milliseconds; crc mismatch in block 1"
        );
    }
}
