use std::{fmt::{Display, Formatter}, io, result};

use arrow_schema::ArrowError;
use parquet::errors::ParquetError;

/// Closed error set shared by every crate in the workspace.
#[derive(Debug)]
pub enum Error {
    /// Byte range requested from a block is outside the file, or a file is
    /// missing its metadata sidecar.
    NotFound(String),
    /// Bytes were read but failed a structural check: bad magic, checksum
    /// mismatch, truncated page, malformed index.
    Corrupt(String),
    /// A column is encoded with a scheme this build does not support.
    EncodingUnsupported(String),
    /// Local or object-store I/O failure.
    Io(String),
    /// The query was cancelled via its `CancellationToken` before finishing.
    Cancelled,
    /// Encountered a column or label set that does not match the expected schema.
    SchemaMismatch(String),
    /// General error, not covered by a more specific variant.
    General(String),
    /// An external error kept around for its source chain.
    External(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = result::Result<T, E>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e.to_string())
    }
}

impl From<ArrowError> for Error {
    fn from(e: ArrowError) -> Error {
        Error::External(Box::new(e))
    }
}

impl From<ParquetError> for Error {
    fn from(e: ParquetError) -> Error {
        Error::External(Box::new(e))
    }
}

impl From<object_store::Error> for Error {
    fn from(e: object_store::Error) -> Error {
        match e {
            object_store::Error::NotFound { path, .. } => {
                log::debug!("object store miss: {path}");
                Error::NotFound(path)
            }
            other => {
                log::warn!("object store error: {other}");
                Error::External(Box::new(other))
            }
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Error {
        Error::General(e.to_string())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound(source) => write!(f, "not found: {}", source),
            Error::Corrupt(source) => write!(f, "corrupt data: {}", source),
            Error::EncodingUnsupported(source) => write!(f, "unsupported encoding: {}", source),
            Error::Io(source) => write!(f, "io error: {}", source),
            Error::Cancelled => write!(f, "query cancelled"),
            Error::SchemaMismatch(source) => write!(f, "schema mismatch: {}", source),
            Error::General(source) => write!(f, "general error: {}", source),
            Error::External(source) => write!(f, "external error: {}", source),
        }
    }
}

impl std::error::Error for Error {}

/// Simplifies building a `General` error from a format string.
#[macro_export]
macro_rules! general_error {
    ($msg:expr) => {
        $crate::errors::Error::General($msg.into())
    };
    ($msg:expr, $err:expr) => {
        $crate::errors::Error::General(format!("{}: {}", $msg, $err))
    };
}

/// Simplifies building a `Corrupt` error from a format string. Logs at
/// `error` level, since a structural check failing is always a boundary
/// worth a trace even when the caller recovers from it.
#[macro_export]
macro_rules! corrupt_err {
    ($msg:expr) => {{
        let msg = $msg;
        log::error!("corrupt data: {}", msg);
        Err($crate::errors::Error::Corrupt(msg.into()))
    }};
}
