use std::fmt;

use vellum_store::StoreError;

/// Error surface of the engine core.
///
/// Each kind has a stable numeric code and a fixed name; both are part of
/// the external contract and never change between releases.
#[derive(Debug)]
pub enum Error {
    /// Malformed input: unknown field, literal type mismatch, bad operator.
    Params(String),
    /// Pk collision on an insert-only path, or an incompatible reopen.
    Conflict(String),
    /// SQL parse error.
    Sql(String),
    /// Plan-time error.
    Query(String),
    /// Get-by-pk miss where the caller required presence.
    NotFound(String),
    /// Engine invariant violation. Always logged where raised.
    Logic(String),
    /// Too many outstanding result buffers.
    BufferLimit(String),
    /// Passthrough from the persistence collaborator.
    Io(String),
}

impl Error {
    pub fn code(&self) -> u32 {
        match self {
            Error::Params(_) => 1,
            Error::Conflict(_) => 2,
            Error::Sql(_) => 3,
            Error::Query(_) => 4,
            Error::NotFound(_) => 5,
            Error::Logic(_) => 6,
            Error::BufferLimit(_) => 7,
            Error::Io(_) => 8,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Error::Params(_) => "ErrParams",
            Error::Conflict(_) => "ErrConflict",
            Error::Sql(_) => "ErrSQL",
            Error::Query(_) => "ErrQuery",
            Error::NotFound(_) => "ErrNotFound",
            Error::Logic(_) => "ErrLogic",
            Error::BufferLimit(_) => "ErrBufferLimit",
            Error::Io(_) => "ErrIO",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::Params(m)
            | Error::Conflict(m)
            | Error::Sql(m)
            | Error::Query(m)
            | Error::NotFound(m)
            | Error::Logic(m)
            | Error::BufferLimit(m)
            | Error::Io(m) => m,
        }
    }

    /// Construct an invariant-violation error, logging it at the site.
    pub(crate) fn logic(msg: impl Into<String>) -> Error {
        let msg = msg.into();
        tracing::error!(target: "vellum", "invariant violation: {msg}");
        Error::Logic(msg)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind(), self.code(), self.message())
    }
}

impl std::error::Error for Error {}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<vellum_query::SqlError> for Error {
    fn from(e: vellum_query::SqlError) -> Self {
        Error::Sql(e.0)
    }
}

impl From<vellum_query::DslError> for Error {
    fn from(e: vellum_query::DslError) -> Self {
        Error::Params(e.0)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Params(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::Params("x".into()).code(), 1);
        assert_eq!(Error::Conflict("x".into()).code(), 2);
        assert_eq!(Error::Sql("x".into()).code(), 3);
        assert_eq!(Error::Query("x".into()).code(), 4);
        assert_eq!(Error::NotFound("x".into()).code(), 5);
        assert_eq!(Error::Logic("x".into()).code(), 6);
        assert_eq!(Error::BufferLimit("x".into()).code(), 7);
        assert_eq!(Error::Io("x".into()).code(), 8);
    }

    #[test]
    fn display_carries_kind_code_and_message() {
        let e = Error::Params("unknown field \"yr\"".into());
        assert_eq!(e.to_string(), "ErrParams (1): unknown field \"yr\"");
    }
}
