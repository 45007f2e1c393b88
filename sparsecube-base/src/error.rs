// Every failure in the engine funnels through here so that:
// 1. it carries a backtrace from the point it was created,
// 2. there is one place to set a breakpoint to trap any error,
// 3. it is emitted into the tracing system exactly once.
//
// Callers mostly only care whether something is corruption (an internal
// error) or an arithmetic capacity limit, so errors carry a coarse kind.

use backtrace_error::DynBacktraceError;
use std::borrow::Cow;
use tracing::error;

#[cfg(test)]
use test_log::test;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum ErrorKind {
    /// Encoding corruption, malformed input or a broken internal invariant.
    Internal,
    /// A count or distance does not fit its integer width.
    Capacity,
    /// Wrapped error from a library or the OS.
    External,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    inner: DynBacktraceError,
}
pub type Result<T> = std::result::Result<T, Error>;

struct SimpleErr(Cow<'static, str>);
impl std::fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(ErrorKind::External, err)
    }
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(kind: ErrorKind, err: E) -> Error {
        error!(target: "sparsecube", "{:?}: {:?}", kind, err);
        let inner = DynBacktraceError::from(err);
        Error { kind, inner }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_capacity(&self) -> bool {
        self.kind == ErrorKind::Capacity
    }
}

pub fn err(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(ErrorKind::Internal, SimpleErr(msg.into()))
}

pub fn capacity_err(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(ErrorKind::Capacity, SimpleErr(msg.into()))
}

#[test]
fn test_error_kinds() {
    assert_eq!(err("unknown instruction").kind(), ErrorKind::Internal);
    assert!(capacity_err("too many generated constant values").is_capacity());
    let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
    let e: Error = io.into();
    assert_eq!(e.kind(), ErrorKind::External);
}
