use std::fmt;

/// How the supervisor should react to an error that ended a stage run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The process should stop serving. The supervisor returns without retrying.
    Fatal,

    /// The stage should be torn down and rebuilt after the restart backoff.
    Retryable,
}

impl ErrorKind {
    /// Returns true for [`ErrorKind::Fatal`].
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Fatal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Retryable => write!(f, "retryable"),
        }
    }
}
