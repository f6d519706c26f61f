/// Errors reported by the reactor and its TCP endpoints.
///
/// Every variant maps to a platform errno through [`Error::code`], so callers
/// that only care about success versus failure can treat the value as a
/// numeric status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("socket() failed: {}", errno_to_str(*.errno))]
    Create { errno: i32 },

    #[error("bind({addr}) failed: {}", errno_to_str(*.errno))]
    Bind { errno: i32, addr: String },

    #[error("listen(backlog={backlog}) failed: {}", errno_to_str(*.errno))]
    Listen { errno: i32, backlog: i32 },

    #[error("connect({addr}) failed: {}", errno_to_str(*.errno))]
    Connect { errno: i32, addr: String },

    #[error("accept() failed: {}", errno_to_str(*.errno))]
    Accept { errno: i32 },

    #[error("setsockopt({option}) failed: {}", errno_to_str(*.errno))]
    SetOption { errno: i32, option: &'static str },

    #[error("getsockopt({option}) failed: {}", errno_to_str(*.errno))]
    GetOption { errno: i32, option: &'static str },

    #[error("epoll_ctl() failed: {}", errno_to_str(*.errno))]
    Poll { errno: i32 },

    #[error("invalid address: {reason}")]
    InvalidAddress { reason: &'static str },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: &'static str },

    #[error("address family mismatch: socket is {socket}, target is {target}")]
    FamilyMismatch {
        socket: crate::AddressFamily,
        target: crate::AddressFamily,
    },

    #[error("endpoint was not initialized")]
    NotInitialized,

    #[error("endpoint is closed")]
    Closed,

    #[error("a connect is already in progress on this endpoint")]
    InProgress,

    #[error("endpoint is not listening")]
    NotListening,

    #[error("operation canceled")]
    Canceled,

    #[error("reactor has been dropped")]
    ReactorGone,
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the errno this error corresponds to. Never zero.
    pub fn code(&self) -> i32 {
        match self {
            Error::Create { errno }
            | Error::Bind { errno, .. }
            | Error::Listen { errno, .. }
            | Error::Connect { errno, .. }
            | Error::Accept { errno }
            | Error::SetOption { errno, .. }
            | Error::GetOption { errno, .. }
            | Error::Poll { errno } => *errno,
            Error::InvalidAddress { .. } | Error::InvalidArgument { .. } => libc::EINVAL,
            Error::FamilyMismatch { .. } => libc::EAFNOSUPPORT,
            Error::NotInitialized | Error::Closed => libc::EBADF,
            Error::InProgress => libc::EALREADY,
            Error::NotListening => libc::EINVAL,
            Error::Canceled => libc::ECANCELED,
            Error::ReactorGone => libc::ESHUTDOWN,
        }
    }

    /// Wraps a failed poller registration.
    pub(crate) fn poll(err: std::io::Error) -> Self {
        Error::Poll { errno: err.raw_os_error().unwrap_or(libc::EIO) }
    }
}

/// Returns current errno value.
#[inline]
pub fn errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

/// Converts errno to human-readable string.
fn errno_to_str(errno: i32) -> String {
    match errno {
        libc::EACCES => "permission denied".into(),
        libc::EADDRINUSE => "address already in use".into(),
        libc::EADDRNOTAVAIL => "address not available".into(),
        libc::EAFNOSUPPORT => "address family not supported".into(),
        libc::EAGAIN => "resource temporarily unavailable".into(),
        libc::EALREADY => "operation already in progress".into(),
        libc::EBADF => "bad file descriptor".into(),
        libc::ECANCELED => "operation canceled".into(),
        libc::ECONNREFUSED => "connection refused".into(),
        libc::ECONNRESET => "connection reset by peer".into(),
        libc::EHOSTUNREACH => "host unreachable".into(),
        libc::EINPROGRESS => "operation in progress".into(),
        libc::EINTR => "interrupted by signal".into(),
        libc::EINVAL => "invalid argument".into(),
        libc::EMFILE => "too many open files".into(),
        libc::ENETUNREACH => "network unreachable".into(),
        libc::ENOBUFS => "no buffer space available".into(),
        libc::ENOTCONN => "not connected".into(),
        libc::EPIPE => "broken pipe".into(),
        libc::ETIMEDOUT => "connection timed out".into(),
        _ => format!("errno {}", errno),
    }
}

/// Maps errno to std::io::ErrorKind.
fn errno_to_kind(errno: i32) -> std::io::ErrorKind {
    match errno {
        libc::EACCES | libc::EPERM => std::io::ErrorKind::PermissionDenied,
        libc::EADDRINUSE => std::io::ErrorKind::AddrInUse,
        libc::EADDRNOTAVAIL => std::io::ErrorKind::AddrNotAvailable,
        libc::EAGAIN => std::io::ErrorKind::WouldBlock,
        libc::ECONNREFUSED => std::io::ErrorKind::ConnectionRefused,
        libc::ECONNRESET => std::io::ErrorKind::ConnectionReset,
        libc::EINTR => std::io::ErrorKind::Interrupted,
        libc::EINVAL => std::io::ErrorKind::InvalidInput,
        libc::ENOTCONN => std::io::ErrorKind::NotConnected,
        libc::EPIPE => std::io::ErrorKind::BrokenPipe,
        libc::ETIMEDOUT => std::io::ErrorKind::TimedOut,
        _ => std::io::ErrorKind::Other,
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        std::io::Error::new(errno_to_kind(err.code()), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_never_zero() {
        let errors = [
            Error::Create { errno: libc::EMFILE },
            Error::InvalidAddress { reason: "x" },
            Error::NotInitialized,
            Error::InProgress,
            Error::Canceled,
            Error::ReactorGone,
        ];
        for err in errors {
            assert_ne!(err.code(), 0, "{err}");
        }
    }

    #[test]
    fn io_error_kind_follows_errno() {
        let err: std::io::Error = Error::Connect {
            errno: libc::ECONNREFUSED,
            addr: "127.0.0.1:1".into(),
        }
        .into();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused);
        assert!(err.to_string().contains("connection refused"));
    }
}
