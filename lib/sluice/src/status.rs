//! Status plumbing shared by every bucket operation.

use std::io;

/// Everything a read can signal besides bytes. `Wait` and `WaitConn` are
/// flow control, not failures: the pipeline is intact and the call should
/// be repeated once the underlying condition clears. Everything else kills
/// the bucket that returned it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Error {
    /// No data currently available; retry later.
    Wait,
    /// Progress requires the other end of the duplex to move first, e.g.
    /// TLS must write handshake bytes before it can decrypt more input.
    WaitConn,
    /// The peer closed before delivering the bytes it promised.
    TruncatedResponse,
    /// The status line or body framing could not be parsed.
    BadResponse,
    /// A header line without a colon.
    BadHeader,
    /// A logical line exceeded the line buffer limit.
    LineTooLong,
    /// The TLS engine could not be set up (missing credentials included).
    TlsSetup,
    /// The TLS engine failed mid-session.
    TlsComm,
    /// Peer certificate verification failed.
    TlsCert,
    /// The peer attempted a mid-connection renegotiation while pipelining.
    TlsRenegotiate,
    OcspResponderError,
    OcspResponderTryLater,
    OcspResponderUnknown,
    Io(io::ErrorKind),
}

impl Error {
    /// Stable numeric identity for callers that persist or compare codes.
    pub fn code(self) -> u32 {
        match self {
            Error::Wait => 1,
            Error::WaitConn => 2,
            Error::Io(_) => 3,
            Error::TruncatedResponse => 120_000,
            Error::BadResponse => 120_001,
            Error::LineTooLong => 120_002,
            Error::BadHeader => 120_003,
            Error::TlsSetup => 120_100,
            Error::TlsComm => 120_101,
            Error::TlsCert => 120_102,
            Error::TlsRenegotiate => 120_103,
            Error::OcspResponderError => 120_110,
            Error::OcspResponderTryLater => 120_111,
            Error::OcspResponderUnknown => 120_112,
        }
    }

    /// True for the flow-control statuses that merely mean "try again".
    #[inline]
    pub fn is_transient(self) -> bool {
        matches!(self, Error::Wait | Error::WaitConn)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => Error::Wait,
            kind => Error::Io(kind),
        }
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;
