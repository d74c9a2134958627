//! The seam between the bucket pair and an external TLS implementation.
//!
//! The engine owns the cryptography; the pipeline owns the byte plumbing.
//! During `encrypt`/`decrypt` the engine synchronously calls back into
//! [`EngineIo`] to source and sink ciphertext and to surface handshake
//! events, exactly the way a BIO-driven TLS library re-enters its caller.

/// Bitmask of certificate verification failures accumulated per peer
/// certificate.
pub mod cert_failure {
    pub const NOT_YET_VALID: u32 = 1 << 0;
    pub const EXPIRED: u32 = 1 << 1;
    pub const UNKNOWN_CA: u32 = 1 << 2;
    pub const SELF_SIGNED: u32 = 1 << 3;
    pub const REVOKED: u32 = 1 << 4;
    pub const INVALID_HOST: u32 = 1 << 5;
    pub const UNKNOWN: u32 = 1 << 6;
}

/// Bitmask of OCSP responder failures.
pub mod ocsp_failure {
    pub const RESPONDER_ERROR: u32 = 1 << 0;
    pub const TRY_LATER: u32 = 1 << 1;
    pub const UNKNOWN: u32 = 1 << 2;
}

/// Read-only view of a peer certificate, sufficient for hostname checks
/// and for user verification callbacks.
pub trait Certificate {
    /// The subject common name, when one is present.
    fn subject_common_name(&self) -> Option<&str>;

    /// DNS entries of the subjectAltName extension, in certificate order.
    fn alt_names(&self) -> &[String];
}

/// Why an engine call could not complete.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EngineError {
    /// The engine needs more inbound ciphertext before it can continue.
    WantRead,
    /// The engine produced ciphertext that must reach the peer first.
    WantWrite,
    /// The peer closed the TLS layer; check `received_shutdown`.
    ZeroReturn,
    /// The underlying transport failed; the real status travels through
    /// the side channel the `EngineIo` hooks recorded.
    Syscall,
    /// The peer requested a client certificate the engine does not hold.
    NeedClientCert,
    /// Unrecoverable protocol or library failure.
    Fatal,
}

pub type EngineResult<T> = ::std::result::Result<T, EngineError>;

/// Outcome of an `underlying_read` hook call.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum IoOutcome {
    Bytes(usize),
    /// Nothing available right now; the engine should retry later.
    WouldBlock,
    /// The transport reached its end.
    Closed,
}

/// Handshake lifecycle notifications.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum HandshakeEvent {
    Start,
    Done,
}

/// Hooks the engine calls while inside `encrypt`/`decrypt`. All calls
/// happen synchronously on the caller's thread; rich statuses that do not
/// fit the hook signatures are latched on the context by the hook
/// implementation and picked up after the engine returns.
pub trait EngineIo {
    /// Fill `buf` with inbound ciphertext.
    fn underlying_read(&mut self, buf: &mut [u8]) -> IoOutcome;

    /// Accept outbound ciphertext. Never fails: bytes are queued and
    /// drained by the encrypt bucket's consumer.
    fn underlying_write(&mut self, data: &[u8]);

    /// Handshake lifecycle, including renegotiation attempts.
    fn handshake_event(&mut self, event: HandshakeEvent);

    /// Verdict on a peer certificate the engine could not fully verify.
    /// `failures` carries [`cert_failure`] bits for this certificate;
    /// returning false rejects it.
    fn verify_cert(&mut self, cert: &dyn Certificate, failures: u32) -> bool;

    /// Verdict on a stapled OCSP response; `failures` carries
    /// [`ocsp_failure`] bits. Returning false rejects the session.
    fn ocsp_status(&mut self, failures: u32) -> bool;
}

/// An external TLS implementation driven through the bucket pair.
pub trait TlsEngine {
    /// Feed plaintext in; ciphertext comes out through
    /// `EngineIo::underlying_write`. Returns how much plaintext was
    /// consumed; zero consumed must be reported as an error, not `Ok(0)`.
    fn encrypt(&mut self, io: &mut dyn EngineIo, plain: &[u8]) -> EngineResult<usize>;

    /// Produce plaintext into `out`, pulling ciphertext through
    /// `EngineIo::underlying_read` as needed.
    fn decrypt(&mut self, io: &mut dyn EngineIo, out: &mut [u8]) -> EngineResult<usize>;

    /// True once the peer sent a close notification; distinguishes a clean
    /// TLS end from a torn connection after `ZeroReturn`.
    fn received_shutdown(&self) -> bool;

    /// Install a client certificate after `NeedClientCert`. Returns false
    /// when the engine rejects the credentials.
    fn supply_client_cert(&mut self, path: &str, passphrase: &str) -> bool;
}
