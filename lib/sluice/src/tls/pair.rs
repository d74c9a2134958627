//! The encrypt/decrypt bucket pair sharing one TLS context.
//!
//! The encrypt bucket reads plaintext from a request stream and yields
//! ciphertext; the decrypt bucket reads ciphertext from the transport and
//! yields plaintext. Both drive the same engine, which re-enters the
//! context through [`EngineIo`] while a call is in flight. Statuses that
//! do not fit the hook signatures travel through side channels on the
//! context (`crypt_status`, `pending_err`) and are picked up after the
//! engine returns.

use crate::bucket::aggregate::AggregateBucket;
use crate::bucket::databuf::{DataBuf, FillFn};
use crate::bucket::simple::SimpleBucket;
use crate::bucket::{Bucket, Chunk, Fill, Line};
use crate::buffer::Buffer;
use crate::status::{Error, Result};
use crate::tls::engine::{
    cert_failure, ocsp_failure, Certificate, EngineError, EngineIo, HandshakeEvent, IoOutcome,
    TlsEngine,
};
use crate::tls::{verify, CRED_CERT_PASSPHRASE, CRED_CERT_PATH};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use weir::config::Config;
use weir::creds::CredStore;
use weir::logging::{self, debug, trace, Logger};

pub type VerifyCallback<'a> = Box<dyn FnMut(u32, &dyn Certificate) -> bool + 'a>;
pub type OcspCallback<'a> = Box<dyn FnMut(u32) -> bool + 'a>;
pub type CertPathCallback<'a> = Box<dyn FnMut() -> Option<String> + 'a>;
pub type CertPassphraseCallback<'a> = Box<dyn FnMut(&str) -> Option<String> + 'a>;

const PENDING_SIZE: usize = 65536;
const MAX_PULL_VECS: usize = 16;
// One retry after supplying a certificate; a second demand means the
// engine rejected what we gave it.
const CERT_ATTEMPTS: usize = 2;

struct EncryptSide<'a> {
    /// Active plaintext stream. An aggregate so rejected bytes can be
    /// pushed back onto the head for the next attempt.
    source: AggregateBucket<'a>,
    /// Ciphertext the engine produced that the consumer has not drained.
    pending: Buffer,
    /// Further logical streams queued behind the active one.
    stream_next: VecDeque<Box<dyn Bucket + 'a>>,
}

struct DecryptSide<'a> {
    /// Inbound ciphertext from the transport.
    source: Box<dyn Bucket + 'a>,
}

/// State shared by the two buckets. Held behind `Rc`; the last bucket
/// dropped releases the engine.
pub struct TlsContext<'a> {
    engine: Box<dyn TlsEngine + 'a>,
    encrypt: EncryptSide<'a>,
    decrypt: DecryptSide<'a>,

    hostname: Option<String>,
    config: Config,

    // Side channels written by the EngineIo hooks.
    crypt_status: Option<Error>,
    pending_err: Option<Error>,
    fatal_err: Option<Error>,
    want_read: bool,
    renegotiating: bool,
    handshake_done: bool,

    verify_cb: Option<VerifyCallback<'a>>,
    ocsp_cb: Option<OcspCallback<'a>>,
    cert_path_cb: Option<CertPathCallback<'a>>,
    cert_pw_cb: Option<CertPassphraseCallback<'a>>,
    creds: Option<Box<dyn CredStore + 'a>>,
    cache_tried: bool,

    log: Logger,
}

/// The hooks handed to the engine for the duration of one call. Borrows
/// disjoint pieces of the context so the engine can re-enter while the
/// owning call is still on the stack.
struct SideIo<'s, 'a> {
    decrypt_source: &'s mut Box<dyn Bucket + 'a>,
    pending: &'s mut Buffer,
    crypt_status: &'s mut Option<Error>,
    pending_err: &'s mut Option<Error>,
    fatal_err: &'s mut Option<Error>,
    want_read: &'s mut bool,
    renegotiating: &'s mut bool,
    handshake_done: &'s mut bool,
    detect_renegotiation: bool,
    hostname: Option<&'s str>,
    verify_cb: &'s mut Option<VerifyCallback<'a>>,
    ocsp_cb: &'s mut Option<OcspCallback<'a>>,
    log: &'s Logger,
}

impl<'s, 'a> EngineIo for SideIo<'s, 'a> {
    fn underlying_read(&mut self, buf: &mut [u8]) -> IoOutcome {
        if *self.renegotiating {
            // Break the engine out of its loop; the latched error is
            // surfaced after it returns.
            return IoOutcome::WouldBlock;
        }

        match self.decrypt_source.read(buf.len()) {
            Ok(chunk) => {
                let count = chunk.data.len();
                buf[..count].copy_from_slice(chunk.data);
                *self.crypt_status = None;

                if count > 0 {
                    *self.want_read = false;
                    return IoOutcome::Bytes(count);
                }
                match chunk.fill {
                    Fill::Eof => IoOutcome::Closed,
                    Fill::More => IoOutcome::WouldBlock,
                }
            }
            Err(err) => {
                trace!(self.log, "inbound stalled"; "context" => "underlying_read",
                       "status" => ?err);
                *self.crypt_status = Some(err);
                IoOutcome::WouldBlock
            }
        }
    }

    fn underlying_write(&mut self, data: &[u8]) {
        if *self.renegotiating {
            return;
        }
        self.pending.push_bytes(data);
        trace!(self.log, "ciphertext queued"; "context" => "underlying_write",
               "count" => data.len(), "pending" => self.pending.len());
    }

    fn handshake_event(&mut self, event: HandshakeEvent) {
        match event {
            HandshakeEvent::Start => {
                if *self.handshake_done && self.detect_renegotiation {
                    debug!(self.log, "mid-connection renegotiation rejected";
                           "context" => "handshake_event");
                    *self.renegotiating = true;
                    *self.fatal_err = Some(Error::TlsRenegotiate);
                }
            }
            HandshakeEvent::Done => *self.handshake_done = true,
        }
    }

    fn verify_cert(&mut self, cert: &dyn Certificate, failures: u32) -> bool {
        let mut failures = failures;
        if let Some(hostname) = self.hostname {
            if !verify::matches_hostname(cert, hostname) {
                failures |= cert_failure::INVALID_HOST;
            }
        }

        if failures == 0 {
            return true;
        }

        debug!(self.log, "certificate failed verification";
               "context" => "verify_cert", "failures" => failures);

        let accepted = match &mut self.verify_cb {
            Some(callback) => callback(failures, cert),
            None => false,
        };
        if !accepted {
            *self.pending_err = Some(Error::TlsCert);
        }
        accepted
    }

    fn ocsp_status(&mut self, failures: u32) -> bool {
        if failures == 0 {
            return true;
        }

        let accepted = match &mut self.ocsp_cb {
            Some(callback) => callback(failures),
            None => false,
        };
        if !accepted {
            *self.pending_err = Some(map_ocsp(failures));
        }
        accepted
    }
}

fn map_ocsp(failures: u32) -> Error {
    if failures & ocsp_failure::RESPONDER_ERROR != 0 {
        Error::OcspResponderError
    } else if failures & ocsp_failure::TRY_LATER != 0 {
        Error::OcspResponderTryLater
    } else {
        Error::OcspResponderUnknown
    }
}

impl<'a> TlsContext<'a> {
    /// Split the context into the engine and the hook surface it re-enters
    /// through. Field-disjoint borrows, so the engine can call the hooks
    /// while the owning call is on the stack.
    fn split(&mut self, detect: bool) -> (&mut (dyn TlsEngine + 'a), SideIo<'_, 'a>) {
        let TlsContext {
            engine,
            encrypt,
            decrypt,
            crypt_status,
            pending_err,
            fatal_err,
            want_read,
            renegotiating,
            handshake_done,
            hostname,
            verify_cb,
            ocsp_cb,
            log,
            ..
        } = self;

        (
            engine.as_mut(),
            SideIo {
                decrypt_source: &mut decrypt.source,
                pending: &mut encrypt.pending,
                crypt_status,
                pending_err,
                fatal_err,
                want_read,
                renegotiating,
                handshake_done,
                detect_renegotiation: detect,
                hostname: hostname.as_deref(),
                verify_cb,
                ocsp_cb,
                log,
            },
        )
    }

    /// Produce ciphertext into `out`: drain pending engine output first,
    /// otherwise pull plaintext from the source stream and feed it to the
    /// engine.
    fn encrypt_some(&mut self, out: &mut [u8]) -> Result<(usize, Fill)> {
        if let Some(err) = self.fatal_err {
            return Err(err);
        }

        let mut cert_rounds = 0;
        loop {
            // Already-produced ciphertext always goes out first.
            if !self.encrypt.pending.is_empty() {
                let take = out.len().min(self.encrypt.pending.len());
                out[..take].copy_from_slice(&self.encrypt.pending.read_slice()[..take]);
                self.encrypt.pending.move_head(take);
                return Ok((take, Fill::More));
            }

            // Pull plaintext unless the engine first needs inbound bytes;
            // an empty write still lets it progress the handshake.
            let plain = if self.want_read {
                Vec::new()
            } else {
                match self.pull_plaintext()? {
                    Some(plain) => plain,
                    // Active stream exhausted and replaced; go around.
                    None => continue,
                }
            };

            let source_done = plain.is_empty() && !self.want_read;
            if source_done && self.encrypt.stream_next.is_empty() && self.encrypt.source.child_count() == 0 {
                return Ok((0, Fill::Eof));
            }

            let detect = self.config.pipelining.enabled();
            let outcome = {
                let (engine, mut io) = self.split(detect);
                engine.encrypt(&mut io, &plain)
            };

            if let Some(err) = self.fatal_err {
                return Err(err);
            }

            match outcome {
                Ok(consumed) => {
                    if consumed < plain.len() {
                        // The engine rejected part of the write; the next
                        // attempt must retry the same bytes.
                        self.encrypt
                            .source
                            .prepend(Box::new(SimpleBucket::copied(&plain[consumed..])));
                    }
                    if consumed == 0 && self.encrypt.pending.is_empty() {
                        return Err(Error::Wait);
                    }
                }
                Err(EngineError::WantRead) => {
                    self.push_back(plain);
                    self.want_read = true;
                    if self.encrypt.pending.is_empty() {
                        return Err(Error::WaitConn);
                    }
                }
                Err(EngineError::WantWrite) => {
                    self.push_back(plain);
                    if self.encrypt.pending.is_empty() {
                        return Err(Error::WaitConn);
                    }
                }
                Err(EngineError::ZeroReturn) => return Ok((0, Fill::Eof)),
                Err(EngineError::Syscall) => {
                    self.push_back(plain);
                    return Err(self.take_crypt_status());
                }
                Err(EngineError::NeedClientCert) => {
                    self.push_back(plain);
                    cert_rounds += 1;
                    if cert_rounds > CERT_ATTEMPTS {
                        self.fatal_err = Some(Error::TlsSetup);
                        return Err(Error::TlsSetup);
                    }
                    self.provide_client_cert()?;
                }
                Err(EngineError::Fatal) => return Err(self.take_fatal()),
            }
        }
    }

    /// Produce plaintext into `out` with one engine read.
    fn decrypt_some(&mut self, out: &mut [u8]) -> Result<(usize, Fill)> {
        if let Some(err) = self.fatal_err {
            return Err(err);
        }

        let mut cert_rounds = 0;
        loop {
            let detect = self.config.pipelining.enabled();
            let outcome = {
                let (engine, mut io) = self.split(detect);
                engine.decrypt(&mut io, out)
            };

            if let Some(err) = self.fatal_err {
                return Err(err);
            }

            return match outcome {
                Ok(count) => Ok((count, Fill::More)),
                Err(EngineError::ZeroReturn) => {
                    if self.engine.received_shutdown() {
                        Ok((0, Fill::Eof))
                    } else {
                        self.fatal_err = Some(Error::TlsComm);
                        Err(Error::TlsComm)
                    }
                }
                // The caller must feed the transport (or drain the
                // encrypt side) and come back.
                Err(EngineError::WantRead) | Err(EngineError::WantWrite) => Err(Error::Wait),
                Err(EngineError::Syscall) => Err(self.take_crypt_status()),
                Err(EngineError::NeedClientCert) => {
                    cert_rounds += 1;
                    if cert_rounds > CERT_ATTEMPTS {
                        self.fatal_err = Some(Error::TlsSetup);
                        return Err(Error::TlsSetup);
                    }
                    self.provide_client_cert()?;
                    continue;
                }
                Err(EngineError::Fatal) => Err(self.take_fatal()),
            };
        }
    }

    /// Flatten one `read_iovec` pull from the active source. `None` means
    /// the active stream ended and the next queued stream was promoted.
    fn pull_plaintext(&mut self) -> Result<Option<Vec<u8>>> {
        let pull = self.config.read_chunk;
        let vecs = self.encrypt.source.read_iovec(pull, MAX_PULL_VECS)?;

        let mut plain = Vec::with_capacity(vecs.vecs.iter().map(|vec| vec.len()).sum());
        for vec in &vecs.vecs {
            plain.extend_from_slice(vec);
        }

        if plain.is_empty() && vecs.fill == Fill::Eof {
            if let Some(next) = self.encrypt.stream_next.pop_front() {
                debug!(self.log, "promoting queued stream";
                       "context" => "pull_plaintext",
                       "queued" => self.encrypt.stream_next.len());
                let mut source = AggregateBucket::new();
                source.append(next);
                self.encrypt.source = source;
                self.encrypt.pending = Buffer::new(PENDING_SIZE);
                return Ok(None);
            }
        }

        Ok(Some(plain))
    }

    /// Return unconsumed plaintext to the head of the source stream.
    fn push_back(&mut self, plain: Vec<u8>) {
        if !plain.is_empty() {
            self.encrypt
                .source
                .prepend(Box::new(SimpleBucket::owned(plain)));
        }
    }

    fn take_crypt_status(&mut self) -> Error {
        let status = self.crypt_status.take().unwrap_or(Error::TlsComm);
        if !status.is_transient() {
            self.fatal_err = Some(status);
        }
        status
    }

    fn take_fatal(&mut self) -> Error {
        match self.pending_err.take() {
            Some(err) => err,
            None => {
                self.fatal_err = Some(Error::TlsComm);
                Error::TlsComm
            }
        }
    }

    /// Drive the client-certificate callback chain: cached identity
    /// first, then `path -> passphrase` prompts, caching on success.
    fn provide_client_cert(&mut self) -> Result<()> {
        if !self.cache_tried {
            self.cache_tried = true;

            let cached = match &self.creds {
                Some(creds) => match (creds.get(CRED_CERT_PATH), creds.get(CRED_CERT_PASSPHRASE)) {
                    (Some(path), Some(passphrase)) => Some((path, passphrase)),
                    _ => None,
                },
                None => None,
            };

            if let Some((path, passphrase)) = cached {
                if self.engine.supply_client_cert(&path, &passphrase) {
                    return Ok(());
                }
                debug!(self.log, "cached client identity rejected";
                       "context" => "provide_client_cert");
                if let Some(creds) = &mut self.creds {
                    creds.remove(CRED_CERT_PATH);
                    creds.remove(CRED_CERT_PASSPHRASE);
                }
            }
        }

        let path = match &mut self.cert_path_cb {
            Some(callback) => callback().ok_or(Error::TlsSetup)?,
            None => {
                self.fatal_err = Some(Error::TlsSetup);
                return Err(Error::TlsSetup);
            }
        };
        let passphrase = match &mut self.cert_pw_cb {
            Some(callback) => callback(&path).ok_or(Error::TlsSetup)?,
            None => String::new(),
        };

        if !self.engine.supply_client_cert(&path, &passphrase) {
            return Err(Error::TlsCert);
        }

        if let Some(creds) = &mut self.creds {
            creds.put(CRED_CERT_PATH, path);
            creds.put(CRED_CERT_PASSPHRASE, passphrase);
        }
        Ok(())
    }
}

/// Configures and builds a TLS bucket pair.
pub struct TlsBuilder<'a> {
    engine: Box<dyn TlsEngine + 'a>,
    hostname: Option<String>,
    config: Config,
    verify_cb: Option<VerifyCallback<'a>>,
    ocsp_cb: Option<OcspCallback<'a>>,
    cert_path_cb: Option<CertPathCallback<'a>>,
    cert_pw_cb: Option<CertPassphraseCallback<'a>>,
    creds: Option<Box<dyn CredStore + 'a>>,
    log: Logger,
}

impl<'a> TlsBuilder<'a> {
    pub fn new(engine: Box<dyn TlsEngine + 'a>) -> TlsBuilder<'a> {
        TlsBuilder {
            engine,
            hostname: None,
            config: Config::default(),
            verify_cb: None,
            ocsp_cb: None,
            cert_path_cb: None,
            cert_pw_cb: None,
            creds: None,
            log: logging::discard(),
        }
    }

    /// Expected peer identity; enables the hostname check during
    /// verification.
    pub fn hostname(mut self, hostname: &str) -> Self {
        self.hostname = Some(hostname.to_owned());
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn verify_callback(mut self, callback: VerifyCallback<'a>) -> Self {
        self.verify_cb = Some(callback);
        self
    }

    pub fn ocsp_callback(mut self, callback: OcspCallback<'a>) -> Self {
        self.ocsp_cb = Some(callback);
        self
    }

    pub fn cert_path_callback(mut self, callback: CertPathCallback<'a>) -> Self {
        self.cert_path_cb = Some(callback);
        self
    }

    pub fn cert_passphrase_callback(mut self, callback: CertPassphraseCallback<'a>) -> Self {
        self.cert_pw_cb = Some(callback);
        self
    }

    pub fn cred_store(mut self, creds: Box<dyn CredStore + 'a>) -> Self {
        self.creds = Some(creds);
        self
    }

    pub fn logger(mut self, log: &Logger) -> Self {
        self.log = logging::child(log);
        self
    }

    /// Bridge the engine between the two streams: `decrypt_source`
    /// supplies inbound ciphertext, `encrypt_source` supplies outbound
    /// plaintext.
    pub fn build(
        self,
        decrypt_source: Box<dyn Bucket + 'a>,
        encrypt_source: Box<dyn Bucket + 'a>,
    ) -> (TlsEncryptBucket<'a>, TlsDecryptBucket<'a>) {
        let mut source = AggregateBucket::new();
        source.append(encrypt_source);

        let context = Rc::new(RefCell::new(TlsContext {
            engine: self.engine,
            encrypt: EncryptSide {
                source,
                pending: Buffer::new(PENDING_SIZE),
                stream_next: VecDeque::new(),
            },
            decrypt: DecryptSide {
                source: decrypt_source,
            },
            hostname: self.hostname,
            config: self.config,
            crypt_status: None,
            pending_err: None,
            fatal_err: None,
            want_read: false,
            renegotiating: false,
            handshake_done: false,
            verify_cb: self.verify_cb,
            ocsp_cb: self.ocsp_cb,
            cert_path_cb: self.cert_path_cb,
            cert_pw_cb: self.cert_pw_cb,
            creds: self.creds,
            cache_tried: false,
            log: self.log,
        }));

        let encrypt_ctx = Rc::clone(&context);
        let encrypt_fill: FillFn<'a> =
            Box::new(move |buf| encrypt_ctx.borrow_mut().encrypt_some(buf));

        let decrypt_ctx = Rc::clone(&context);
        let decrypt_fill: FillFn<'a> =
            Box::new(move |buf| decrypt_ctx.borrow_mut().decrypt_some(buf));

        (
            TlsEncryptBucket {
                ctx: Rc::clone(&context),
                databuf: DataBuf::new(encrypt_fill),
            },
            TlsDecryptBucket {
                ctx: context,
                databuf: DataBuf::new(decrypt_fill),
            },
        )
    }
}

/// Yields ciphertext for the transport to send.
pub struct TlsEncryptBucket<'a> {
    ctx: Rc<RefCell<TlsContext<'a>>>,
    databuf: DataBuf<FillFn<'a>>,
}

impl<'a> TlsEncryptBucket<'a> {
    /// Queue another logical plaintext stream behind the active one.
    /// Message boundaries are preserved: the new stream starts after the
    /// active one ends, with a fresh pending queue.
    pub fn append_stream(&mut self, stream: Box<dyn Bucket + 'a>) {
        self.ctx.borrow_mut().encrypt.stream_next.push_back(stream);
    }
}

impl<'a> Bucket for TlsEncryptBucket<'a> {
    fn read(&mut self, max: usize) -> Result<Chunk<'_>> {
        self.databuf.read(max)
    }

    fn readline(&mut self, accept: u8) -> Result<Line<'_>> {
        self.databuf.readline(accept)
    }

    fn peek(&mut self) -> Result<Chunk<'_>> {
        self.databuf.peek()
    }

    fn set_config(&mut self, config: &Config) {
        let mut ctx = self.ctx.borrow_mut();
        ctx.config = *config;
        ctx.encrypt.source.set_config(config);
        ctx.decrypt.source.set_config(config);
    }
}

/// Yields decrypted plaintext to the consumer.
pub struct TlsDecryptBucket<'a> {
    ctx: Rc<RefCell<TlsContext<'a>>>,
    databuf: DataBuf<FillFn<'a>>,
}

impl<'a> Bucket for TlsDecryptBucket<'a> {
    fn read(&mut self, max: usize) -> Result<Chunk<'_>> {
        self.databuf.read(max)
    }

    fn readline(&mut self, accept: u8) -> Result<Line<'_>> {
        self.databuf.readline(accept)
    }

    fn peek(&mut self) -> Result<Chunk<'_>> {
        self.databuf.peek()
    }

    fn set_config(&mut self, config: &Config) {
        let mut ctx = self.ctx.borrow_mut();
        ctx.config = *config;
        ctx.encrypt.source.set_config(config);
        ctx.decrypt.source.set_config(config);
    }
}
