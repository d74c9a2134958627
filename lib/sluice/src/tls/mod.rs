//! TLS bucket pair: two coupled pipelines driving an external TLS engine.

pub mod engine;
pub mod pair;
pub mod verify;

use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

/// Well-known credential-store keys for the cached client certificate.
pub const CRED_CERT_PATH: &str = "sluice:tls:cert";
pub const CRED_CERT_PASSPHRASE: &str = "sluice:tls:certpw";

const INIT_UNINIT: u8 = 0;
const INIT_BUSY: u8 = 1;
const INIT_DONE: u8 = 2;

static INIT_STATE: AtomicU8 = AtomicU8::new(INIT_UNINIT);

/// Run process-wide TLS library initialization exactly once. Losers of the
/// race spin on the BUSY state so nobody proceeds before the libraries
/// finish loading.
pub fn global_init<F: FnOnce()>(init: F) {
    match INIT_STATE.compare_exchange(
        INIT_UNINIT,
        INIT_BUSY,
        Ordering::AcqRel,
        Ordering::Acquire,
    ) {
        Ok(_) => {
            init();
            INIT_STATE.store(INIT_DONE, Ordering::Release);
        }
        Err(_) => {
            while INIT_STATE.load(Ordering::Acquire) == INIT_BUSY {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_global_init_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::new();
        for _ in 0..8 {
            let count = Arc::clone(&count);
            workers.push(thread::spawn(move || {
                global_init(|| {
                    // Simulate a slow library load so racers land on BUSY.
                    thread::sleep(Duration::from_millis(5));
                    count.fetch_add(1, Ordering::SeqCst);
                });
                // Past the latch the side effect must be visible.
                assert_eq!(count.load(Ordering::SeqCst), 1);
            }));
        }

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
