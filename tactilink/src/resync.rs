//! Bounded hard-reset and retry.
//!
//! One controller serves every operation: if an operation fails with an
//! error that leaves the line misaligned, the session is hard-reset and the
//! operation runs again, at most `max_retries` times.

use log::warn;

use crate::error::{Error, Result};
use crate::port::Port;
use crate::session::{Session, SessionState};

/// Retry policy around session operations.
#[derive(Debug, Clone)]
pub struct ResyncController {
    max_retries: u32,
    retries: u32,
    resets: u32,
}

impl ResyncController {
    /// Create a controller allowing `max_retries` retries per operation.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            retries: 0,
            resets: 0,
        }
    }

    /// Retries performed since creation.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Hard resets performed since creation.
    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Bring a desynced session back before a command goes out.
    pub fn ensure_aligned<P: Port>(&mut self, session: &mut Session<P>) -> Result<()> {
        match session.state() {
            SessionState::Aligned => Ok(()),
            SessionState::Desynced => self.reset(session),
            SessionState::Lost => Err(Error::SessionLost(
                "reopen the port to start a new session".into(),
            )),
        }
    }

    /// Run `op`, resynchronizing and retrying on desync.
    ///
    /// Device-reported errors and interruptions are returned as-is; the
    /// session stays desynced after an interruption and is reset on the
    /// next call.
    pub fn run<P, T, F>(&mut self, session: &mut Session<P>, what: &str, mut op: F) -> Result<T>
    where
        P: Port,
        F: FnMut(&mut Session<P>) -> Result<T>,
    {
        self.ensure_aligned(session)?;

        let mut attempt = 0;
        loop {
            match op(session) {
                Err(e) if e.needs_resync() && !matches!(e, Error::Interrupted) => {
                    if attempt >= self.max_retries {
                        return Err(e);
                    }
                    attempt += 1;
                    warn!(
                        "{what} failed ({e}); resynchronizing, retry {attempt}/{}",
                        self.max_retries
                    );
                    self.reset(session)?;
                    self.retries += 1;
                },
                result => return result,
            }
        }
    }

    fn reset<P: Port>(&mut self, session: &mut Session<P>) -> Result<()> {
        self.resets += 1;
        session.hard_reset()
    }
}
