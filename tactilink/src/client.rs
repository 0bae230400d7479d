//! Caller-facing client.
//!
//! [`Client`] composes a [`Session`] with a [`ResyncController`]: names are
//! validated before anything is sent, a desynced session is hard-reset
//! before the next command, and PUT/GET are retried once after a desync.

use std::path::Path;

use log::{info, warn};

use crate::config::ProtocolConfig;
use crate::error::Result;
use crate::port::Port;
use crate::protocol::address::{Bank, Key};
use crate::protocol::codec::{Entry, Space, StatusReport};
use crate::protocol::name::FileName;
use crate::resync::ResyncController;
use crate::session::Session;
use crate::sync::{self, ItemOutcome, NamingPolicy, PlannedUpload, SyncItem, SyncOptions, SyncReport};
use crate::transfer::PutSummary;
use crate::transport::Transport;

/// High-level file client for one device.
pub struct Client<P: Port> {
    session: Session<P>,
    resync: ResyncController,
}

#[cfg(feature = "native")]
impl Client<crate::port::NativePort> {
    /// Open `port_name` and enter data mode.
    pub fn open(port_name: &str, baud_rate: u32, config: ProtocolConfig) -> Result<Self> {
        Self::connect(Transport::open(port_name, baud_rate)?, config)
    }
}

impl<P: Port> Client<P> {
    /// Enter data mode over an open transport.
    pub fn connect(transport: Transport<P>, config: ProtocolConfig) -> Result<Self> {
        let resync = ResyncController::new(config.max_retries);
        let session = Session::enter(transport, config)?;
        Ok(Self { session, resync })
    }

    /// The underlying session.
    pub fn session(&self) -> &Session<P> {
        &self.session
    }

    /// Retries performed by the resync controller so far.
    pub fn retries(&self) -> u32 {
        self.resync.retries()
    }

    /// Query device status.
    pub fn status(&mut self) -> Result<StatusReport> {
        self.resync.ensure_aligned(&mut self.session)?;
        self.session.status()
    }

    /// Query storage capacity.
    pub fn stat(&mut self) -> Result<Space> {
        self.resync.ensure_aligned(&mut self.session)?;
        self.session.stat()
    }

    /// Enable or disable device writes.
    pub fn flag(&mut self, on: bool) -> Result<()> {
        self.resync.ensure_aligned(&mut self.session)?;
        self.session.flag(on)
    }

    /// List a directory; `None` if it does not exist.
    pub fn list(&mut self, bank: Bank, key: Key) -> Result<Option<Vec<Entry>>> {
        self.resync.ensure_aligned(&mut self.session)?;
        self.session.list(bank, key)
    }

    /// Upload `data` as `name`.
    pub fn put(&mut self, bank: Bank, key: Key, name: &str, data: &[u8]) -> Result<PutSummary> {
        self.put_with_progress(bank, key, name, data, |_, _| {})
    }

    /// Upload with a `(bytes_sent, total)` progress callback.
    pub fn put_with_progress<F>(
        &mut self,
        bank: Bank,
        key: Key,
        name: &str,
        data: &[u8],
        mut progress: F,
    ) -> Result<PutSummary>
    where
        F: FnMut(usize, usize),
    {
        let name = FileName::parse(name)?;
        self.resync.run(&mut self.session, "PUT", |session| {
            session.put_once(bank, key, &name, data, &mut progress)
        })
    }

    /// Download `name`.
    pub fn get(&mut self, bank: Bank, key: Key, name: &str) -> Result<Vec<u8>> {
        self.get_with_progress(bank, key, name, |_, _| {})
    }

    /// Download with a `(bytes_received, total)` progress callback.
    pub fn get_with_progress<F>(
        &mut self,
        bank: Bank,
        key: Key,
        name: &str,
        mut progress: F,
    ) -> Result<Vec<u8>>
    where
        F: FnMut(usize, usize),
    {
        let name = FileName::parse(name)?;
        self.resync.run(&mut self.session, "GET", |session| {
            session.get_once(bank, key, &name, &mut progress)
        })
    }

    /// Delete `name`; `false` if it did not exist.
    pub fn delete(&mut self, bank: Bank, key: Key, name: &str) -> Result<bool> {
        let name = FileName::parse(name)?;
        self.resync.ensure_aligned(&mut self.session)?;
        self.session.delete(bank, key, &name)
    }

    /// Sync `folder/*.<ext>` as `001.<ext>`, `002.<ext>`, ... from `start`.
    pub fn sync_sequential(
        &mut self,
        bank: Bank,
        key: Key,
        folder: &Path,
        ext: &str,
        start: u32,
        options: SyncOptions,
    ) -> Result<SyncReport> {
        let policy = NamingPolicy::Sequential { start };
        self.sync_folder(bank, key, folder, ext, policy, options, |_, _, _| {})
    }

    /// Sync `folder/*.<ext>` keeping the local names.
    pub fn sync_preserve(
        &mut self,
        bank: Bank,
        key: Key,
        folder: &Path,
        ext: &str,
        options: SyncOptions,
    ) -> Result<SyncReport> {
        let policy = NamingPolicy::Preserve;
        self.sync_folder(bank, key, folder, ext, policy, options, |_, _, _| {})
    }

    /// Plan and run a sync.
    ///
    /// `on_item(index, total, upload)` is called before each scheduled
    /// upload. Listing or scanning failures abort the run; per-item upload
    /// failures are recorded in the report.
    #[allow(clippy::too_many_arguments)]
    pub fn sync_folder<F>(
        &mut self,
        bank: Bank,
        key: Key,
        folder: &Path,
        ext: &str,
        policy: NamingPolicy,
        options: SyncOptions,
        mut on_item: F,
    ) -> Result<SyncReport>
    where
        F: FnMut(usize, usize, &PlannedUpload),
    {
        let locals = sync::scan_local(folder, ext)?;
        let remote = self.list(bank, key)?.unwrap_or_default();
        let plan = sync::plan(locals, &remote, policy, ext);
        info!(
            "Sync {bank}/{key}: {} to upload, {} up to date, {} rejected",
            plan.uploads.len(),
            plan.up_to_date.len(),
            plan.rejected.len()
        );

        let mut report = SyncReport {
            up_to_date: plan.up_to_date,
            rejected: plan.rejected,
            ..SyncReport::default()
        };

        let total = plan.uploads.len();
        for (index, upload) in plan.uploads.into_iter().enumerate() {
            if options.dry_run {
                report.items.push(SyncItem {
                    upload,
                    outcome: ItemOutcome::Planned,
                });
                continue;
            }
            if crate::is_interrupted_requested() {
                report.interrupted = true;
                break;
            }

            on_item(index, total, &upload);
            let outcome = match self.upload_file(bank, key, &upload) {
                Ok(()) => ItemOutcome::Uploaded,
                Err(e) => {
                    warn!("{} -> {}: {e}", upload.local.name, upload.remote);
                    ItemOutcome::Failed(e)
                },
            };
            let failed = matches!(outcome, ItemOutcome::Failed(_));
            report.items.push(SyncItem { upload, outcome });
            if failed && options.stop_on_error {
                break;
            }
        }
        Ok(report)
    }

    fn upload_file(&mut self, bank: Bank, key: Key, upload: &PlannedUpload) -> Result<()> {
        let data = std::fs::read(&upload.local.path)?;
        let name = &upload.remote;
        self.resync.run(&mut self.session, "PUT", |session| {
            session.put_once(bank, key, name, &data, |_, _| {})
        })?;
        Ok(())
    }

    /// Leave data mode and release the transport.
    pub fn close(self) -> Transport<P> {
        self.session.exit()
    }
}
