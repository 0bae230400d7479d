//! Folder-to-directory sync planning.
//!
//! A plan compares local files against a remote listing by target name and
//! schedules an upload only when the remote entry is missing or its size
//! differs. Sizes are the only thing compared.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::protocol::codec::Entry;
use crate::protocol::name::FileName;

/// A local file considered for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Full path.
    pub path: PathBuf,
    /// File name as found on disk.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// How target names are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingPolicy {
    /// `001.<ext>`, `002.<ext>`, ... starting at `start`, in local sort order.
    Sequential {
        /// Number given to the first local file.
        start: u32,
    },
    /// The local name, normalized to 8.3.
    Preserve,
}

/// One scheduled upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpload {
    /// Source file.
    pub local: LocalFile,
    /// Target name on the device.
    pub remote: FileName,
    /// Size of the existing remote file, if any.
    pub remote_size: Option<u64>,
}

/// A local file that already matches its remote counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpToDate {
    /// Source file.
    pub local: LocalFile,
    /// Matching remote name.
    pub remote: FileName,
}

/// A local file that cannot be synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    /// Source file.
    pub local: LocalFile,
    /// Why.
    pub reason: String,
}

/// Result of planning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Uploads to perform, in order.
    pub uploads: Vec<PlannedUpload>,
    /// Files already present with the same size.
    pub up_to_date: Vec<UpToDate>,
    /// Files whose target name is not representable.
    pub rejected: Vec<Rejected>,
}

/// Outcome of one planned upload.
#[derive(Debug)]
pub enum ItemOutcome {
    /// Uploaded successfully.
    Uploaded,
    /// Dry run: would be uploaded.
    Planned,
    /// Upload failed.
    Failed(Error),
}

/// One item of a sync run.
#[derive(Debug)]
pub struct SyncItem {
    /// What was planned.
    pub upload: PlannedUpload,
    /// What happened.
    pub outcome: ItemOutcome,
}

/// Result of a sync run.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Scheduled items with their outcomes.
    pub items: Vec<SyncItem>,
    /// Files that needed no upload.
    pub up_to_date: Vec<UpToDate>,
    /// Files that could not be mapped to a target name.
    pub rejected: Vec<Rejected>,
    /// The run stopped early on an interrupt request.
    pub interrupted: bool,
}

impl SyncReport {
    /// Successful uploads.
    pub fn uploaded(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Uploaded))
    }

    /// Failed uploads.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed(_)))
    }

    /// Uploads reported by a dry run.
    pub fn planned(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Planned))
    }

    /// Whether every attempted item succeeded and nothing was rejected.
    pub fn is_clean(&self) -> bool {
        self.failed() == 0 && self.rejected.is_empty() && !self.interrupted
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.outcome)).count()
    }
}

/// Options for a sync run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Report the plan without uploading.
    pub dry_run: bool,
    /// Stop at the first failed item.
    pub stop_on_error: bool,
}

/// Extension without a leading dot.
fn bare_ext(ext: &str) -> &str {
    ext.trim().trim_start_matches('.')
}

/// Collect `*.<ext>` files directly inside `folder`, sorted by name.
///
/// The extension match is case-insensitive; subdirectories are not entered.
pub fn scan_local(folder: &Path, ext: &str) -> Result<Vec<LocalFile>> {
    let ext = bare_ext(ext);
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if !matches {
            continue;
        }
        files.push(LocalFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            path,
            size: meta.len(),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    debug!("Found {} *.{ext} file(s) in {}", files.len(), folder.display());
    Ok(files)
}

/// Target name for the file at `index` in local order.
fn target_name(local: &LocalFile, index: usize, policy: NamingPolicy, ext: &str) -> Result<FileName> {
    match policy {
        NamingPolicy::Sequential { start } => {
            let number = u64::from(start) + index as u64;
            FileName::parse(&format!("{number:03}.{}", bare_ext(ext)))
        },
        NamingPolicy::Preserve => FileName::parse(&local.name),
    }
}

/// Build a sync plan.
///
/// `remote` is the current listing of the target directory (empty when it
/// does not exist yet). Remote names are compared case-insensitively.
pub fn plan(locals: Vec<LocalFile>, remote: &[Entry], policy: NamingPolicy, ext: &str) -> SyncPlan {
    let remote_sizes: HashMap<String, u64> = remote
        .iter()
        .map(|e| (e.name.to_ascii_uppercase(), e.size))
        .collect();

    let mut result = SyncPlan::default();
    let mut targets = HashSet::new();

    for (index, local) in locals.into_iter().enumerate() {
        let remote_name = match target_name(&local, index, policy, ext) {
            Ok(name) => name,
            Err(e) => {
                result.rejected.push(Rejected {
                    reason: e.to_string(),
                    local,
                });
                continue;
            },
        };
        if !targets.insert(remote_name.clone()) {
            result.rejected.push(Rejected {
                reason: format!("target name {remote_name} already used by another file"),
                local,
            });
            continue;
        }

        let remote_size = remote_sizes.get(remote_name.as_str()).copied();
        if remote_size == Some(local.size) {
            result.up_to_date.push(UpToDate {
                local,
                remote: remote_name,
            });
        } else {
            result.uploads.push(PlannedUpload {
                local,
                remote: remote_name,
                remote_size,
            });
        }
    }
    result
}
