//! StorageProvider port (spec.md §4.1, C1): everything the core pipeline
//! needs from a remote cloud drive, with OAuth and the concrete client
//! left to the caller (out of scope per spec.md §1).

mod local_fs;

pub use local_fs::LocalFsStorageProvider;

use crate::errors::CoreError;
use crate::types::File;
use std::io::Read;
use std::time::Duration;

/// One page of a folder listing.
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub files: Vec<File>,
    pub next_page_token: Option<String>,
}

/// A byte stream for a single file's content. Not assumed restartable by
/// the provider; callers that need to retry re-open via `download`.
pub type DownloadStream = Box<dyn Read + Send>;

/// Run `f` on a scoped thread and fail it with `CoreError::TransientProvider`
/// if it hasn't returned within `timeout_secs` (spec.md §5: "provider calls
/// have a per-call timeout, configurable, default 30s"). The thread is
/// abandoned, not killed, if it times out; callers only see the error.
pub fn with_timeout<T: Send>(
    timeout_secs: u64,
    f: impl FnOnce() -> Result<T, CoreError> + Send,
) -> Result<T, CoreError> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::scope(|scope| {
        scope.spawn(|| {
            let _ = tx.send(f());
        });
        match rx.recv_timeout(Duration::from_secs(timeout_secs)) {
            Ok(result) => result,
            Err(_) => Err(CoreError::TransientProvider(format!(
                "provider call exceeded {timeout_secs}s timeout"
            ))),
        }
    })
}

/// Outcome of one id's delete inside a `batch_delete` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub id: String,
    pub result: Result<(), String>,
}

/// Port exposing paginated listing, per-file metadata, streaming download
/// and deletion over a remote drive. Implementations hide OAuth/transport.
pub trait StorageProvider: Send + Sync {
    /// Probe "can I call you". Fails with `CoreError::PermanentProvider`
    /// (no/expired/insufficient auth) rather than a bespoke variant.
    fn authenticate(&self) -> Result<(), CoreError>;

    /// One page of `folder_id`'s immediate children. `page_token` is
    /// opaque and provider-defined; `None` starts from the first page.
    fn list_children(&self, folder_id: &str, page_token: Option<&str>) -> Result<ListPage, CoreError>;

    /// Per-file metadata lookup.
    fn get(&self, id: &str) -> Result<File, CoreError>;

    /// Streaming byte download. Errors on missing/inaccessible ids.
    fn download(&self, id: &str) -> Result<DownloadStream, CoreError>;

    /// Delete a single id.
    fn delete(&self, id: &str) -> Result<(), CoreError>;

    /// Maximum provider-advertised requests/sec; `None` when unknown.
    fn rate_limit_hint(&self) -> Option<u32> {
        None
    }

    /// The folder mime this provider tags folders with.
    fn folder_mime(&self) -> &str;

    /// Materialize the full tree under `folder_id`, depth-first, with each
    /// file's `path` populated by joining ancestor names (spec.md §4.1).
    /// Default implementation built on `list_children`; no concrete cloud
    /// API exposes a true "recursive children" call, so every provider
    /// gets this for free.
    fn list_recursive(&self, folder_id: &str) -> Result<Vec<File>, CoreError> {
        let mut result = Vec::new();
        let mut stack = vec![(folder_id.to_string(), String::new())];
        while let Some((fid, prefix)) = stack.pop() {
            let mut page_token = None;
            loop {
                let page = self.list_children(&fid, page_token.as_deref())?;
                for mut f in page.files {
                    let path = if prefix.is_empty() {
                        f.name.clone()
                    } else {
                        format!("{prefix}/{}", f.name)
                    };
                    f.path = Some(path.clone());
                    let is_folder = f.is_folder(self.folder_mime());
                    let child_id = f.id.clone();
                    result.push(f);
                    if is_folder {
                        stack.push((child_id, path));
                    }
                }
                page_token = match page.next_page_token {
                    Some(t) => Some(t),
                    None => break,
                };
            }
        }
        Ok(result)
    }

    /// Bounded worker-pool batch delete (spec.md §4.1: default 5 workers).
    /// The default implementation is correct for any `StorageProvider`;
    /// override only if the concrete provider has a native batch API.
    fn batch_delete(&self, ids: &[String], workers: usize, timeout_secs: u64) -> Vec<DeleteOutcome> {
        batch_delete_with_pool(self, ids, workers, timeout_secs)
    }
}

/// Shared bounded-worker-pool implementation of `batch_delete`, usable by
/// any `StorageProvider` (default trait method, or called directly by
/// engine::cleanup against a `dyn StorageProvider`).
pub fn batch_delete_with_pool(
    provider: &(impl StorageProvider + ?Sized),
    ids: &[String],
    workers: usize,
    timeout_secs: u64,
) -> Vec<DeleteOutcome> {
    let workers = workers.max(1);
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<String>();
    let (out_tx, out_rx) = crossbeam_channel::unbounded::<DeleteOutcome>();
    for id in ids {
        let _ = job_tx.send(id.clone());
    }
    drop(job_tx);

    std::thread::scope(|scope| {
        for _ in 0..workers.min(ids.len().max(1)) {
            let job_rx = job_rx.clone();
            let out_tx = out_tx.clone();
            scope.spawn(move || {
                while let Ok(id) = job_rx.recv() {
                    let result = with_timeout(timeout_secs, || provider.delete(&id)).map_err(|e| e.to_string());
                    let _ = out_tx.send(DeleteOutcome { id, result });
                }
            });
        }
        drop(out_tx);
    });

    out_rx.iter().collect()
}
