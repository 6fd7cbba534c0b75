//! File entity (spec.md §3 "File").

use chrono::{DateTime, Utc};

/// One remote file or folder, as mirrored into the repository.
///
/// Invariants (enforced by the repository and the components that mutate
/// a row, never by this struct alone): `hash_calculated` implies `hash` is
/// `Some` and its length matches the active algorithm; `size == 0` and
/// `hash_calculated == false` whenever `mime_type` is the provider's
/// folder mime.
#[derive(Clone, Debug, PartialEq)]
pub struct File {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub modified_time: DateTime<Utc>,
    pub hash: Option<String>,
    pub hash_calculated: bool,
    pub parents: Vec<String>,
    pub path: Option<String>,
    pub web_view_link: Option<String>,
    pub last_updated: DateTime<Utc>,
    /// Sentinel recorded by the hash engine when a file is permanently
    /// skipped (spec.md §4.6: "reason-in-metadata sentinel to avoid
    /// reprocessing"), e.g. `"folder"`, `"too-large"`. `None` means the
    /// file has never been classified, or was successfully hashed.
    pub hash_skip_reason: Option<String>,
}

impl File {
    pub fn is_folder(&self, folder_mime: &str) -> bool {
        self.mime_type == folder_mime
    }
}
