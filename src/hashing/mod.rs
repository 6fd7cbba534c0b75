//! Hasher (spec.md §4.2, C2): streams bytes through an incremental digest,
//! checking cancellation between buffers, and classifies inputs that
//! should never be hashed.

use crate::errors::CoreError;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Algorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
}

impl Algorithm {
    /// Hex digest length (spec.md §6 "Hash format").
    pub fn hex_len(&self) -> usize {
        match self {
            Algorithm::Md5 => 32,
            Algorithm::Sha1 => 40,
            Algorithm::Sha256 => 64,
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "md5" => Algorithm::Md5,
            "sha1" | "sha-1" => Algorithm::Sha1,
            "sha256" | "sha-256" => Algorithm::Sha256,
            _ => return None,
        })
    }
}

/// Why a file was not run through the digest (spec.md §4.2, §7 `not-hashable`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Folder,
    ZeroSize,
    NativeDocument,
    TooLarge,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Folder => "folder",
            SkipReason::ZeroSize => "zero-size",
            SkipReason::NativeDocument => "native-document",
            SkipReason::TooLarge => "too-large",
        }
    }
}

/// Outcome of attempting to hash one file (DESIGN NOTES: typed result
/// variant instead of exception-for-control-flow around "not hashable").
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HashOutcome {
    Hashed(String),
    Skipped(SkipReason),
}

/// Decide, from metadata alone, whether a file should be hashed at all.
pub fn classify(
    is_folder: bool,
    size: u64,
    mime_type: &str,
    max_size: u64,
    native_document_mime_prefixes: &[String],
) -> Option<SkipReason> {
    if is_folder {
        return Some(SkipReason::Folder);
    }
    if size == 0 {
        return Some(SkipReason::ZeroSize);
    }
    if native_document_mime_prefixes
        .iter()
        .any(|p| mime_type.starts_with(p.as_str()))
    {
        return Some(SkipReason::NativeDocument);
    }
    if size > max_size {
        return Some(SkipReason::TooLarge);
    }
    None
}

/// Stream `reader` through `algorithm`'s digest, reading `buffer_size` at a
/// time and checking `cancelled` between buffers. Returns `Ok(None)` on
/// cancellation (no partial hash is ever produced — spec.md §5).
pub fn hash_reader(
    mut reader: impl Read,
    algorithm: Algorithm,
    buffer_size: usize,
    cancelled: &AtomicBool,
) -> Result<Option<String>, CoreError> {
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut state = DigestState::new(algorithm);
    loop {
        if cancelled.load(Ordering::Relaxed) {
            return Ok(None);
        }
        let n = reader
            .read(&mut buffer)
            .map_err(|e| CoreError::TransientProvider(format!("read: {e}")))?;
        if n == 0 {
            break;
        }
        state.update(&buffer[..n]);
    }
    Ok(Some(state.finalize_hex()))
}

enum DigestState {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl DigestState {
    fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Md5 => DigestState::Md5(Md5::new()),
            Algorithm::Sha1 => DigestState::Sha1(Sha1::new()),
            Algorithm::Sha256 => DigestState::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            DigestState::Md5(h) => h.update(chunk),
            DigestState::Sha1(h) => h.update(chunk),
            DigestState::Sha256(h) => h.update(chunk),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            DigestState::Md5(h) => format!("{:x}", h.finalize()),
            DigestState::Sha1(h) => format!("{:x}", h.finalize()),
            DigestState::Sha256(h) => format!("{:x}", h.finalize()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn sha256_of_known_bytes() {
        let cancelled = AtomicBool::new(false);
        let out = hash_reader(Cursor::new(b"abc"), Algorithm::Sha256, 8, &cancelled).unwrap();
        assert_eq!(
            out,
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".to_string())
        );
    }

    #[test]
    fn cancellation_yields_no_hash() {
        let cancelled = AtomicBool::new(true);
        let out = hash_reader(Cursor::new(b"abc"), Algorithm::Sha256, 8, &cancelled).unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn classify_flags_folders_and_zero_size_and_oversize() {
        assert_eq!(classify(true, 0, "x", 100, &[]), Some(SkipReason::Folder));
        assert_eq!(classify(false, 0, "x", 100, &[]), Some(SkipReason::ZeroSize));
        assert_eq!(classify(false, 200, "x", 100, &[]), Some(SkipReason::TooLarge));
        assert_eq!(
            classify(false, 10, "application/vnd.google-apps.doc", 100, &["application/vnd.google-apps".to_string()]),
            Some(SkipReason::NativeDocument)
        );
        assert_eq!(classify(false, 10, "text/plain", 100, &[]), None);
    }

    #[test]
    fn hex_lengths_match_spec() {
        assert_eq!(Algorithm::Md5.hex_len(), 32);
        assert_eq!(Algorithm::Sha1.hex_len(), 40);
        assert_eq!(Algorithm::Sha256.hex_len(), 64);
    }
}
