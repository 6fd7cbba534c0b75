//! `StorageProvider` over the local filesystem. Stands in for the real
//! OAuth'd cloud client in tests and the demo binary (spec.md places the
//! concrete client and its auth out of scope); grounded on the teacher's
//! own directory walk (`pipeline/walk.rs`), but made to route through the
//! `StorageProvider` port instead of walking the whole tree directly.

use super::{DownloadStream, ListPage, StorageProvider};
use crate::errors::CoreError;
use crate::types::File;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

const FOLDER_MIME: &str = "application/vnd.local-fs.folder";

/// Page size kept deliberately small so pagination code paths in the scan
/// engine are exercised by an in-process provider, not just a real API.
const PAGE_SIZE: usize = 64;

pub struct LocalFsStorageProvider {
    root: PathBuf,
    page_size: usize,
}

impl LocalFsStorageProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), page_size: PAGE_SIZE }
    }

    /// Override the listing page size (spec.md §4.1/§5, `Config::scan_page_size`).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn to_file(&self, path: &Path) -> Result<File, CoreError> {
        let meta = fs::metadata(path).map_err(|e| map_io_err(path, &e))?;
        let mtime: DateTime<Utc> = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let is_dir = meta.is_dir();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        let parent = path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .into_iter()
            .collect();
        Ok(File {
            id: path.to_string_lossy().to_string(),
            name,
            size: if is_dir { 0 } else { meta.len() },
            mime_type: if is_dir {
                FOLDER_MIME.to_string()
            } else {
                mime_guess(path)
            },
            modified_time: mtime,
            hash: None,
            hash_calculated: false,
            parents: parent,
            path: None,
            web_view_link: Some(format!("file://{}", path.display())),
            last_updated: Utc::now(),
            hash_skip_reason: None,
        })
    }
}

fn mime_guess(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => "application/pdf".to_string(),
        Some("txt") => "text/plain".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

fn map_io_err(path: &Path, e: &std::io::Error) -> CoreError {
    match e.kind() {
        std::io::ErrorKind::NotFound => CoreError::NotFound(path.display().to_string()),
        std::io::ErrorKind::PermissionDenied => {
            CoreError::PermanentProvider(format!("permission denied: {}", path.display()))
        }
        _ => CoreError::TransientProvider(format!("{}: {e}", path.display())),
    }
}

impl StorageProvider for LocalFsStorageProvider {
    fn authenticate(&self) -> Result<(), CoreError> {
        if self.root.exists() {
            Ok(())
        } else {
            Err(CoreError::PermanentProvider(format!(
                "root does not exist: {}",
                self.root.display()
            )))
        }
    }

    fn list_children(&self, folder_id: &str, page_token: Option<&str>) -> Result<ListPage, CoreError> {
        let dir = PathBuf::from(folder_id);
        let mut entries: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|e| map_io_err(&dir, &e))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        entries.sort();

        let offset: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let page: Vec<File> = entries
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|p| self.to_file(p))
            .collect::<Result<_, _>>()?;

        let next_offset = offset + page.len();
        let next_page_token = if next_offset < entries.len() {
            Some(next_offset.to_string())
        } else {
            None
        };

        Ok(ListPage {
            files: page,
            next_page_token,
        })
    }

    fn get(&self, id: &str) -> Result<File, CoreError> {
        self.to_file(Path::new(id))
    }

    fn download(&self, id: &str) -> Result<DownloadStream, CoreError> {
        let f = fs::File::open(id).map_err(|e| map_io_err(Path::new(id), &e))?;
        Ok(Box::new(f))
    }

    fn delete(&self, id: &str) -> Result<(), CoreError> {
        let path = Path::new(id);
        let meta = fs::metadata(path).map_err(|e| map_io_err(path, &e))?;
        let result = if meta.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| map_io_err(path, &e))
    }

    fn folder_mime(&self) -> &str {
        FOLDER_MIME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn lists_and_paginates_children() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            let mut f = fs::File::create(dir.path().join(format!("f{i}.txt"))).unwrap();
            writeln!(f, "hello {i}").unwrap();
        }
        let provider = LocalFsStorageProvider::new(dir.path());
        let page = provider
            .list_children(&dir.path().to_string_lossy(), None)
            .unwrap();
        assert_eq!(page.files.len(), 5);
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn download_roundtrips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"abc").unwrap();
        let provider = LocalFsStorageProvider::new(dir.path());
        let mut stream = provider.download(&path.to_string_lossy()).unwrap();
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut stream, &mut buf).unwrap();
        assert_eq!(buf, b"abc");
    }
}
