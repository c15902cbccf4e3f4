// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Persist the finished xlsx buffer into a document store folder under a timestamped name
// role: output/upload
// inputs: xlsx bytes, DocumentStore, folder path, filename
// outputs: location string of the stored file
// side_effects: remote upload (SharePointStore) or files on disk (LocalDirStore)
// invariants:
// - filename pattern is Jira_Data_<YYYYMMDDHHMMSS>.xlsx (one-second resolution)
// - the folder is resolved before the file is written; existing files are overwritten
// errors: UploadFailure propagates to the caller; no local recovery here
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};

use crate::error::ReportError;
use crate::months::Tz;

/// A folder inside a document store, as resolved by that store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderHandle {
  pub location: String,
}

// --- Trait seam for document stores ---
pub trait DocumentStore {
  /// Human-readable destination for logs and the run summary.
  fn describe(&self) -> String;
  fn resolve_folder(&self, folder_path: &str) -> Result<FolderHandle, ReportError>;
  /// Store `bytes` as `filename` in `folder`, returning where it landed.
  fn put_file(&self, folder: &FolderHandle, filename: &str, bytes: &[u8]) -> Result<String, ReportError>;
}

pub fn report_filename(now: DateTime<Local>, tz: Tz) -> String {
  let stamp = match tz {
    Tz::Local => now.format("%Y%m%d%H%M%S").to_string(),
    Tz::Utc => now.with_timezone(&Utc).format("%Y%m%d%H%M%S").to_string(),
  };
  format!("Jira_Data_{}.xlsx", stamp)
}

pub fn upload(
  store: &dyn DocumentStore,
  buffer: &[u8],
  folder_path: &str,
  filename: &str,
) -> Result<String, ReportError> {
  let folder = store.resolve_folder(folder_path)?;
  tracing::info!(store = %store.describe(), folder = %folder.location, filename, bytes = buffer.len(), "uploading report");
  store.put_file(&folder, filename, buffer)
}

/// A directory on local disk standing in for a remote document library.
pub struct LocalDirStore {
  root: PathBuf,
}

impl LocalDirStore {
  pub fn new<P: AsRef<Path>>(root: P) -> Self {
    Self {
      root: root.as_ref().to_path_buf(),
    }
  }
}

impl DocumentStore for LocalDirStore {
  fn describe(&self) -> String {
    self.root.to_string_lossy().to_string()
  }

  fn resolve_folder(&self, folder_path: &str) -> Result<FolderHandle, ReportError> {
    let rel = folder_path.trim_matches('/');
    let dir = if rel.is_empty() { self.root.clone() } else { self.root.join(rel) };

    std::fs::create_dir_all(&dir).map_err(|e| ReportError::UploadFailure {
      filename: folder_path.to_string(),
      reason: format!("creating {}: {}", dir.display(), e),
    })?;

    Ok(FolderHandle {
      location: dir.to_string_lossy().to_string(),
    })
  }

  fn put_file(&self, folder: &FolderHandle, filename: &str, bytes: &[u8]) -> Result<String, ReportError> {
    let path = Path::new(&folder.location).join(filename);

    std::fs::write(&path, bytes).map_err(|e| ReportError::UploadFailure {
      filename: filename.to_string(),
      reason: format!("writing {}: {}", path.display(), e),
    })?;

    Ok(path.to_string_lossy().to_string())
  }
}
