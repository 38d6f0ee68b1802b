//! Storage and confined cleanup of uploaded poster images.
//!
//! Uploads land under one of two roots (center images, per-label images)
//! with a random v4 UUID as the file stem, so concurrent uploads never
//! coordinate on names. Deletion is only ever performed on paths that resolve
//! strictly inside the matching root; anything else is skipped and logged.

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::core::error::UploadError;

/// Directories uploads are written to.
#[derive(Debug, Clone)]
pub struct UploadRoots {
    pub center_dir: PathBuf,
    pub label_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Center,
    Label,
}

impl AssetKind {
    fn file_name(&self, ext: Option<String>) -> String {
        let token = Uuid::new_v4().simple();
        let (prefix, ext) = match self {
            AssetKind::Center => ("center_", ext.map(|e| e.to_ascii_lowercase())),
            AssetKind::Label => ("", ext),
        };
        let ext = ext.or_else(|| self.default_extension().map(str::to_string));
        match ext {
            Some(ext) => format!("{}{}.{}", prefix, token, ext),
            None => format!("{}{}", prefix, token),
        }
    }

    fn default_extension(&self) -> Option<&'static str> {
        match self {
            AssetKind::Center => None,
            AssetKind::Label => Some("png"),
        }
    }
}

/// Why a delete request was not acted upon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    EmptyPath,
    Unresolvable,
    OutsideRoot,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyPath => f.write_str("empty path"),
            SkipReason::Unresolvable => f.write_str("path could not be resolved"),
            SkipReason::OutsideRoot => f.write_str("path is outside the allowed root"),
        }
    }
}

/// Result of a single confined delete. None of these fail a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(PathBuf),
    AlreadyAbsent(PathBuf),
    Skipped(SkipReason),
    Failed { path: PathBuf, error: String },
}

impl DeleteOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub center_deleted: bool,
    pub label_images_deleted: usize,
}

pub struct UploadManager {
    center_root: PathBuf,
    label_root: PathBuf,
}

impl UploadManager {
    /// Creates both roots if needed and pins them to their canonical form.
    pub fn new(roots: UploadRoots) -> io::Result<Self> {
        std::fs::create_dir_all(&roots.center_dir)?;
        std::fs::create_dir_all(&roots.label_dir)?;

        let manager = Self {
            center_root: roots.center_dir.canonicalize()?,
            label_root: roots.label_dir.canonicalize()?,
        };
        tracing::info!(
            center_root = %manager.center_root.display(),
            label_root = %manager.label_root.display(),
            "upload roots ready"
        );
        Ok(manager)
    }

    pub fn root(&self, kind: AssetKind) -> &Path {
        match kind {
            AssetKind::Center => &self.center_root,
            AssetKind::Label => &self.label_root,
        }
    }

    /// Writes `bytes` under the root for `kind` and returns the absolute path.
    pub async fn ingest(
        &self,
        kind: AssetKind,
        bytes: &[u8],
        original_name: Option<&str>,
    ) -> Result<PathBuf, UploadError> {
        let ext = original_name.and_then(extension_of);
        let dest = self.root(kind).join(kind.file_name(ext));

        tokio::fs::write(&dest, bytes)
            .await
            .map_err(|source| UploadError::Io {
                path: dest.clone(),
                source,
            })?;

        tracing::debug!(
            event = "upload_saved",
            kind = ?kind,
            path = %dest.display(),
            size = bytes.len()
        );
        Ok(dest)
    }

    /// Saves label images in input order, skipping entries without a file
    /// name. Fails when nothing was saved.
    pub async fn ingest_label_batch(
        &self,
        files: Vec<(Option<String>, Vec<u8>)>,
    ) -> Result<Vec<PathBuf>, UploadError> {
        let mut saved = Vec::with_capacity(files.len());
        for (name, bytes) in files {
            let Some(name) = name.filter(|n| !n.is_empty()) else {
                tracing::debug!(event = "upload_skipped", reason = "missing filename");
                continue;
            };
            saved.push(self.ingest(AssetKind::Label, &bytes, Some(&name)).await?);
        }

        if saved.is_empty() {
            return Err(UploadError::NoFiles);
        }
        Ok(saved)
    }

    /// Deletes `path` only if it resolves strictly inside `root`.
    pub fn safe_delete(path: &str, root: &Path) -> DeleteOutcome {
        if path.trim().is_empty() {
            return DeleteOutcome::Skipped(SkipReason::EmptyPath);
        }

        let (Some(resolved), Ok(root)) = (resolve(Path::new(path)), root.canonicalize()) else {
            tracing::warn!(
                event = "upload_cleanup_skipped",
                path = %path,
                root = %root.display(),
                reason = %SkipReason::Unresolvable
            );
            return DeleteOutcome::Skipped(SkipReason::Unresolvable);
        };

        if resolved == root || !resolved.starts_with(&root) {
            tracing::warn!(
                event = "upload_cleanup_skipped",
                path = %path,
                root = %root.display(),
                reason = %SkipReason::OutsideRoot
            );
            return DeleteOutcome::Skipped(SkipReason::OutsideRoot);
        }

        match std::fs::remove_file(&resolved) {
            Ok(()) => {
                tracing::info!(event = "upload_deleted", path = %resolved.display());
                DeleteOutcome::Deleted(resolved)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(event = "upload_already_absent", path = %resolved.display());
                DeleteOutcome::AlreadyAbsent(resolved)
            }
            Err(e) => {
                tracing::warn!(
                    event = "upload_cleanup_failed",
                    path = %resolved.display(),
                    root = %root.display(),
                    error = %e
                );
                DeleteOutcome::Failed {
                    path: resolved,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Confined delete of a center image and any label images. Only
    /// successful deletions are counted.
    pub fn cleanup_uploads(
        &self,
        center_image: Option<&str>,
        label_images: Option<&[Option<String>]>,
    ) -> CleanupReport {
        let center_deleted = center_image
            .map(|p| Self::safe_delete(p, &self.center_root).is_deleted())
            .unwrap_or(false);

        let label_images_deleted = label_images
            .unwrap_or_default()
            .iter()
            .flatten()
            .filter(|p| Self::safe_delete(p, &self.label_root).is_deleted())
            .count();

        CleanupReport {
            center_deleted,
            label_images_deleted,
        }
    }
}

/// Extension of an uploaded file name, if it is plain ASCII alphanumeric.
fn extension_of(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_string())
}

/// Canonical form of `path`. A missing file is resolved through its parent
/// directory so repeated deletes of the same path still resolve.
fn resolve(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = path.canonicalize() {
        return Some(resolved);
    }
    let name = match path.components().next_back()? {
        Component::Normal(name) => name,
        _ => return None,
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.canonicalize().ok()?,
        _ => std::env::current_dir().ok()?,
    };
    Some(parent.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(tmp: &TempDir) -> UploadManager {
        UploadManager::new(UploadRoots {
            center_dir: tmp.path().join("center"),
            label_dir: tmp.path().join("labels"),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn label_upload_keeps_extension() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let path = uploads
            .ingest(AssetKind::Label, b"png", Some("logo.png"))
            .await
            .unwrap();
        assert!(path.starts_with(uploads.root(AssetKind::Label)));
        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(std::fs::read(&path).unwrap(), b"png");
    }

    #[tokio::test]
    async fn label_upload_defaults_extension() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let path = uploads.ingest(AssetKind::Label, b"x", Some("logo")).await.unwrap();
        assert_eq!(path.extension().unwrap(), "png");
    }

    #[tokio::test]
    async fn label_upload_keeps_extension_case() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let path = uploads
            .ingest(AssetKind::Label, b"x", Some("logo.PNG"))
            .await
            .unwrap();
        assert_eq!(path.extension().unwrap(), "PNG");
    }

    #[tokio::test]
    async fn center_upload_is_prefixed_and_lowercased() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let path = uploads
            .ingest(AssetKind::Center, b"x", Some("Brand.JPG"))
            .await
            .unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("center_"));
        assert!(name.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn traversal_in_filename_cannot_escape_root() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let path = uploads
            .ingest(AssetKind::Label, b"x", Some("../../etc/passwd.png"))
            .await
            .unwrap();
        assert_eq!(path.parent().unwrap(), uploads.root(AssetKind::Label));
    }

    #[tokio::test]
    async fn batch_skips_unnamed_entries_in_order() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let saved = uploads
            .ingest_label_batch(vec![
                (Some("a.png".to_string()), b"a".to_vec()),
                (Some(String::new()), b"skip".to_vec()),
                (Some("c.jpg".to_string()), b"c".to_vec()),
            ])
            .await
            .unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(std::fs::read(&saved[0]).unwrap(), b"a");
        assert_eq!(std::fs::read(&saved[1]).unwrap(), b"c");
        assert_eq!(saved[1].extension().unwrap(), "jpg");
    }

    #[tokio::test]
    async fn batch_with_nothing_named_fails() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let err = uploads
            .ingest_label_batch(vec![(None, b"a".to_vec())])
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::NoFiles));
        assert_eq!(err.to_string(), "no files uploaded");
    }

    #[tokio::test]
    async fn concurrent_uploads_get_distinct_names() {
        let tmp = TempDir::new().unwrap();
        let uploads = std::sync::Arc::new(manager(&tmp));
        let mut handles = Vec::new();
        for i in 0..32u8 {
            let uploads = uploads.clone();
            handles.push(tokio::spawn(async move {
                uploads.ingest(AssetKind::Label, &[i], Some("x.png")).await.unwrap()
            }));
        }
        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap());
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 32);
    }

    #[test]
    fn delete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let root = uploads.root(AssetKind::Label).to_path_buf();
        let file = root.join("a.png");
        std::fs::write(&file, b"x").unwrap();
        let path = file.to_str().unwrap();

        assert!(matches!(
            UploadManager::safe_delete(path, &root),
            DeleteOutcome::Deleted(_)
        ));
        assert!(matches!(
            UploadManager::safe_delete(path, &root),
            DeleteOutcome::AlreadyAbsent(_)
        ));
    }

    #[test]
    fn delete_refuses_traversal_out_of_root() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let root = uploads.root(AssetKind::Label).to_path_buf();
        let outside = tmp.path().join("secret.txt");
        std::fs::write(&outside, b"keep").unwrap();

        let sneaky = format!("{}/../secret.txt", root.display());
        assert_eq!(
            UploadManager::safe_delete(&sneaky, &root),
            DeleteOutcome::Skipped(SkipReason::OutsideRoot)
        );
        assert!(outside.exists());
    }

    #[test]
    fn delete_refuses_sibling_with_shared_prefix() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let root = uploads.root(AssetKind::Label).to_path_buf();
        let sibling_dir = tmp.path().join("labels_evil");
        std::fs::create_dir_all(&sibling_dir).unwrap();
        let sibling = sibling_dir.join("a.png");
        std::fs::write(&sibling, b"keep").unwrap();

        assert_eq!(
            UploadManager::safe_delete(sibling.to_str().unwrap(), &root),
            DeleteOutcome::Skipped(SkipReason::OutsideRoot)
        );
        assert!(sibling.exists());
    }

    #[test]
    fn delete_skips_empty_and_unresolvable_paths() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let root = uploads.root(AssetKind::Label);
        assert_eq!(
            UploadManager::safe_delete("", root),
            DeleteOutcome::Skipped(SkipReason::EmptyPath)
        );
        let missing_dir = tmp.path().join("nope/deeper/a.png");
        assert_eq!(
            UploadManager::safe_delete(missing_dir.to_str().unwrap(), root),
            DeleteOutcome::Skipped(SkipReason::Unresolvable)
        );
    }

    #[test]
    fn delete_failure_is_reported_not_raised() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let root = uploads.root(AssetKind::Label).to_path_buf();
        let sub = root.join("sub");
        std::fs::create_dir_all(&sub).unwrap();

        match UploadManager::safe_delete(sub.to_str().unwrap(), &root) {
            DeleteOutcome::Failed { path, error } => {
                assert_eq!(path, sub);
                assert!(!error.is_empty());
            }
            other => panic!("expected a failed delete, got {other:?}"),
        }
        assert!(sub.is_dir());

        let labels = vec![Some(sub.display().to_string())];
        let report = uploads.cleanup_uploads(None, Some(labels.as_slice()));
        assert_eq!(report, CleanupReport::default());
    }

    #[test]
    fn delete_never_removes_the_root_itself() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let root = uploads.root(AssetKind::Center).to_path_buf();
        assert_eq!(
            UploadManager::safe_delete(root.to_str().unwrap(), &root),
            DeleteOutcome::Skipped(SkipReason::OutsideRoot)
        );
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn cleanup_uploads_counts_deleted_labels() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let center = uploads
            .ingest(AssetKind::Center, b"c", Some("c.png"))
            .await
            .unwrap();
        let a = uploads.ingest(AssetKind::Label, b"a", Some("a.png")).await.unwrap();
        let b = uploads.ingest(AssetKind::Label, b"b", Some("b.png")).await.unwrap();
        let outside = tmp.path().join("outside.png");
        std::fs::write(&outside, b"keep").unwrap();

        let labels = vec![
            Some(a.display().to_string()),
            None,
            Some(b.display().to_string()),
            Some(outside.display().to_string()),
        ];
        let report = uploads.cleanup_uploads(Some(center.to_str().unwrap()), Some(labels.as_slice()));
        assert_eq!(
            report,
            CleanupReport {
                center_deleted: true,
                label_images_deleted: 2
            }
        );
        assert!(!center.exists() && !a.exists() && !b.exists());
        assert!(outside.exists());

        let again = uploads.cleanup_uploads(Some(center.to_str().unwrap()), Some(labels.as_slice()));
        assert_eq!(again, CleanupReport::default());
    }

    #[test]
    fn center_root_does_not_cover_label_files() {
        let tmp = TempDir::new().unwrap();
        let uploads = manager(&tmp);
        let label = uploads.root(AssetKind::Label).join("a.png");
        std::fs::write(&label, b"x").unwrap();
        let report = uploads.cleanup_uploads(Some(label.to_str().unwrap()), None);
        assert!(!report.center_deleted);
        assert!(label.exists());
    }
}
