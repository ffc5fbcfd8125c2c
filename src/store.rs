use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;

use crate::{
    error::{AppError, io_err},
    meta::{self, PageMeta},
    snapshot::SnapshotStore,
};

/// The only extension the admin API will touch.
pub const PAGE_EXTENSION: &str = "html";
/// Pages carrying this prefix are hidden from listings and protected from
/// deletion.
pub const ADMIN_PREFIX: &str = "admin-";

const DEFAULT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>New Page</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body { font-family: sans-serif; line-height: 1.6; }
        .container { max-width: 1200px; margin: 0 auto; padding: 2rem; }
        h1 { color: #0a2342; margin-bottom: 1rem; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Welcome to Your New Page</h1>
        <p>Start editing this page using the admin editor.</p>
    </div>
</body>
</html>
"#;

/// Starter document for a new page. A single variant today; the id parameter
/// is the hook for a template registry later.
pub fn template(_id: &str) -> &'static str {
    DEFAULT_TEMPLATE
}

#[derive(Debug, Serialize)]
pub struct PageSummary {
    pub filename: String,
    pub name: String,
    pub size: u64,
    pub modified: String,
    pub status: &'static str,
}

#[derive(Debug)]
pub struct LoadedPage {
    pub filename: String,
    pub content: String,
    pub meta: PageMeta,
    pub last_modified: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// The provided content replaces the file verbatim.
    Full,
    /// Only the body span and selected meta fields are rewritten in place.
    Body,
}

/// Filesystem-backed CRUD over the `.html` pages in the site root.
#[derive(Clone)]
pub struct PageStore {
    site_root: PathBuf,
    snapshots: SnapshotStore,
}

impl PageStore {
    pub fn new(site_root: PathBuf) -> Self {
        let snapshots = SnapshotStore::new(site_root.clone());
        Self { site_root, snapshots }
    }

    /// List every page in the site root, excluding admin pages. Sorted by
    /// filename so output is deterministic across filesystems.
    pub async fn list(&self) -> Result<Vec<PageSummary>, AppError> {
        let mut read_dir = tokio::fs::read_dir(&self.site_root).await.map_err(io_err)?;
        let mut pages: Vec<PageSummary> = Vec::new();

        while let Some(entry) = read_dir.next_entry().await.map_err(AppError::Io)? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !has_page_extension(&name) || name.starts_with(ADMIN_PREFIX) {
                continue;
            }

            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(e) => {
                    tracing::warn!("Cannot stat {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            if !file_type.is_file() {
                continue;
            }

            let metadata = entry.metadata().await.map_err(AppError::Io)?;
            let raw = tokio::fs::read_to_string(entry.path())
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("Cannot read {}: {}", entry.path().display(), e);
                    String::new()
                });

            let title = meta::extract(&raw).title;
            pages.push(PageSummary {
                name: if title.is_empty() { name.clone() } else { title },
                filename: name,
                size: metadata.len(),
                modified: format_mtime(&metadata),
                status: "published",
            });
        }

        pages.sort_unstable_by(|a, b| a.filename.cmp(&b.filename));
        Ok(pages)
    }

    /// Load a page's full content plus extracted metadata.
    pub async fn load(&self, filename: &str) -> Result<LoadedPage, AppError> {
        let path = self.resolve(filename)?;
        if !tokio::fs::try_exists(&path).await.map_err(AppError::Io)? {
            return Err(AppError::NotFound);
        }
        require_page_extension(filename)?;

        let content = tokio::fs::read_to_string(&path).await.map_err(io_err)?;
        let metadata = tokio::fs::metadata(&path).await.map_err(io_err)?;

        Ok(LoadedPage {
            filename: filename.to_string(),
            meta: meta::extract(&content),
            content,
            last_modified: format_mtime(&metadata),
        })
    }

    /// Create a new page from a template. Returns the final filename, which
    /// gains the page extension if the caller omitted it.
    pub async fn create(&self, filename: &str, template_id: &str) -> Result<String, AppError> {
        if filename.is_empty() {
            return Err(AppError::BadRequest("Filename required".to_string()));
        }

        let filename = if has_page_extension(filename) {
            filename.to_string()
        } else {
            format!("{filename}.{PAGE_EXTENSION}")
        };

        let path = self.resolve(&filename)?;
        if tokio::fs::try_exists(&path).await.map_err(AppError::Io)? {
            return Err(AppError::Conflict);
        }

        tokio::fs::write(&path, template(template_id))
            .await
            .map_err(|_| AppError::Internal("Failed to create file".to_string()))?;

        tracing::info!("created page {}", filename);
        Ok(filename)
    }

    /// Save a page, snapshotting the current content first if the file
    /// already exists. Returns the number of bytes written.
    ///
    /// In body mode the existing document is edited in place: the first body
    /// span is replaced, the title is rewritten when `meta_title` is
    /// non-empty, and the description meta element is rewritten or inserted
    /// when `meta_description` is non-empty. Keywords are never rewritten.
    /// Body mode on a missing file falls back to writing `content` verbatim.
    pub async fn save(
        &self,
        filename: &str,
        content: &str,
        body_content: &str,
        meta_title: &str,
        meta_description: &str,
        mode: SaveMode,
    ) -> Result<usize, AppError> {
        if filename.is_empty() {
            return Err(AppError::BadRequest("Filename required".to_string()));
        }
        require_page_extension(filename)?;
        let path = self.resolve(filename)?;

        let exists = tokio::fs::try_exists(&path).await.map_err(AppError::Io)?;
        if exists {
            self.snapshots.backup(&path).await.map_err(AppError::Io)?;
        }

        let updated = if mode == SaveMode::Body && exists {
            let original = tokio::fs::read_to_string(&path).await.map_err(io_err)?;
            let mut updated = meta::replace_body(&original, body_content);
            if !meta_title.is_empty() {
                updated = meta::rewrite_title(&updated, meta_title);
            }
            if !meta_description.is_empty() {
                updated = meta::upsert_description(&updated, meta_description);
            }
            updated
        } else {
            content.to_string()
        };

        tokio::fs::write(&path, updated.as_bytes())
            .await
            .map_err(|_| AppError::Internal("Failed to save file".to_string()))?;

        tracing::info!("saved page {} ({} bytes)", filename, updated.len());
        Ok(updated.len())
    }

    /// Soft-delete a page by moving it into the trash directory.
    pub async fn delete(&self, filename: &str) -> Result<(), AppError> {
        let path = self.resolve(filename)?;
        if !tokio::fs::try_exists(&path).await.map_err(AppError::Io)? {
            return Err(AppError::NotFound);
        }
        if filename.starts_with(ADMIN_PREFIX) {
            return Err(AppError::Forbidden("Cannot delete admin pages".to_string()));
        }

        self.snapshots
            .trash(&path)
            .await
            .map_err(|_| AppError::Internal("Failed to delete file".to_string()))?;

        tracing::info!("moved page {} to trash", filename);
        Ok(())
    }

    /// Resolve a client-supplied filename to a path inside the site root.
    /// Pages are bare filenames only: separators and `..` segments are
    /// rejected outright.
    fn resolve(&self, filename: &str) -> Result<PathBuf, AppError> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename == ".."
        {
            return Err(AppError::NotFound);
        }
        Ok(self.site_root.join(filename))
    }
}

fn has_page_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext == PAGE_EXTENSION)
}

fn require_page_extension(filename: &str) -> Result<(), AppError> {
    if has_page_extension(filename) {
        Ok(())
    } else {
        Err(AppError::InvalidType)
    }
}

fn format_mtime(metadata: &std::fs::Metadata) -> String {
    match metadata.modified() {
        Ok(t) => {
            let dt: DateTime<Local> = t.into();
            dt.format("%Y-%m-%d %H:%M:%S").to_string()
        }
        Err(_) => String::new(),
    }
}
