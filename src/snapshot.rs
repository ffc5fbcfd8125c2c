use chrono::Local;
use std::{
    io,
    path::{Path, PathBuf},
};

/// Directory under the site root holding pre-save copies.
pub const BACKUP_DIR: &str = "backups";
/// Directory under the site root holding deleted pages.
pub const TRASH_DIR: &str = "trash";

/// Timestamped snapshots of page files. Backups are copies taken before a
/// save overwrites a page; trash entries are the pages themselves, moved out
/// of the site root on delete. Snapshots are never read back or removed by
/// the server — recovery is manual.
#[derive(Clone)]
pub struct SnapshotStore {
    site_root: PathBuf,
}

impl SnapshotStore {
    pub fn new(site_root: PathBuf) -> Self {
        Self { site_root }
    }

    /// Copy `source` into `backups/` under a dated name. The source file is
    /// left in place.
    pub async fn backup(&self, source: &Path) -> io::Result<PathBuf> {
        let dest = self.reserve(source, BACKUP_DIR).await?;
        tokio::fs::copy(source, &dest).await?;
        tracing::info!("backed up {} -> {}", source.display(), dest.display());
        Ok(dest)
    }

    /// Move `source` into `trash/` under a dated name. A rename, so atomic on
    /// the same filesystem volume; the trash directory lives under the site
    /// root, which keeps it on the same volume as the pages.
    pub async fn trash(&self, source: &Path) -> io::Result<PathBuf> {
        let dest = self.reserve(source, TRASH_DIR).await?;
        tokio::fs::rename(source, &dest).await?;
        tracing::info!("moved {} -> {}", source.display(), dest.display());
        Ok(dest)
    }

    /// Create the destination directory if needed and pick a destination path
    /// that does not collide with an existing snapshot.
    async fn reserve(&self, source: &Path, dir_name: &str) -> io::Result<PathBuf> {
        let dir = self.site_root.join(dir_name);
        tokio::fs::create_dir_all(&dir).await?;

        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid source name"))?;
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        unique_dest(&dir, file_name, &stamp).await
    }
}

/// Build `<stem>_<stamp>.<ext>` from an original filename.
fn dated_name(original: &str, stamp: &str, counter: Option<u32>) -> String {
    let (stem, ext) = match original.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (original, None),
    };
    let mut name = match counter {
        Some(n) => format!("{stem}_{stamp}_{n}"),
        None => format!("{stem}_{stamp}"),
    };
    if let Some(ext) = ext {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// Pick a non-colliding destination path inside `dir`. Two snapshots of the
/// same page within one second get `_2`, `_3`, ... suffixes rather than
/// overwriting the first.
async fn unique_dest(dir: &Path, original: &str, stamp: &str) -> io::Result<PathBuf> {
    let first = dir.join(dated_name(original, stamp, None));
    if !tokio::fs::try_exists(&first).await? {
        return Ok(first);
    }
    for n in 2.. {
        let candidate = dir.join(dated_name(original, stamp, Some(n)));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    unreachable!()
}
