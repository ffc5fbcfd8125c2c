use axum::{
    body::Body,
    extract::State,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Redirect, Response},
};
use std::path::Path;
use tokio_util::io::ReaderStream;

use crate::{
    error::{AppError, io_err},
    snapshot::{BACKUP_DIR, TRASH_DIR},
    state::AppState,
};

/// Serve the public site: HTML pages, the client-side content hydrator
/// script, JSON content bundles and other static assets under the site root.
pub async fn handle(State(state): State<AppState>, uri: Uri) -> Result<Response, AppError> {
    let raw_path = uri.path();

    // Decode percent-encoded characters; reject if the path is not valid UTF-8.
    let decoded = percent_decode(raw_path).ok_or(AppError::NotFound)?;

    // Reject path traversal attempts early.
    if decoded.split('/').any(|seg| seg == "..") {
        return Err(AppError::NotFound);
    }

    let rel = decoded.trim_start_matches('/');

    // Snapshots are not part of the public site.
    let top = rel.split('/').next().unwrap_or("");
    if top == BACKUP_DIR || top == TRASH_DIR {
        return Err(AppError::NotFound);
    }

    let fs_path = state.site_root.join(rel);

    // Fast lexical guard — validate_path() performs canonicalize for the real check.
    if !fs_path.starts_with(&state.site_root) {
        return Err(AppError::NotFound);
    }

    // Root or trailing slash → index.html in that directory.
    if raw_path.ends_with('/') || rel.is_empty() {
        return serve_file(&state, &fs_path.join("index.html")).await;
    }

    // Real directory on disk without trailing slash → redirect to canonical URL.
    if tokio::fs::metadata(&fs_path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        return Ok(Redirect::permanent(&format!("{}/", raw_path)).into_response());
    }

    if fs_path.extension().is_some() {
        return serve_file(&state, &fs_path).await;
    }

    // No extension — try appending .html for clean URLs.
    let html_path = fs_path.with_extension("html");
    if tokio::fs::try_exists(&html_path).await.map_err(AppError::Io)? {
        serve_file(&state, &html_path).await
    } else {
        Err(AppError::NotFound)
    }
}

async fn serve_file(state: &AppState, fs_path: &Path) -> Result<Response, AppError> {
    let real_path = validate_path(state, fs_path).await?;

    let file = tokio::fs::File::open(&real_path).await.map_err(io_err)?;
    let content_length = file.metadata().await.map_err(AppError::Io)?.len();

    let mime: &'static str = mime_guess::from_path(&real_path)
        .first_raw()
        .unwrap_or("application/octet-stream");

    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime)
        .header(header::CONTENT_LENGTH, content_length)
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Canonicalize `path` (resolving symlinks) and verify it stays within
/// `state.canonical_root`. Returns the resolved path on success.
async fn validate_path(state: &AppState, path: &Path) -> Result<std::path::PathBuf, AppError> {
    let canonical = tokio::fs::canonicalize(path).await.map_err(io_err)?;
    if !canonical.starts_with(&state.canonical_root) {
        return Err(AppError::NotFound);
    }
    Ok(canonical)
}

/// Percent-decode a URL path. Returns `None` if the decoded bytes are not
/// valid UTF-8 (which maps to a 404).
fn percent_decode(s: &str) -> Option<String> {
    percent_encoding::percent_decode_str(s)
        .decode_utf8()
        .ok()
        .map(|c| c.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PageStore;
    use axum::http::StatusCode;
    use std::{collections::HashMap, sync::Arc};
    use tokio::sync::RwLock;

    #[test]
    fn percent_decode_handles_utf8_and_rejects_garbage() {
        assert_eq!(percent_decode("/a%20b").as_deref(), Some("/a b"));
        assert_eq!(percent_decode("/plain").as_deref(), Some("/plain"));
        assert_eq!(percent_decode("/%ff%fe"), None);
    }

    fn test_state(dir: &tempfile::TempDir) -> AppState {
        let root = dir.path().to_path_buf();
        let canonical_root = root.canonicalize().unwrap_or_else(|_| root.clone());
        AppState {
            store: PageStore::new(root.clone()),
            site_root: root,
            canonical_root,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            verifier: None,
            payments: None,
        }
    }

    async fn request(state: &AppState, path: &str) -> Result<Response, AppError> {
        let uri: Uri = path.parse().unwrap();
        handle(State(state.clone()), uri).await
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn root_serves_index_html() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("index.html"), b"<html>home</html>")
            .await
            .unwrap();
        let state = test_state(&dir);

        let response = request(&state, "/").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "text/html"
        );
        assert_eq!(body_string(response).await, "<html>home</html>");
    }

    #[tokio::test]
    async fn traversal_segments_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        for path in ["/../secret.html", "/a/../../secret.html", "/%2e%2e/secret.html"] {
            let err = request(&state, path).await.unwrap_err();
            assert!(matches!(err, AppError::NotFound), "{path} should be rejected");
        }
    }

    #[tokio::test]
    async fn snapshot_directories_are_not_served() {
        let dir = tempfile::tempdir().unwrap();
        for sub in [BACKUP_DIR, TRASH_DIR] {
            tokio::fs::create_dir_all(dir.path().join(sub)).await.unwrap();
            tokio::fs::write(
                dir.path().join(sub).join("home_2026-08-31_12-00-00.html"),
                b"<html>old</html>",
            )
            .await
            .unwrap();
        }
        let state = test_state(&dir);

        for path in [
            "/backups/home_2026-08-31_12-00-00.html",
            "/trash/home_2026-08-31_12-00-00.html",
            "/backups/",
        ] {
            let err = request(&state, path).await.unwrap_err();
            assert!(matches!(err, AppError::NotFound), "{path} should be hidden");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escaping_the_root_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        tokio::fs::write(outside.path().join("secret.html"), b"<html>secret</html>")
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.html"),
            dir.path().join("leak.html"),
        )
        .unwrap();
        let state = test_state(&dir);

        let err = request(&state, "/leak.html").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }
}
