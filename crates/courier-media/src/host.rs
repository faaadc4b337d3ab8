//! Static media hosting — a read-only HTTP endpoint mapping one path
//! segment to a file in the hosting directory.

use axum::{
    extract::{Path as UrlPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use courier_core::error::CourierError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
struct HostState {
    dir: Arc<PathBuf>,
}

/// Build the serving router for the hosting directory.
pub fn router(dir: PathBuf, route: &str) -> Router {
    Router::new()
        .route(&format!("/{route}/{{filename}}"), get(serve_file))
        .with_state(HostState { dir: Arc::new(dir) })
}

/// Bind and serve until the process shuts down.
pub async fn serve(dir: PathBuf, port: u16, route: &str) -> Result<(), CourierError> {
    let app = router(dir, route);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| CourierError::Media(format!("failed to bind media port {port}: {e}")))?;
    info!("media server listening on port {port}");
    axum::serve(listener, app)
        .await
        .map_err(|e| CourierError::Media(format!("media server failed: {e}")))
}

async fn serve_file(
    State(state): State<HostState>,
    UrlPath(filename): UrlPath<String>,
) -> Response {
    let Some(path) = resolve(&state.dir, &filename) else {
        error!("rejected media request for {filename:?}");
        return StatusCode::NOT_FOUND.into_response();
    };

    // The file can be swept between resolution and read; that degrades
    // to a 404 like any other miss.
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            info!("serving {}", path.display());
            ([(header::CONTENT_TYPE, content_type(&path))], bytes).into_response()
        }
        Err(e) => {
            error!("requested file missing: {} ({e})", path.display());
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Map a request filename onto the hosting directory, refusing anything
/// that is not a plain file name or that escapes the directory.
fn resolve(dir: &Path, filename: &str) -> Option<PathBuf> {
    if filename.is_empty() || filename.contains(['/', '\\']) || filename.contains("..") {
        return None;
    }

    let path = dir.join(filename).canonicalize().ok()?;
    let dir = dir.canonicalize().ok()?;
    if path.starts_with(&dir) {
        Some(path)
    } else {
        None
    }
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Join the public base URL, route, and file name without duplicate slashes.
pub fn public_url(base: &str, route: &str, filename: &str) -> String {
    format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        route.trim_matches('/'),
        filename
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[test]
    fn test_public_url_joins_cleanly() {
        assert_eq!(
            public_url("https://relay.example.com/", "media", "a.jpg"),
            "https://relay.example.com/media/a.jpg"
        );
        assert_eq!(
            public_url("https://relay.example.com", "/media/", "a.jpg"),
            "https://relay.example.com/media/a.jpg"
        );
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve(dir.path(), "../secret.txt").is_none());
        assert!(resolve(dir.path(), "a/../../b").is_none());
        assert!(resolve(dir.path(), "nested/file.jpg").is_none());
        assert!(resolve(dir.path(), "back\\slash").is_none());
        assert!(resolve(dir.path(), "").is_none());
    }

    #[test]
    fn test_resolve_accepts_plain_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.jpg"), b"x").unwrap();
        let resolved = resolve(dir.path(), "ok.jpg").unwrap();
        assert_eq!(resolved.file_name().unwrap(), "ok.jpg");
    }

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(content_type(Path::new("a.png")), "image/png");
        assert_eq!(content_type(Path::new("a")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_serves_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pic.jpg"), b"jpeg-bytes").unwrap();
        let app = router(dir.path().to_path_buf(), "media");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/media/pic.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/jpeg"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"jpeg-bytes");
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path().to_path_buf(), "media");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/media/nope.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_encoded_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        // A sibling file outside the hosting directory.
        let outside = dir.path().parent().unwrap().join("outside-secret");
        std::fs::write(&outside, b"secret").unwrap();
        let app = router(dir.path().to_path_buf(), "media");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/media/..%2Foutside-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let _ = std::fs::remove_file(outside);
    }
}
