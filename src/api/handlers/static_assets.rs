//! HTTP handlers for the embedded static assets.

use axum::{
    body::Body,
    http::{Response, StatusCode, Uri},
    response::IntoResponse,
};

use crate::static_assets::Assets;

/// Serve embedded static assets. The root path serves the demo capture page.
pub async fn serve_embedded_asset(uri: Uri) -> impl IntoResponse {
    let mut path = uri.path().trim_start_matches('/');
    if path.is_empty() || path.ends_with('/') {
        path = "index.html";
    }

    match Assets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            Response::builder()
                .header(axum::http::header::CONTENT_TYPE, mime.as_ref())
                .header(axum::http::header::CACHE_CONTROL, "no-cache")
                .body(Body::from(content.data.into_owned()))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        None => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap_or_else(|_| StatusCode::NOT_FOUND.into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode};
    use axum_test::TestServer;

    fn create_test_router() -> Router {
        Router::new().fallback(serve_embedded_asset)
    }

    #[tokio::test]
    async fn root_serves_capture_page() {
        let server = TestServer::new(create_test_router()).unwrap();

        let response = server.get("/").await;

        response.assert_status(StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").map(|v| v.to_str().unwrap()),
            Some("text/html")
        );

        let text = response.text();
        assert!(text.contains("id=\"status\""));
        assert!(text.contains("id=\"video\""));
    }

    #[tokio::test]
    async fn capture_script_is_served_with_js_mime() {
        let server = TestServer::new(create_test_router()).unwrap();

        let response = server.get("/script.js").await;

        response.assert_status(StatusCode::OK);
        assert!(
            response
                .headers()
                .get("content-type")
                .map(|v| v.to_str().unwrap())
                .unwrap()
                .contains("javascript")
        );

        let text = response.text();
        assert!(text.contains("getUserMedia"));
        assert!(text.contains("'/upload'"));
        assert!(text.contains("3000"));
    }

    #[tokio::test]
    async fn unknown_asset_is_not_found() {
        let server = TestServer::new(create_test_router()).unwrap();
        let response = server.get("/no-such-file.png").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }
}
