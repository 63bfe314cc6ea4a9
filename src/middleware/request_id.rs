//! Request ID middleware for request tracing

use axum::http::{HeaderMap, HeaderName};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

/// Header name for request ID
pub const X_REQUEST_ID: &str = "x-request-id";

/// Sets a UUID request ID when the caller sent none and echoes it on the response.
pub fn request_id_layer() -> (SetRequestIdLayer<MakeRequestUuid>, PropagateRequestIdLayer) {
    let header_name = HeaderName::from_static(X_REQUEST_ID);

    (
        SetRequestIdLayer::new(header_name.clone(), MakeRequestUuid),
        PropagateRequestIdLayer::new(header_name),
    )
}

/// Read the request ID back out of request headers, e.g. to forward it upstream.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl RequestIdExt for HeaderMap {
    fn request_id(&self) -> Option<&str> {
        self.get(X_REQUEST_ID)?.to_str().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_request_id_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(headers.request_id(), None);

        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc-123"));
        assert_eq!(headers.request_id(), Some("abc-123"));
    }

    #[tokio::test]
    async fn assigns_and_echoes_request_id() {
        use axum::{body::Body, http::Request, routing::get, Router};
        use tower::ServiceExt;

        let (set_request_id, propagate_request_id) = request_id_layer();
        let app = Router::new()
            .route(
                "/",
                get(|headers: HeaderMap| async move {
                    headers.request_id().unwrap_or_default().to_string()
                }),
            )
            .layer(propagate_request_id)
            .layer(set_request_id);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let generated = response.headers()[X_REQUEST_ID].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(generated).is_ok());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(X_REQUEST_ID, "caller-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[X_REQUEST_ID], "caller-id");
    }
}
