//! # HTTP Request Metrics Middleware
//!
//! Request spans come from tower-http's `TraceLayer`; this middleware adds the
//! request counter and latency histogram on top.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};

/// Record `http_requests_total` and `http_request_duration_seconds`.
pub async fn record_http_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = normalize_path_for_metrics(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();

    tracing::debug!(status, elapsed_ms = elapsed.as_millis() as u64, "request completed");

    counter!(
        "http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!("http_request_duration_seconds", "method" => method, "path" => path)
        .record(elapsed.as_secs_f64());

    response
}

/// Replace numeric ids with `:id` so label cardinality stays bounded.
fn normalize_path_for_metrics(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use http::Request;
    use tower::ServiceExt;

    #[test]
    fn numeric_segments_are_collapsed() {
        assert_eq!(normalize_path_for_metrics("/admin/teachers/42"), "/admin/teachers/:id");
        assert_eq!(
            normalize_path_for_metrics("/super-admin/schools/7/admins"),
            "/super-admin/schools/:id/admins"
        );
        assert_eq!(normalize_path_for_metrics("/admin/dashboard/stats"), "/admin/dashboard/stats");
        assert_eq!(normalize_path_for_metrics("/"), "/");
    }

    #[tokio::test]
    async fn middleware_passes_response_through() {
        let app = Router::new()
            .route("/health", get(|| async { "OK" }))
            .layer(middleware::from_fn(record_http_metrics));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
