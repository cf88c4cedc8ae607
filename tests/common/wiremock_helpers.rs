use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a mock HTTP server that serves HTML content at the specified path.
pub async fn mock_html_page(url_path: &str, html: &str) -> MockServer {
    let server = MockServer::start().await;
    mount_html(&server, url_path, html).await;
    server
}

pub async fn mount_html(server: &MockServer, url_path: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html.to_string())
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

/// Mounts a redirect from `from` to `location` (absolute or relative).
pub async fn mount_redirect(server: &MockServer, from: &str, status: u16, location: &str) {
    Mock::given(method("GET"))
        .and(path(from))
        .respond_with(ResponseTemplate::new(status).insert_header("location", location))
        .mount(server)
        .await;
}

/// Like [`mount_redirect`], answering only after `delay_ms`.
pub async fn mount_slow_redirect(server: &MockServer, from: &str, location: &str, delay_ms: u64) {
    Mock::given(method("GET"))
        .and(path(from))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", location)
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(server)
        .await;
}

/// Mounts a HEAD responder for liveness probes.
pub async fn mount_head(server: &MockServer, url_path: &str, status: u16) {
    Mock::given(method("HEAD"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Creates a mock HTTP server that delays responses to simulate network timeouts.
pub async fn mock_timeout_server(delay_ms: u64) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("slow")
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(&server)
        .await;

    server
}
