use thiserror::Error;

/// Failures raised by remote tracker clients.
///
/// Variants line up with the sync error taxonomy so the classifier can map them one-to-one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("could not connect to remote tracker: {0}")]
    Connection(String),
    #[error("remote tracker timed out: {0}")]
    Timeout(String),
    #[error("invalid remote bug id: {0}")]
    InvalidBugId(String),
    #[error("remote bug {0} not found")]
    BugNotFound(String),
    #[error("remote bug {0} is private")]
    PrivateRemoteBug(String),
    #[error("could not parse data for remote bug {remote_bug}: {message}")]
    UnparsableBugData { remote_bug: String, message: String },
    #[error("could not parse remote tracker version: {0}")]
    UnparsableTrackerVersion(String),
    #[error("no client registered for tracker kind {0}")]
    UnsupportedTrackerKind(String),
    #[error("remote status {0:?} has no local equivalent")]
    UnknownRemoteStatus(String),
    #[error("remote importance {0:?} has no local equivalent")]
    UnknownRemoteImportance(String),
    #[error("remote tracker does not support {0}")]
    Unsupported(&'static str),
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
    #[error("remote tracker error: {0}")]
    Other(String),
}

/// Maps an HTTP status code returned while fetching `remote_bug`.
pub fn map_status(status: u16, url: &str, remote_bug: Option<&str>) -> RemoteError {
    let remote_bug = remote_bug.unwrap_or(url).to_string();
    match status {
        401 | 403 => RemoteError::PrivateRemoteBug(remote_bug),
        404 | 410 => RemoteError::BugNotFound(remote_bug),
        408 | 504 => RemoteError::Timeout(format!("status {status} from {url}")),
        502 | 503 => RemoteError::Connection(format!("status {status} from {url}")),
        _ => RemoteError::UnexpectedStatus {
            status,
            url: url.to_string(),
        },
    }
}

/// Maps a transport error from an HTTP-based client.
pub fn map_reqwest_error(err: &reqwest::Error, remote_bug: Option<&str>) -> RemoteError {
    let url = err
        .url()
        .map(|url| url.to_string())
        .unwrap_or_else(|| "<unknown url>".to_string());

    if let Some(status) = err.status() {
        return map_status(status.as_u16(), &url, remote_bug);
    }
    if err.is_timeout() {
        return RemoteError::Timeout(format!("{err}"));
    }
    if err.is_connect() || err.is_request() || err.is_body() {
        return RemoteError::Connection(format!("{err}"));
    }
    if err.is_decode() {
        return RemoteError::UnparsableBugData {
            remote_bug: remote_bug.unwrap_or(&url).to_string(),
            message: format!("{err}"),
        };
    }
    RemoteError::Other(format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use tokio::net::TcpListener;

    use super::*;

    /// Serves `/bug/missing` as a 404 and `/bug/garbled` as a non-JSON 200.
    async fn serve_tracker() -> SocketAddr {
        let app = Router::new()
            .route("/bug/missing", get(|| async { StatusCode::NOT_FOUND }))
            .route("/bug/garbled", get(|| async { "<bug>not json</bug>" }));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind tracker");
        let addr = listener.local_addr().expect("tracker addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }

    #[tokio::test]
    async fn http_failures_map_through_status_and_body() {
        let addr = serve_tracker().await;
        let client = reqwest::Client::new();

        let missing = client
            .get(format!("http://{addr}/bug/missing"))
            .send()
            .await
            .expect("response")
            .error_for_status()
            .expect_err("404 is an error status");
        assert_eq!(
            map_reqwest_error(&missing, Some("missing")),
            RemoteError::BugNotFound("missing".to_string())
        );

        let garbled = client
            .get(format!("http://{addr}/bug/garbled"))
            .send()
            .await
            .expect("response")
            .json::<serde_json::Value>()
            .await
            .expect_err("body is not json");
        assert!(matches!(
            map_reqwest_error(&garbled, Some("garbled")),
            RemoteError::UnparsableBugData { remote_bug, .. } if remote_bug == "garbled"
        ));
    }

    #[tokio::test]
    async fn refused_connections_are_connection_errors() {
        let closed = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = closed.local_addr().expect("addr");
        drop(closed);

        let err = reqwest::Client::new()
            .get(format!("http://{addr}/bug/1"))
            .send()
            .await
            .expect_err("nothing listens on the port");
        assert!(matches!(
            map_reqwest_error(&err, Some("1")),
            RemoteError::Connection(_)
        ));
    }

    #[tokio::test]
    async fn silent_trackers_time_out() {
        // Accepted by the kernel backlog but never answered.
        let silent = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = silent.local_addr().expect("addr");

        let err = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .expect("client")
            .get(format!("http://{addr}/bug/1"))
            .send()
            .await
            .expect_err("listener never responds");
        assert!(matches!(
            map_reqwest_error(&err, Some("1")),
            RemoteError::Timeout(_)
        ));
        drop(silent);
    }

    #[test]
    fn status_codes_map_to_bug_level_errors() {
        assert_eq!(
            map_status(404, "https://bugs.example.org/1", Some("1")),
            RemoteError::BugNotFound("1".to_string())
        );
        assert_eq!(
            map_status(403, "https://bugs.example.org/1", Some("1")),
            RemoteError::PrivateRemoteBug("1".to_string())
        );
        assert!(matches!(
            map_status(504, "https://bugs.example.org/1", Some("1")),
            RemoteError::Timeout(_)
        ));
        assert!(matches!(
            map_status(503, "https://bugs.example.org", None),
            RemoteError::Connection(_)
        ));
        assert_eq!(
            map_status(418, "https://bugs.example.org", None),
            RemoteError::UnexpectedStatus {
                status: 418,
                url: "https://bugs.example.org".to_string()
            }
        );
    }
}
