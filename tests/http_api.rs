//! `HttpApi` against a local HTTP server that serves canned responses.
//!
//! Each test starts a `TcpListener` on an ephemeral port, answers every
//! request through a route function and records what it received, so the
//! tests can check both the mapped error variants and the exact requests
//! (paths, headers, bodies) that went over the wire.

use mineru_parse::{
    CancellationToken, ClientConfig, ParseApi, ParseClient, ParseError, ParseOptions, TaskState,
};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// ── Canned server ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Request {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

type Route = Arc<dyn Fn(&Request) -> (u16, String) + Send + Sync>;

struct Server {
    base: String,
    log: Arc<Mutex<Vec<Request>>>,
}

impl Server {
    async fn start(route: impl Fn(&Request) -> (u16, String) + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let route: Route = Arc::new(route);

        let accept_log = Arc::clone(&log);
        tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                let route = Arc::clone(&route);
                let log = Arc::clone(&accept_log);
                tokio::spawn(async move {
                    let _ = read_request(sock, &route, &log).await;
                });
            }
        });

        Self {
            base: format!("http://{addr}"),
            log,
        }
    }

    fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }

    fn config(&self) -> ClientConfig {
        ClientConfig::builder()
            .token("tok-123")
            .api_base(format!("{}/api/v4", self.base))
            .poll_interval_ms(0)
            .max_poll_attempts(5)
            .build()
            .unwrap()
    }

    fn client(&self) -> ParseClient {
        ParseClient::new(self.config()).unwrap()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read one request, answer it and close the connection.
async fn read_request(
    mut sock: TcpStream,
    route: &Route,
    log: &Mutex<Vec<Request>>,
) -> Option<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = sock.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let len: usize = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);
    while buf.len() < head_end + len {
        let n = sock.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = buf[head_end..].to_vec();

    let req = Request {
        method,
        path,
        headers,
        body,
    };
    let (status, reply) = route(&req);
    log.lock().unwrap().push(req);

    let response = format!(
        "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{reply}",
        reply.len()
    );
    sock.write_all(response.as_bytes()).await.ok()?;
    sock.shutdown().await.ok()?;
    Some(())
}

fn ok(data: &str) -> (u16, String) {
    (200, format!(r#"{{"code":0,"msg":"ok","data":{data}}}"#))
}

fn upload_url(req: &Request) -> String {
    format!("http://{}/upload/B1?sig=abc", req.header("host").unwrap_or_default())
}

// ── Submission ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn non_2xx_submission_is_submission_error() {
    let server = Server::start(|_| (500, r#"{"code":500,"msg":"internal error"}"#.into())).await;

    let err = server
        .client()
        .parse_by_url("https://x/a.pdf", &ParseOptions::default(), None, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ParseError::Submission { reason } => {
            assert!(reason.contains("500"), "got: {reason}");
            assert!(reason.contains("internal error"), "got: {reason}");
        }
        other => panic!("expected Submission, got {other:?}"),
    }
    let requests = server.requests();
    assert_eq!(requests.len(), 1, "no status query after a failed submission");
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/api/v4/extract/task");
    assert_eq!(requests[0].header("authorization"), Some("Bearer tok-123"));
}

#[tokio::test]
async fn url_flow_over_http_polls_until_done() {
    let server = Server::start(|req| match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/api/v4/extract/task") => ok(r#"{"task_id":"T1"}"#),
        ("GET", "/api/v4/extract/task/T1") => ok(
            r#"{"task_id":"T1","state":"done","full_zip_url":"https://cdn.example.com/T1.zip","err_msg":""}"#,
        ),
        _ => (404, String::new()),
    })
    .await;

    let task = server
        .client()
        .parse_by_url(
            "https://x/a.pdf",
            &ParseOptions::default().formula(true),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(task.task_id, "T1");
    assert_eq!(task.result_url.as_deref(), Some("https://cdn.example.com/T1.zip"));

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["url"], "https://x/a.pdf");
    assert_eq!(body["enable_formula"], true);
    assert_eq!(requests[1].header("authorization"), Some("Bearer tok-123"));
}

#[tokio::test]
async fn null_start_time_does_not_abort_a_running_task() {
    let server = Server::start(|_| {
        ok(r#"{"task_id":"T1","state":"running","extract_progress":{"extracted_pages":1,"total_pages":4,"start_time":null}}"#)
    })
    .await;

    let task = server.client().get_task_status("T1").await.unwrap();

    assert_eq!(task.state, TaskState::Running);
    assert_eq!(task.progress.unwrap().total_pages, 4);
}

// ── Upload ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rejected_put_is_upload_error_without_batch_query() {
    let server = Server::start(|req| match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/api/v4/file-urls/batch") => {
            ok(&format!(r#"{{"batch_id":"B1","file_urls":["{}"]}}"#, upload_url(req)))
        }
        ("PUT", _) => (403, "<Error>SignatureDoesNotMatch</Error>".into()),
        _ => (404, String::new()),
    })
    .await;

    let err = server
        .client()
        .parse_bytes("deck.pdf", vec![1u8, 2, 3], &ParseOptions::default(), None, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ParseError::Upload {
            batch_id,
            file_name,
            reason,
        } => {
            assert_eq!(batch_id, "B1");
            assert_eq!(file_name, "deck.pdf");
            assert!(reason.contains("403"), "got: {reason}");
        }
        other => panic!("expected Upload, got {other:?}"),
    }
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| !r.path.contains("extract-results")));
}

#[tokio::test]
async fn upload_flow_puts_raw_bytes_without_credentials() {
    let server = Server::start(|req| match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/api/v4/file-urls/batch") => {
            ok(&format!(r#"{{"batch_id":"B1","file_urls":["{}"]}}"#, upload_url(req)))
        }
        ("PUT", "/upload/B1?sig=abc") => (200, String::new()),
        ("GET", "/api/v4/extract-results/batch/B1") => ok(
            r#"{"batch_id":"B1","extract_result":[{"file_name":"deck.pdf","state":"done","full_zip_url":"https://cdn.example.com/B1.zip"}]}"#,
        ),
        _ => (404, String::new()),
    })
    .await;

    let task = server
        .client()
        .parse_bytes(
            "deck.pdf",
            b"%PDF-1.7 deck".to_vec(),
            &ParseOptions::default().ocr(true),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(task.task_id, "B1");
    assert_eq!(task.file_name.as_deref(), Some("deck.pdf"));

    let requests = server.requests();
    assert_eq!(requests.len(), 3);
    let slot: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(slot["files"][0]["name"], "deck.pdf");
    assert_eq!(slot["files"][0]["is_ocr"], true);

    let put = &requests[1];
    assert_eq!(put.method, "PUT");
    assert_eq!(put.body, b"%PDF-1.7 deck");
    assert_eq!(put.header("authorization"), None);
    assert_eq!(put.header("content-type"), None);

    assert_eq!(requests[2].header("authorization"), Some("Bearer tok-123"));
}

// ── Queries & download ───────────────────────────────────────────────────────

#[tokio::test]
async fn non_2xx_status_query_is_query_error() {
    let server = Server::start(|_| (502, "<html>bad gateway</html>".into())).await;
    let api = mineru_parse::HttpApi::new(server.config()).unwrap();

    let err = api.batch_status("B9").await.unwrap_err();

    assert!(
        matches!(err, ParseError::Query { ref id, ref reason } if id == "B9" && reason.starts_with("HTTP 502")),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn non_2xx_download_is_download_error() {
    let server = Server::start(|_| (404, String::new())).await;
    let url = format!("{}/results/missing.zip", server.base);

    let err = server.client().download_result(&url).await.unwrap_err();

    assert!(
        matches!(err, ParseError::Download { url: ref u, ref reason } if *u == url && reason.contains("404")),
        "got: {err:?}"
    );
    assert_eq!(server.requests()[0].header("authorization"), None);
}

#[tokio::test]
async fn download_returns_archive_bytes() {
    let server = Server::start(|_| (200, "PK-archive".into())).await;
    let url = format!("{}/results/B1.zip", server.base);

    let bytes = server.client().download_result(&url).await.unwrap();

    assert_eq!(&bytes[..], b"PK-archive");
}
