//! Request builders and a scripted tool runner.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use docket_server::runner::{RunError, ToolInvocation, ToolOutput, ToolRunner};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

const BOUNDARY: &str = "docket-test-boundary";

/// How the fake tools behave.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
#[derive(Clone, Copy, Debug)]
pub enum ToolBehavior {
    /// Write a well-formed output file of the given size.
    Produce(usize),
    /// Exit non-zero with stderr.
    Fail,
    /// Binary not installed.
    Missing,
}

/// A runner that imitates Ghostscript and LibreOffice without starting processes.
pub struct FakeTools {
    behavior: ToolBehavior,
    spawned: AtomicUsize,
    calls: Mutex<Vec<ToolInvocation>>,
}

#[allow(dead_code)]
impl FakeTools {
    pub fn new(behavior: ToolBehavior) -> Self {
        Self {
            behavior,
            spawned: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Conversion runs started, excluding `--version` probes.
    pub fn conversions(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    fn output_path(invocation: &ToolInvocation) -> PathBuf {
        let args: Vec<String> = invocation
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        if let Some(out) = args.iter().find_map(|a| a.strip_prefix("-sOutputFile=")) {
            return PathBuf::from(out);
        }
        let outdir = args
            .iter()
            .position(|a| a == "--outdir")
            .map(|i| PathBuf::from(&args[i + 1]))
            .unwrap();
        let input = PathBuf::from(args.last().unwrap());
        outdir.join(input.with_extension("pdf").file_name().unwrap())
    }
}

#[async_trait]
impl ToolRunner for FakeTools {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, RunError> {
        self.calls.lock().unwrap().push(invocation.clone());
        let program = invocation.display_name();
        let is_probe = invocation.args.len() == 1 && invocation.args[0] == "--version";
        if !is_probe {
            self.spawned.fetch_add(1, Ordering::SeqCst);
        }

        match self.behavior {
            ToolBehavior::Missing => Err(RunError::Unavailable {
                program,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            ToolBehavior::Fail => Err(RunError::ExecutionFailed {
                program,
                exit_code: Some(1),
                stderr: "Error: /undefined in --run--".to_string(),
            }),
            ToolBehavior::Produce(size) => {
                if !is_probe {
                    let mut pdf = b"%PDF-1.4\n".to_vec();
                    pdf.resize(size.max(pdf.len()), b' ');
                    std::fs::write(Self::output_path(&invocation), pdf).unwrap();
                }
                Ok(ToolOutput {
                    exit_code: 0,
                    stdout: format!("{program} 1.0\n"),
                    stderr: String::new(),
                })
            }
        }
    }
}

/// Build a multipart POST with one `file` part, from the given peer address.
#[allow(dead_code)]
pub fn multipart_request(
    uri: &str,
    file_name: &str,
    content_type: &str,
    data: &[u8],
    peer: SocketAddr,
) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    request
        .extensions_mut()
        .insert(axum::extract::ConnectInfo(peer));
    request
}

/// Build a multipart POST without a `file` part.
#[allow(dead_code)]
pub fn multipart_without_file(uri: &str, peer: SocketAddr) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
    );
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    request
        .extensions_mut()
        .insert(axum::extract::ConnectInfo(peer));
    request
}

/// Build a GET from the given peer address.
#[allow(dead_code)]
pub fn get_request(uri: &str, peer: SocketAddr) -> Request<Body> {
    let mut request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    request
        .extensions_mut()
        .insert(axum::extract::ConnectInfo(peer));
    request
}

#[allow(dead_code)]
pub fn peer(last_octet: u8) -> SocketAddr {
    SocketAddr::from(([198, 51, 100, last_octet], 40000))
}

/// Collect a response into status, headers, and body bytes.
#[allow(dead_code)]
pub async fn read_response(
    response: axum::response::Response,
) -> (StatusCode, axum::http::HeaderMap, bytes::Bytes) {
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}
