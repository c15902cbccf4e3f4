//! Blocking one-request-per-connection HTTP stub.
//!
//! Every response is sent with `Connection: close`, so clients open a fresh
//! connection per request and the stub can serve them strictly in order.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long a stub waits for its expected requests before giving up.
const ACCEPT_DEADLINE: Duration = Duration::from_secs(20);

#[derive(Clone, Debug)]
pub struct StubResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StubResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// A JSON body with the matching content type.
    pub fn json(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self::new(status, body).with_header("Content-Type", "application/json")
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason(self.status));
        for (k, v) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", k, v));
        }
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        head.push_str("Connection: close\r\n\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        302 => "Found",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Request path with percent-escapes decoded, query string removed.
    pub fn path(&self) -> String {
        let raw = self.target.split('?').next().unwrap_or("");
        percent_decode(raw, false)
    }

    /// Decoded value of the first query parameter called `name`.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let (_, query) = self.target.split_once('?')?;
        query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            if percent_decode(k, true) == name {
                Some(percent_decode(v, true))
            } else {
                None
            }
        })
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

fn percent_decode(s: &str, plus_is_space: bool) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' if plus_is_space => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).to_string()
}

fn read_request(stream: &TcpStream) -> Option<RecordedRequest> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.push((k.trim().to_string(), v.trim().to_string()));
        }
    }

    let len = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).ok()?;

    Some(RecordedRequest {
        method,
        target,
        headers,
        body,
    })
}

/// Serves `expected` requests on 127.0.0.1, then stops.
pub struct StubServer {
    base_url: String,
    handle: Option<JoinHandle<Vec<RecordedRequest>>>,
}

impl StubServer {
    /// Answer requests with `responses` in order.
    pub fn serve(responses: Vec<StubResponse>) -> Self {
        let expected = responses.len();
        let mut queue = responses.into_iter();
        Self::serve_with(expected, move |_| {
            queue.next().unwrap_or_else(|| StubResponse::new(500, "stub exhausted"))
        })
    }

    /// Answer `expected` requests by calling `respond` for each.
    pub fn serve_with<F>(expected: usize, mut respond: F) -> Self
    where
        F: FnMut(&RecordedRequest) -> StubResponse + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub listener");
        let addr = listener.local_addr().expect("stub local addr");
        listener.set_nonblocking(true).expect("nonblocking listener");

        let handle = thread::spawn(move || {
            let deadline = Instant::now() + ACCEPT_DEADLINE;
            let mut seen = Vec::with_capacity(expected);

            while seen.len() < expected && Instant::now() < deadline {
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        let _ = stream.set_nonblocking(false);
                        let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
                        let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
                        if let Some(req) = read_request(&stream) {
                            let resp = respond(&req);
                            let _ = stream.write_all(&resp.to_bytes());
                            let _ = stream.flush();
                            seen.push(req);
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }

            seen
        });

        Self {
            base_url: format!("http://{}", addr),
            handle: Some(handle),
        }
    }

    /// `http://127.0.0.1:<port>`, no trailing slash.
    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// Wait for the expected requests (or the deadline) and return what was received.
    pub fn finish(mut self) -> Vec<RecordedRequest> {
        match self.handle.take() {
            Some(h) => h.join().expect("stub server thread panicked"),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_are_decoded() {
        let req = RecordedRequest {
            method: "GET".into(),
            target: "/rest/api/2/search?jql=project%20%3D%20X+AND+y&maxResults=0".into(),
            headers: vec![("Authorization".into(), "Bearer t".into())],
            body: Vec::new(),
        };
        assert_eq!(req.path(), "/rest/api/2/search");
        assert_eq!(req.query_param("jql").as_deref(), Some("project = X AND y"));
        assert_eq!(req.query_param("maxResults").as_deref(), Some("0"));
        assert_eq!(req.query_param("missing"), None);
        assert_eq!(req.header("authorization"), Some("Bearer t"));
    }
}
