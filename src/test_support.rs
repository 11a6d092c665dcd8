//! Fixtures shared by the unit tests: image writers and a stub HTTP server.

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Noisy gradient so JPEG sizes react to quality.
fn textured(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let n = x.wrapping_mul(2654435761).wrapping_add(y.wrapping_mul(40503)) >> 24;
        Rgb([
            ((x * 255) / width.max(1)) as u8 ^ (n as u8 & 0x1f),
            ((y * 255) / height.max(1)) as u8,
            (n as u8).wrapping_add((x ^ y) as u8),
        ])
    })
}

pub fn write_jpeg(path: &Path, width: u32, height: u32, quality: u8) {
    let img = textured(width, height);
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode(img.as_raw(), width, height, ColorType::Rgb8)
        .unwrap();
    std::fs::write(path, buf).unwrap();
}

/// Left half fully transparent, right half opaque red.
pub fn write_png_with_alpha(path: &Path, width: u32, height: u32) {
    let img = RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([255, 0, 0, 255])
        }
    });
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

/// A request captured by [`StubServer`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub type Reply = (u16, &'static str, Vec<u8>);
pub type Route = Arc<dyn Fn(&Recorded, &str) -> Reply + Send + Sync>;

/// Minimal HTTP/1.1 server on a local port, one connection per request.
pub struct StubServer {
    pub base: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubServer {
    pub async fn start(route: Route) -> Self {
        Self::start_delayed(route, Duration::ZERO).await
    }

    /// Requests are recorded on arrival; every reply is held back for `delay`.
    pub async fn start_delayed(route: Route, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let server_base = base.clone();
        let log = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let route = route.clone();
                let log = log.clone();
                let base = server_base.clone();
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut socket).await else {
                        return;
                    };
                    let (status, content_type, body) = route(&request, &base);
                    log.lock().unwrap().push(request);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let head = format!(
                        "HTTP/1.1 {} Stub\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        status,
                        content_type,
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { base, requests }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn read_more(socket: &mut TcpStream, buf: &mut Vec<u8>) -> Option<()> {
    let mut chunk = [0u8; 8192];
    let n = socket.read(&mut chunk).await.ok()?;
    if n == 0 {
        return None;
    }
    buf.extend_from_slice(&chunk[..n]);
    Some(())
}

fn decode_chunked(mut raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(line_end) = find(raw, b"\r\n") {
        let size_line = String::from_utf8_lossy(&raw[..line_end]);
        let size = usize::from_str_radix(size_line.split(';').next().unwrap().trim(), 16).unwrap_or(0);
        if size == 0 {
            break;
        }
        let start = line_end + 2;
        out.extend_from_slice(&raw[start..start + size]);
        raw = &raw[start + size + 2..];
    }
    out
}

async fn read_request(socket: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        read_more(socket, &mut buf).await?;
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok());
    let chunked = headers
        .iter()
        .any(|(k, v)| k == "transfer-encoding" && v.eq_ignore_ascii_case("chunked"));

    let mut body = buf[header_end..].to_vec();
    if let Some(len) = content_length {
        while body.len() < len {
            read_more(socket, &mut body).await?;
        }
        body.truncate(len);
    } else if chunked {
        while find(&body, b"0\r\n\r\n").is_none() {
            read_more(socket, &mut body).await?;
        }
        body = decode_chunked(&body);
    }

    Some(Recorded {
        method,
        path,
        headers,
        body,
    })
}

pub fn json_reply(status: u16, value: serde_json::Value) -> Reply {
    (status, "application/json", value.to_string().into_bytes())
}

/// `/optimize` answers `optimize_reply`; `/files/*` serves `download`.
pub fn optimizer_route(optimize_reply: fn(&str) -> Reply, download: &'static [u8]) -> Route {
    Arc::new(move |req: &Recorded, base: &str| {
        if req.path.ends_with("/optimize") {
            optimize_reply(base)
        } else if req.path.starts_with("/files/") {
            (200, "application/octet-stream", download.to_vec())
        } else {
            (404, "text/plain", b"not found".to_vec())
        }
    })
}
