// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rss_news_relay::deliver::{FetchedImage, ImageFetcher, MessageSender};
use rss_news_relay::NewsItem;

pub fn news(source: &str, ts: &str) -> NewsItem {
    NewsItem {
        title: format!("{source} headline {ts}"),
        url: format!("https://{}.test/{}", source.to_lowercase(), ts.replace(' ', "T")),
        source: source.into(),
        published_time: ts.into(),
        summary: Some("Summary.".into()),
        image_url: Some(format!("https://img.test/{}.jpg", ts.replace(' ', "T"))),
        image_format: Some("jpg".into()),
    }
}

/// Returns a tiny JPEG for every URL except the configured ones.
#[derive(Default)]
pub struct FakeImages {
    pub missing: HashSet<String>,
    pub failing: HashSet<String>,
}

#[async_trait]
impl ImageFetcher for FakeImages {
    async fn fetch_image(&self, item: &NewsItem) -> Result<Option<FetchedImage>> {
        let url = item.image_url.clone().unwrap_or_default();
        if self.failing.contains(&url) {
            return Err(anyhow!("timeout fetching {url}"));
        }
        if self.missing.contains(&url) {
            return Ok(None);
        }
        Ok(Some(FetchedImage {
            bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
            format: "jpeg".into(),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub url: String,
    pub caption: String,
    pub format: String,
}

#[derive(Clone, Default)]
pub struct RecordingSender {
    pub sent: Arc<Mutex<Vec<Sent>>>,
    pub reject: HashSet<String>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_news(&self, item: &NewsItem, caption: &str, image: &FetchedImage) -> Result<()> {
        if self.reject.contains(&item.url) {
            return Err(anyhow!("gateway HTTP 500"));
        }
        self.sent.lock().unwrap().push(Sent {
            url: item.url.clone(),
            caption: caption.to_string(),
            format: image.format.clone(),
        });
        Ok(())
    }
}

/// One HTTP request as seen by [`StubServer`].
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Local HTTP/1.1 server answering every request with a fixed status and body.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Captured>>>,
}

impl StubServer {
    pub async fn start(status: u16, body: &'static str) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let seen = seen.clone();
                tokio::spawn(async move {
                    use tokio::io::AsyncWriteExt;
                    if let Some(req) = read_request(&mut sock).await {
                        seen.lock().unwrap().push(req);
                    }
                    let reply = format!(
                        "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = sock.write_all(reply.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }
}

/// Client that never routes through an environment proxy.
pub fn direct_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

async fn read_request(sock: &mut tokio::net::TcpStream) -> Option<Captured> {
    use tokio::io::AsyncReadExt;

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos;
        }
        let n = sock.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut start = lines.next()?.split(' ');
    let method = start.next()?.to_string();
    let path = start.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let mut body = buf[head_end + 4..].to_vec();
    let header = |name: &str| headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());
    if let Some(len) = header("content-length").and_then(|v| v.parse::<usize>().ok()) {
        while body.len() < len {
            let n = sock.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
    } else if header("transfer-encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked")) {
        while !body.ends_with(b"0\r\n\r\n") {
            let n = sock.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        body = dechunk(&body);
    }

    Some(Captured {
        method,
        path,
        headers,
        body,
    })
}

fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
    hay.windows(needle.len()).position(|w| w == needle)
}

fn dechunk(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut rest = raw;
    while let Some(eol) = find(rest, b"\r\n") {
        let size_str = String::from_utf8_lossy(&rest[..eol]);
        let size = usize::from_str_radix(size_str.split(';').next().unwrap_or("0").trim(), 16).unwrap_or(0);
        if size == 0 {
            break;
        }
        let start = eol + 2;
        out.extend_from_slice(&rest[start..start + size]);
        rest = &rest[start + size + 2..];
    }
    out
}
