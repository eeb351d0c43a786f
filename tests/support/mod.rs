#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use magpie::{cache::CacheStore, cli::LogFormat, settings::Settings};

pub fn find_free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

pub async fn wait_for_listener(addr: SocketAddr) -> Result<()> {
    for _ in 0..50 {
        match timeout(Duration::from_millis(50), TcpStream::connect(addr)).await {
            Ok(Ok(mut stream)) => {
                stream.shutdown().await.ok();
                return Ok(());
            }
            _ => sleep(Duration::from_millis(50)).await,
        }
    }
    Err(anyhow!("listener {addr} did not become ready"))
}

/// Reads everything the peer sends until it closes the connection.
pub async fn read_to_end_lossy(stream: &mut TcpStream) -> Result<String> {
    let mut data = Vec::new();
    stream.read_to_end(&mut data).await?;
    Ok(String::from_utf8_lossy(&data).into_owned())
}

pub struct ProxyHarness {
    pub addr: SocketAddr,
    pub cache_dir: TempDir,
    handle: JoinHandle<()>,
}

impl ProxyHarness {
    pub async fn spawn_fixed(origin: &str) -> Result<Self> {
        Self::spawn(Some(origin.to_string()), false).await
    }

    pub async fn spawn_full_proxy() -> Result<Self> {
        Self::spawn(None, true).await
    }

    async fn spawn(origin: Option<String>, full_proxy: bool) -> Result<Self> {
        let cache_dir = TempDir::new()?;
        let port = find_free_port()?;
        let addr: SocketAddr = (Ipv4Addr::LOCALHOST, port).into();
        let settings = Settings {
            listen: addr,
            origin,
            full_proxy,
            cache_dir: cache_dir.path().to_path_buf(),
            log: LogFormat::Text,
        };

        let handle = tokio::spawn(async move {
            if let Err(err) = magpie::run(settings).await {
                eprintln!("proxy run failed: {err:?}");
            }
        });
        wait_for_listener(addr).await?;

        Ok(Self {
            addr,
            cache_dir,
            handle,
        })
    }

    pub fn cache_store(&self) -> CacheStore {
        CacheStore::new(self.cache_dir.path().to_path_buf())
    }

    pub fn cached_entry_count(&self) -> usize {
        std::fs::read_dir(self.cache_dir.path())
            .map(|dir| {
                dir.filter_map(|entry| entry.ok())
                    .filter(|entry| entry.path().is_file())
                    .count()
            })
            .unwrap_or(0)
    }

    pub async fn connect(&self) -> Result<TcpStream> {
        Ok(TcpStream::connect(self.addr).await?)
    }

    /// Sends one raw request over a fresh connection and collects the whole
    /// response.
    pub async fn send(&self, raw: &[u8]) -> Result<String> {
        let mut stream = self.connect().await?;
        stream.write_all(raw).await?;
        read_to_end_lossy(&mut stream).await
    }

    pub async fn shutdown(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}

/// Minimal HTTP origin that counts requests and records exactly what the
/// proxy forwarded.
pub struct MockOrigin {
    listener: TcpListener,
    pub requests: Arc<AtomicUsize>,
    pub captured: Arc<Mutex<Vec<String>>>,
    status_line: String,
    extra_headers: String,
    body: Vec<u8>,
    delay: Option<Duration>,
}

impl MockOrigin {
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        Ok(Self {
            listener,
            requests: Arc::new(AtomicUsize::new(0)),
            captured: Arc::new(Mutex::new(Vec::new())),
            status_line: "HTTP/1.1 200 OK".to_string(),
            extra_headers: String::new(),
            body: b"origin-body".to_vec(),
            delay: None,
        })
    }

    pub fn with_status(mut self, status_line: &str) -> Self {
        self.status_line = status_line.to_string();
        self
    }

    pub fn with_headers(mut self, headers: &str) -> Self {
        self.extra_headers = headers.to_string();
        self
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    pub fn authority(&self) -> String {
        format!("127.0.0.1:{}", self.port())
    }

    pub fn origin_url(&self) -> String {
        format!("http://{}", self.authority())
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let _ = self.run().await;
        })
    }

    async fn run(self) -> Result<()> {
        loop {
            let (mut socket, _) = self.listener.accept().await?;
            let requests = self.requests.clone();
            let captured = self.captured.clone();
            let status_line = self.status_line.clone();
            let extra_headers = self.extra_headers.clone();
            let body = self.body.clone();
            let delay = self.delay;
            tokio::spawn(async move {
                let Some(request) = read_full_request(&mut socket).await else {
                    return;
                };
                requests.fetch_add(1, Ordering::SeqCst);
                captured.lock().unwrap().push(request);

                let response_head = format!(
                    "{status_line}\r\nContent-Length: {}\r\n{extra_headers}Connection: close\r\n\r\n",
                    body.len()
                );
                if socket.write_all(response_head.as_bytes()).await.is_err() {
                    return;
                }
                if let Some(delay) = delay {
                    sleep(delay).await;
                }
                let _ = socket.write_all(&body).await;
                socket.shutdown().await.ok();
            });
        }
    }
}

/// Reads a request head plus any Content-Length body, returning the whole
/// request as text.
async fn read_full_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let head_end = loop {
        let n = socket.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..head_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);

    while data.len() < head_end + content_length {
        let n = socket.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }
    Some(String::from_utf8_lossy(&data).into_owned())
}
