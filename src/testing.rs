//! Deterministic in-memory transport for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::http_client::{HttpResponse, HttpTransport};

#[derive(Debug, Clone)]
enum Reply {
    Status(u16, String),
    Refused,
}

/// Scripted [`HttpTransport`]: replies are keyed by exact URL, anything
/// unscripted behaves like a refused connection.
#[derive(Default)]
pub struct FakeTransport {
    get: Mutex<HashMap<String, Reply>>,
    head: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_get(self, url: &str, status: u16, body: &str) -> Self {
        self.get
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Status(status, body.to_string()));
        self
    }

    pub fn refuse_get(self, url: &str) -> Self {
        self.get.lock().unwrap().insert(url.to_string(), Reply::Refused);
        self
    }

    pub fn on_head(self, url: &str, status: u16) -> Self {
        self.head
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Status(status, String::new()));
        self
    }

    /// Every request in order, as `"GET <url>"` / `"HEAD <url>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn lookup(&self, method: &str, url: &str) -> Result<(u16, String)> {
        self.calls.lock().unwrap().push(format!("{method} {url}"));
        let table = if method == "HEAD" { &self.head } else { &self.get };
        match table.lock().unwrap().get(url).cloned() {
            Some(Reply::Status(status, body)) => Ok((status, body)),
            Some(Reply::Refused) | None => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("connection refused: {url}"),
            ))),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get_text(&self, url: &str) -> Result<HttpResponse> {
        let (status, body) = self.lookup("GET", url)?;
        Ok(HttpResponse { status, body })
    }

    async fn get_bytes(&self, url: &str) -> Result<Bytes> {
        let (status, body) = self.lookup("GET", url)?;
        if !(200..300).contains(&status) {
            return Err(Error::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(Bytes::from(body))
    }

    async fn head(&self, url: &str) -> Result<u16> {
        self.lookup("HEAD", url).map(|(status, _)| status)
    }
}
