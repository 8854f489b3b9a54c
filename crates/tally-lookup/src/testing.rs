//! Test doubles for the lookup traits and a canned-response HTTP server.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use tally_core::{Barcode, CandidateRecord, ConfirmedRecord, Money, TaxCategory};

use crate::coordinator::{SearchObserver, SearchPhase};
use crate::error::{LookupError, Result};
use crate::source::{BackupCatalogClient, CatalogClient, CloudLookup, CloudStore, LookupResult};

pub(crate) fn candidate(name: &str, brand: &str) -> CandidateRecord {
    CandidateRecord::new(name, brand)
}

pub(crate) fn barcode(raw: &str) -> Barcode {
    Barcode::new(raw).unwrap()
}

pub(crate) fn confirmed(raw: &str, name: &str) -> ConfirmedRecord {
    ConfirmedRecord {
        barcode: barcode(raw),
        name: name.to_string(),
        brand: "BrandX".to_string(),
        price: Money::from_cents(4999),
        tax: TaxCategory::Standard.into(),
    }
}

// =============================================================================
// Fake Catalog / Backup
// =============================================================================

#[derive(Debug, Clone)]
pub(crate) enum Answer {
    Found(CandidateRecord),
    NotFound,
    Error,
    /// Never answers on its own.
    Pending,
}

/// Scripted source usable as a catalog or as the backup.
pub(crate) struct FakeSource {
    name: String,
    answer: Answer,
    delay: Duration,
    calls: AtomicUsize,
    tokens: Mutex<Vec<CancellationToken>>,
}

impl FakeSource {
    pub(crate) fn new(name: &str, answer: Answer) -> Arc<Self> {
        Self::delayed(name, answer, Duration::ZERO)
    }

    pub(crate) fn delayed(name: &str, answer: Answer, delay: Duration) -> Arc<Self> {
        Arc::new(FakeSource {
            name: name.to_string(),
            answer,
            delay,
            calls: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// True once every token this source was called with is cancelled.
    pub(crate) fn was_cancelled(&self) -> bool {
        let tokens = self.tokens.lock().unwrap();
        !tokens.is_empty() && tokens.iter().all(CancellationToken::is_cancelled)
    }

    async fn answer(&self, cancel: &CancellationToken) -> LookupResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(cancel.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.answer {
            Answer::Found(c) => LookupResult::Found(c.clone()),
            Answer::NotFound => LookupResult::NotFound,
            Answer::Error => LookupResult::Error(LookupError::Network("connection reset".into())),
            Answer::Pending => {
                cancel.cancelled().await;
                LookupResult::Error(LookupError::Cancelled)
            }
        }
    }
}

#[async_trait]
impl CatalogClient for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, _barcode: &Barcode, cancel: &CancellationToken) -> LookupResult {
        self.answer(cancel).await
    }
}

#[async_trait]
impl BackupCatalogClient for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, _barcode: &Barcode, cancel: &CancellationToken) -> LookupResult {
        self.answer(cancel).await
    }
}

// =============================================================================
// Fake Cloud
// =============================================================================

pub(crate) struct FakeCloud {
    hit: Option<ConfirmedRecord>,
    delay: Duration,
    fail_publish: bool,
    lookups: AtomicUsize,
    published: Mutex<Vec<ConfirmedRecord>>,
}

impl FakeCloud {
    pub(crate) fn miss() -> Arc<Self> {
        Self::build(None, Duration::ZERO, false)
    }

    pub(crate) fn hit(record: ConfirmedRecord) -> Arc<Self> {
        Self::build(Some(record), Duration::ZERO, false)
    }

    pub(crate) fn slow_miss(delay: Duration) -> Arc<Self> {
        Self::build(None, delay, false)
    }

    pub(crate) fn failing_publish() -> Arc<Self> {
        Self::build(None, Duration::ZERO, true)
    }

    fn build(hit: Option<ConfirmedRecord>, delay: Duration, fail_publish: bool) -> Arc<Self> {
        Arc::new(FakeCloud {
            hit,
            delay,
            fail_publish,
            lookups: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub(crate) fn published(&self) -> Vec<ConfirmedRecord> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudStore for FakeCloud {
    async fn lookup(&self, _barcode: &Barcode) -> CloudLookup {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.hit {
            Some(record) => CloudLookup::Found(record.clone()),
            None => CloudLookup::NotFound,
        }
    }

    async fn publish(&self, record: &ConfirmedRecord) -> Result<()> {
        if self.fail_publish {
            return Err(LookupError::HttpStatus {
                source_name: "fake-cloud".into(),
                status: 503,
            });
        }
        self.published.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// =============================================================================
// Canned HTTP Server
// =============================================================================

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Minimal HTTP/1.1 server answering each connection with the next canned
/// `(status, body)`; the last response repeats.
pub(crate) struct CannedServer {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl CannedServer {
    pub(crate) async fn start(responses: Vec<(u16, &str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responses: Vec<(u16, String)> = responses
            .into_iter()
            .map(|(status, body)| (status, body.to_string()))
            .collect();

        let recorded = requests.clone();
        tokio::spawn(async move {
            let mut served = 0usize;
            while let Ok((mut stream, _)) = listener.accept().await {
                let request = read_request(&mut stream).await;
                recorded.lock().unwrap().push(request);

                let (status, body) = responses[served.min(responses.len() - 1)].clone();
                served += 1;

                let reply = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        CannedServer { url, requests }
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> RecordedRequest {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut request_line = head.lines().next().unwrap_or("").split_whitespace();
    let method = request_line.next().unwrap_or("").to_string();
    let path = request_line.next().unwrap_or("").to_string();
    let body_end = buf.len().min(header_end + content_length);
    let body = String::from_utf8_lossy(&buf[header_end..body_end]).to_string();

    RecordedRequest { method, path, body }
}

// =============================================================================
// Recording Observer
// =============================================================================

#[derive(Default)]
pub(crate) struct RecordingObserver {
    statuses: Mutex<Vec<String>>,
    phases: Mutex<Vec<SearchPhase>>,
}

impl RecordingObserver {
    pub(crate) fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }

    pub(crate) fn phases(&self) -> Vec<SearchPhase> {
        self.phases.lock().unwrap().clone()
    }
}

impl SearchObserver for RecordingObserver {
    fn on_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }

    fn on_phase(&self, phase: SearchPhase) {
        self.phases.lock().unwrap().push(phase);
    }
}
