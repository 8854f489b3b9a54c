//! # Lookup Sources
//!
//! Contracts for every external collaborator the search consults, plus the
//! cancellable handle that wraps one in-flight lookup.
//!
//! ## Source Contracts
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CloudStore            lookup(barcode)  → Found(Confirmed) | NotFound   │
//! │                        publish(record)  → Ok | Err   (merge by barcode) │
//! │                                                                         │
//! │  CatalogClient   ×N    lookup(barcode, token) → Found | NotFound | Error│
//! │  BackupCatalogClient   lookup(barcode, token) → Found | NotFound | Error│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## LookupHandle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  spawn ──► tokio task ──┬── client answers ──────► Some(result)         │
//! │                         ├── timeout elapses ─────► Some(Error(Timeout)) │
//! │                         └── token cancelled ─────► None                 │
//! │                                                                         │
//! │  A result that arrives after cancel() is swallowed: the handle          │
//! │  resolves to None, which is neither found nor failed.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tally_core::{Barcode, CandidateRecord, ConfirmedRecord};

use crate::error::{LookupError, Result};

// =============================================================================
// Lookup Result
// =============================================================================

/// The answer of one catalog or backup lookup.
#[derive(Debug)]
pub enum LookupResult {
    /// The source knows the barcode.
    Found(CandidateRecord),
    /// The source was consulted and has no match.
    NotFound,
    /// Transport, status or payload failure.
    Error(LookupError),
}

impl LookupResult {
    pub fn is_found(&self) -> bool {
        matches!(self, LookupResult::Found(_))
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            LookupResult::Found(_) => "found",
            LookupResult::NotFound => "not_found",
            LookupResult::Error(_) => "error",
        }
    }
}

impl From<Result<Option<CandidateRecord>>> for LookupResult {
    fn from(result: Result<Option<CandidateRecord>>) -> Self {
        match result {
            Ok(Some(candidate)) => LookupResult::Found(candidate),
            Ok(None) => LookupResult::NotFound,
            Err(e) => LookupResult::Error(e),
        }
    }
}

// =============================================================================
// Client Traits
// =============================================================================

/// One public catalog taking part in the race.
///
/// Implementations may watch `cancel` to abort the request early; they do
/// not have to, since the handle suppresses results after cancellation.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Source name for logs.
    fn name(&self) -> &str;

    async fn lookup(&self, barcode: &Barcode, cancel: &CancellationToken) -> LookupResult;
}

/// The single fallback catalog consulted after the race misses.
#[async_trait]
pub trait BackupCatalogClient: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self, barcode: &Barcode, cancel: &CancellationToken) -> LookupResult;
}

/// Answer of the crowdsourced store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudLookup {
    Found(ConfirmedRecord),
    NotFound,
}

/// The shared crowdsourced store.
///
/// `lookup` never fails: transport errors and malformed documents are
/// reported as `NotFound` (and logged by the implementation).
#[async_trait]
pub trait CloudStore: Send + Sync {
    async fn lookup(&self, barcode: &Barcode) -> CloudLookup;

    /// Upserts a record keyed by barcode without blanking stored fields.
    async fn publish(&self, record: &ConfirmedRecord) -> Result<()>;
}

// =============================================================================
// Lookup Handle
// =============================================================================

/// One in-flight lookup running on its own task.
#[derive(Debug)]
pub struct LookupHandle {
    source: String,
    token: CancellationToken,
    task: JoinHandle<Option<LookupResult>>,
}

impl LookupHandle {
    /// Spawns `lookup` under a child of `parent`.
    ///
    /// `lookup` receives the handle's own token so the client can abort.
    /// Cancelling `parent` cancels this handle too.
    pub fn spawn<F, Fut>(
        source: impl Into<String>,
        timeout: Duration,
        parent: &CancellationToken,
        lookup: F,
    ) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = LookupResult> + Send + 'static,
    {
        let source = source.into();
        let token = parent.child_token();
        let call = lookup(token.clone());
        let task_token = token.clone();
        let task_source = source.clone();

        let task = tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = task_token.cancelled() => None,
                answer = tokio::time::timeout(timeout, call) => Some(match answer {
                    Ok(result) => result,
                    Err(_) => {
                        debug!(source = %task_source, ?timeout, "Lookup timed out");
                        LookupResult::Error(LookupError::Timeout(timeout))
                    }
                }),
            };

            // A result racing with cancel() must not leak out.
            if task_token.is_cancelled() {
                None
            } else {
                result
            }
        });

        LookupHandle {
            source,
            token,
            task,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// A clone of the handle's token, for cancelling after `join` has
    /// taken ownership of the handle.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits for the lookup. `None` means it was cancelled.
    ///
    /// A panicking client is reported as an error rather than propagated.
    pub async fn join(self) -> (String, Option<LookupResult>) {
        let LookupHandle {
            source,
            token,
            task,
        } = self;

        let result = match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() || token.is_cancelled() => None,
            Err(e) => {
                warn!(source = %source, error = %e, "Lookup task failed");
                Some(LookupResult::Error(LookupError::Internal(e.to_string())))
            }
        };

        (source, result)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
