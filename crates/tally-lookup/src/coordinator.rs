//! # Search Coordinator
//!
//! Drives one barcode from "unknown" to exactly one [`SearchOutcome`].
//!
//! ## Phase Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Idle ──resolve──► CloudChecking ──hit──────────────────► CloudHit     │
//! │    ▲  (busy: None)       │                                              │
//! │    │                    miss                                            │
//! │    │                     │                                              │
//! │    │           classify: Book? ──yes──► BookFallback ────► BookDetected │
//! │    │                     │                                              │
//! │    │                     no                                             │
//! │    │                     ▼                                              │
//! │    │                  Racing ── first Found ─────────────► CatalogHit   │
//! │    │                     │      (others cancelled)                      │
//! │    │         failures == race width                                     │
//! │    │                     ▼                                              │
//! │    │              BackupChecking ──found─────────────────► BackupHit    │
//! │    │                     │                                              │
//! │    │                  missed                                            │
//! │    │                     ▼                                              │
//! │    │                ManualEntry ─────────────────► ManualEntryRequired  │
//! │    │                                                        │           │
//! │    └────────────────────────── release flag ◄───────────────┘           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Session State
//! - `active`: single-flight flag, taken with compare-and-swap. A `resolve`
//!   call that finds it set returns `None` immediately; it is not queued.
//! - `failures`: catalog misses and errors in the current race. Reset at
//!   the start of every session. A cancelled lookup is not a failure.
//! - `in_flight`: cancellation tokens of race lookups that have not
//!   answered yet. Cleared at the start of every session.
//!
//! The flag is owned by a `SessionGuard`: dropping the `resolve` future
//! mid-search releases the flag and cancels every lookup of the session.

use futures_util::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use tally_core::{classify, Barcode, CandidateRecord, SearchOutcome};

use crate::error::{LookupError, Result};
use crate::source::{
    BackupCatalogClient, CatalogClient, CloudLookup, CloudStore, LookupHandle, LookupResult,
};

/// Shown while the cloud store is consulted.
pub const STATUS_IDENTIFYING: &str = "Identifying product...";

/// Shown once the cloud store misses, books included.
pub const STATUS_SEARCHING: &str = "Searching global databases...";

/// Shown while the backup catalog is consulted.
pub const STATUS_DEEP_LOOKUP: &str = "Performing deep lookup...";

// =============================================================================
// Settings & Phase
// =============================================================================

/// Tunables for one coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    /// Upper bound for each single lookup. A lookup that exceeds it reports
    /// `Error(Timeout)`.
    pub lookup_timeout: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            lookup_timeout: Duration::from_secs(8),
        }
    }
}

/// Where the current session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchPhase {
    #[default]
    Idle,
    CloudChecking,
    Racing,
    BookFallback,
    BackupChecking,
    ManualEntry,
}

impl SearchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchPhase::Idle => "idle",
            SearchPhase::CloudChecking => "cloud_checking",
            SearchPhase::Racing => "racing",
            SearchPhase::BookFallback => "book_fallback",
            SearchPhase::BackupChecking => "backup_checking",
            SearchPhase::ManualEntry => "manual_entry",
        }
    }
}

impl fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Observer
// =============================================================================

/// Receives progress of a search (implemented by the front end).
pub trait SearchObserver: Send + Sync {
    /// A human readable status line.
    fn on_status(&self, message: &str);

    /// The coordinator entered `phase`.
    fn on_phase(&self, phase: SearchPhase);
}

/// Observer that ignores everything.
pub struct NoOpObserver;

impl SearchObserver for NoOpObserver {
    fn on_status(&self, _message: &str) {}
    fn on_phase(&self, _phase: SearchPhase) {}
}

// =============================================================================
// Session Guard
// =============================================================================

/// Holds the single-flight flag for one session.
struct SessionGuard<'a> {
    active: &'a AtomicBool,
    released: AtomicBool,
    token: CancellationToken,
}

impl<'a> SessionGuard<'a> {
    /// Takes the flag, or `None` if another session holds it.
    fn acquire(active: &'a AtomicBool) -> Option<Self> {
        active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        Some(SessionGuard {
            active,
            released: AtomicBool::new(false),
            token: CancellationToken::new(),
        })
    }

    /// Parent token of every lookup in the session.
    fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancels the session and gives the flag back. Only the first call
    /// flips the flag and returns true.
    fn release(&self) -> bool {
        self.token.cancel();
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.active.store(false, Ordering::Release);
        true
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.release() {
            debug!("Search abandoned before an outcome, session released");
        }
    }
}

// =============================================================================
// Search Coordinator
// =============================================================================

/// Single-flight barcode resolution engine.
pub struct SearchCoordinator {
    cloud: Arc<dyn CloudStore>,
    catalogs: Vec<Arc<dyn CatalogClient>>,
    backup: Arc<dyn BackupCatalogClient>,
    observer: Arc<dyn SearchObserver>,
    settings: SearchSettings,

    active: AtomicBool,
    failures: AtomicUsize,
    phase: Mutex<SearchPhase>,
    in_flight: Mutex<Vec<(usize, CancellationToken)>>,
}

impl SearchCoordinator {
    pub fn builder() -> SearchCoordinatorBuilder {
        SearchCoordinatorBuilder::new()
    }

    /// Resolves `barcode` to exactly one outcome.
    ///
    /// Returns `None` without doing anything when another search is still
    /// running.
    #[instrument(skip_all, fields(barcode = %barcode))]
    pub async fn resolve(&self, barcode: &Barcode) -> Option<SearchOutcome> {
        let Some(guard) = SessionGuard::acquire(&self.active) else {
            debug!("Search already active, request dropped");
            return None;
        };

        self.failures.store(0, Ordering::Release);
        self.lock_in_flight().clear();

        let outcome = self.run(barcode, guard.token()).await;

        self.cancel_in_flight();
        self.enter(SearchPhase::Idle);
        if !guard.release() {
            warn!("Search session was released twice");
        }

        info!(outcome = outcome.kind(), "Search finished");
        Some(outcome)
    }

    async fn run(&self, barcode: &Barcode, session: &CancellationToken) -> SearchOutcome {
        self.enter(SearchPhase::CloudChecking);
        self.observer.on_status(STATUS_IDENTIFYING);

        if let Some(record) = self.check_cloud(barcode).await {
            return SearchOutcome::CloudHit { record };
        }
        self.observer.on_status(STATUS_SEARCHING);

        let route = classify(barcode.as_str());
        if route.skips_catalog_race() {
            self.enter(SearchPhase::BookFallback);
            debug!(?route, "Book barcode, skipping catalog race");
            return SearchOutcome::BookDetected {
                barcode: barcode.clone(),
            };
        }

        if !self.catalogs.is_empty() {
            self.enter(SearchPhase::Racing);

            if let Some(candidate) = self.race(barcode, session).await {
                return SearchOutcome::CatalogHit {
                    candidate,
                    barcode: barcode.clone(),
                };
            }
        }

        self.enter(SearchPhase::BackupChecking);
        self.observer.on_status(STATUS_DEEP_LOOKUP);

        if let Some(candidate) = self.check_backup(barcode, session).await {
            return SearchOutcome::BackupHit {
                candidate,
                barcode: barcode.clone(),
            };
        }

        self.enter(SearchPhase::ManualEntry);
        SearchOutcome::ManualEntryRequired {
            barcode: barcode.clone(),
        }
    }

    // =========================================================================
    // Phases
    // =========================================================================

    async fn check_cloud(&self, barcode: &Barcode) -> Option<tally_core::ConfirmedRecord> {
        match tokio::time::timeout(self.settings.lookup_timeout, self.cloud.lookup(barcode)).await
        {
            Ok(CloudLookup::Found(record)) => {
                debug!(name = %record.name, "Cloud hit");
                Some(record)
            }
            Ok(CloudLookup::NotFound) => None,
            Err(_) => {
                warn!(timeout = ?self.settings.lookup_timeout, "Cloud lookup timed out");
                None
            }
        }
    }

    /// Runs every catalog at once. Returns the first found candidate, or
    /// `None` once every catalog has missed.
    async fn race(&self, barcode: &Barcode, session: &CancellationToken) -> Option<CandidateRecord> {
        let width = self.race_width();
        let mut pending = FuturesUnordered::new();

        for (index, client) in self.catalogs.iter().enumerate() {
            let client = Arc::clone(client);
            let bc = barcode.clone();
            let handle = LookupHandle::spawn(
                client.name().to_string(),
                self.settings.lookup_timeout,
                session,
                move |token| async move { client.lookup(&bc, &token).await },
            );

            self.lock_in_flight().push((index, handle.token()));
            pending.push(async move { (index, handle.join().await) });
        }

        while let Some((index, (source, result))) = pending.next().await {
            self.lock_in_flight().retain(|(i, _)| *i != index);

            match result {
                None => debug!(source = %source, "Cancelled lookup ignored"),
                Some(LookupResult::Found(candidate)) => {
                    info!(source = %source, name = %candidate.name, "Catalog race won");
                    self.cancel_in_flight();
                    return Some(candidate);
                }
                Some(miss) => {
                    let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                    if let LookupResult::Error(e) = &miss {
                        debug!(source = %source, error = %e, "Catalog lookup failed");
                    }
                    debug!(source = %source, result = miss.label(), failures, width, "Catalog missed");

                    if failures >= width {
                        return None;
                    }
                }
            }
        }

        None
    }

    async fn check_backup(
        &self,
        barcode: &Barcode,
        session: &CancellationToken,
    ) -> Option<CandidateRecord> {
        let backup = Arc::clone(&self.backup);
        let bc = barcode.clone();
        let handle = LookupHandle::spawn(
            backup.name().to_string(),
            self.settings.lookup_timeout,
            session,
            move |token| async move { backup.lookup(&bc, &token).await },
        );

        let (source, result) = handle.join().await;
        match result {
            Some(LookupResult::Found(candidate)) => {
                info!(source = %source, name = %candidate.name, "Backup hit");
                Some(candidate)
            }
            Some(miss) => {
                debug!(source = %source, result = miss.label(), "Backup missed");
                None
            }
            None => None,
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    fn enter(&self, phase: SearchPhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
        debug!(%phase, "Search phase");
        self.observer.on_phase(phase);
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, Vec<(usize, CancellationToken)>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cancel_in_flight(&self) {
        let mut in_flight = self.lock_in_flight();
        for (_, token) in in_flight.iter() {
            token.cancel();
        }
        in_flight.clear();
    }

    /// Current phase, for diagnostics.
    pub fn phase(&self) -> SearchPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True while a session holds the single-flight flag.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Misses counted in the current (or last) race.
    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Acquire)
    }

    /// Race lookups still waiting for an answer.
    pub fn in_flight(&self) -> usize {
        self.lock_in_flight().len()
    }

    /// Number of catalogs raced, which is also the failure threshold.
    pub fn race_width(&self) -> usize {
        self.catalogs.len()
    }

    pub fn settings(&self) -> SearchSettings {
        self.settings
    }
}

impl fmt::Debug for SearchCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchCoordinator")
            .field("catalogs", &self.catalogs.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("backup", &self.backup.name())
            .field("settings", &self.settings)
            .field("active", &self.is_active())
            .field("phase", &self.phase())
            .finish()
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for [`SearchCoordinator`].
pub struct SearchCoordinatorBuilder {
    cloud: Option<Arc<dyn CloudStore>>,
    catalogs: Vec<Arc<dyn CatalogClient>>,
    backup: Option<Arc<dyn BackupCatalogClient>>,
    observer: Option<Arc<dyn SearchObserver>>,
    settings: SearchSettings,
}

impl SearchCoordinatorBuilder {
    pub fn new() -> Self {
        SearchCoordinatorBuilder {
            cloud: None,
            catalogs: Vec::new(),
            backup: None,
            observer: None,
            settings: SearchSettings::default(),
        }
    }

    pub fn with_cloud(mut self, cloud: Arc<dyn CloudStore>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    /// Adds one catalog to the race.
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogClient>) -> Self {
        self.catalogs.push(catalog);
        self
    }

    pub fn with_catalogs(mut self, catalogs: impl IntoIterator<Item = Arc<dyn CatalogClient>>) -> Self {
        self.catalogs.extend(catalogs);
        self
    }

    pub fn with_backup(mut self, backup: Arc<dyn BackupCatalogClient>) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SearchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_settings(mut self, settings: SearchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builds the coordinator. The cloud store and backup are required.
    pub fn build(self) -> Result<SearchCoordinator> {
        let cloud = self
            .cloud
            .ok_or_else(|| LookupError::InvalidConfig("Cloud store required".into()))?;
        let backup = self
            .backup
            .ok_or_else(|| LookupError::InvalidConfig("Backup catalog required".into()))?;

        if self.settings.lookup_timeout.is_zero() {
            return Err(LookupError::InvalidConfig(
                "Lookup timeout must be greater than 0".into(),
            ));
        }

        Ok(SearchCoordinator {
            cloud,
            catalogs: self.catalogs,
            backup,
            observer: self.observer.unwrap_or_else(|| Arc::new(NoOpObserver)),
            settings: self.settings,
            active: AtomicBool::new(false),
            failures: AtomicUsize::new(0),
            phase: Mutex::new(SearchPhase::Idle),
            in_flight: Mutex::new(Vec::new()),
        })
    }
}

impl Default for SearchCoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{barcode, candidate, confirmed, Answer, FakeCloud, FakeSource, RecordingObserver};

    fn coordinator(
        cloud: Arc<FakeCloud>,
        catalogs: &[Arc<FakeSource>],
        backup: Arc<FakeSource>,
    ) -> SearchCoordinator {
        SearchCoordinator::builder()
            .with_cloud(cloud)
            .with_catalogs(catalogs.iter().map(|c| c.clone() as Arc<dyn CatalogClient>))
            .with_backup(backup)
            .build()
            .unwrap()
    }

    fn misses(n: usize) -> Vec<Arc<FakeSource>> {
        (0..n)
            .map(|i| FakeSource::new(&format!("catalog-{}", i), Answer::NotFound))
            .collect()
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        while !condition() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cloud_hit_skips_catalogs() {
        let catalogs = misses(3);
        let backup = FakeSource::new("backup", Answer::NotFound);
        let record = confirmed("890111", "Rice 5kg");
        let search = coordinator(FakeCloud::hit(record.clone()), &catalogs, backup.clone());

        let outcome = search.resolve(&barcode("890111")).await.unwrap();

        assert_eq!(outcome, SearchOutcome::CloudHit { record });
        assert!(catalogs.iter().all(|c| c.calls() == 0));
        assert_eq!(backup.calls(), 0);
        assert!(!search.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_book_skips_race() {
        let catalogs = misses(3);
        let backup = FakeSource::new("backup", Answer::NotFound);
        let observer = Arc::new(RecordingObserver::default());
        let search = SearchCoordinator::builder()
            .with_cloud(FakeCloud::miss())
            .with_catalogs(catalogs.iter().map(|c| c.clone() as Arc<dyn CatalogClient>))
            .with_backup(backup.clone())
            .with_observer(observer.clone())
            .build()
            .unwrap();

        let outcome = search.resolve(&barcode("9781234")).await.unwrap();

        assert_eq!(
            outcome,
            SearchOutcome::BookDetected {
                barcode: barcode("9781234")
            }
        );
        assert!(catalogs.iter().all(|c| c.calls() == 0));
        assert_eq!(backup.calls(), 0);
        assert_eq!(observer.statuses(), vec![STATUS_IDENTIFYING, STATUS_SEARCHING]);
        assert_eq!(
            observer.phases(),
            vec![
                SearchPhase::CloudChecking,
                SearchPhase::BookFallback,
                SearchPhase::Idle
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_padded_book_prefix_still_races() {
        let catalogs = misses(3);
        let search = coordinator(
            FakeCloud::miss(),
            &catalogs,
            FakeSource::new("backup", Answer::NotFound),
        );

        let outcome = search.resolve(&barcode(" 9781234")).await.unwrap();

        assert!(matches!(outcome, SearchOutcome::ManualEntryRequired { .. }));
        assert!(catalogs.iter().all(|c| c.calls() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_found_wins_and_cancels_the_rest() {
        let first = FakeSource::new("food", Answer::Pending);
        let second = FakeSource::delayed(
            "beauty",
            Answer::Found(candidate("Widget", "BrandX")),
            Duration::from_millis(50),
        );
        let third = FakeSource::new("product", Answer::Pending);
        let backup = FakeSource::new("backup", Answer::NotFound);
        let search = coordinator(
            FakeCloud::miss(),
            &[first.clone(), second.clone(), third.clone()],
            backup.clone(),
        );

        let outcome = search.resolve(&barcode("500123")).await.unwrap();

        assert_eq!(
            outcome,
            SearchOutcome::CatalogHit {
                candidate: candidate("Widget", "BrandX"),
                barcode: barcode("500123"),
            }
        );
        assert!(first.was_cancelled());
        assert!(third.was_cancelled());
        assert_eq!(backup.calls(), 0);
        assert_eq!(search.failure_count(), 0);
        assert_eq!(search.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_earliest_of_several_hits_wins() {
        let early = FakeSource::delayed(
            "food",
            Answer::Found(candidate("Widget", "BrandX")),
            Duration::from_millis(50),
        );
        let late = FakeSource::delayed(
            "beauty",
            Answer::Found(candidate("Gadget", "BrandY")),
            Duration::from_millis(100),
        );
        let backup = FakeSource::new("backup", Answer::NotFound);
        // Slower hit listed first so arrival order, not list order, decides.
        let search = coordinator(
            FakeCloud::miss(),
            &[late.clone(), early.clone()],
            backup.clone(),
        );

        let outcome = search.resolve(&barcode("500125")).await.unwrap();

        assert_eq!(
            outcome,
            SearchOutcome::CatalogHit {
                candidate: candidate("Widget", "BrandX"),
                barcode: barcode("500125"),
            }
        );
        assert!(late.was_cancelled());
        assert_eq!(search.failure_count(), 0);
        assert_eq!(backup.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_misses_before_a_late_win_do_not_reach_backup() {
        let catalogs = [
            FakeSource::new("food", Answer::Error),
            FakeSource::new("beauty", Answer::NotFound),
            FakeSource::delayed(
                "product",
                Answer::Found(candidate("Lamp", "Lumo")),
                Duration::from_millis(100),
            ),
        ];
        let backup = FakeSource::new("backup", Answer::NotFound);
        let search = coordinator(FakeCloud::miss(), &catalogs, backup.clone());

        let outcome = search.resolve(&barcode("500124")).await.unwrap();

        assert!(matches!(outcome, SearchOutcome::CatalogHit { ref candidate, .. } if candidate.name == "Lamp"));
        assert_eq!(search.failure_count(), 2);
        assert_eq!(backup.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_miss_then_backup_miss_is_manual_entry() {
        let catalogs = misses(3);
        let backup = FakeSource::new("backup", Answer::NotFound);
        let observer = Arc::new(RecordingObserver::default());
        let search = SearchCoordinator::builder()
            .with_cloud(FakeCloud::miss())
            .with_catalogs(catalogs.iter().map(|c| c.clone() as Arc<dyn CatalogClient>))
            .with_backup(backup.clone())
            .with_observer(observer.clone())
            .build()
            .unwrap();

        let outcome = search.resolve(&barcode("500123")).await.unwrap();

        assert_eq!(
            outcome,
            SearchOutcome::ManualEntryRequired {
                barcode: barcode("500123")
            }
        );
        assert_eq!(backup.calls(), 1);
        assert_eq!(search.failure_count(), 3);
        assert_eq!(
            observer.statuses(),
            vec![STATUS_IDENTIFYING, STATUS_SEARCHING, STATUS_DEEP_LOOKUP]
        );
        assert_eq!(
            observer.phases(),
            vec![
                SearchPhase::CloudChecking,
                SearchPhase::Racing,
                SearchPhase::BackupChecking,
                SearchPhase::ManualEntry,
                SearchPhase::Idle,
            ]
        );
        assert_eq!(search.phase(), SearchPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_fall_through_to_backup_hit() {
        let catalogs: Vec<_> = (0..3)
            .map(|i| FakeSource::new(&format!("catalog-{}", i), Answer::Error))
            .collect();
        let backup = FakeSource::new(
            "backup",
            Answer::Found(candidate("Desk Lamp", "Lumo")),
        );
        let search = coordinator(FakeCloud::miss(), &catalogs, backup.clone());

        let outcome = search.resolve(&barcode("0885909950805")).await.unwrap();

        assert!(matches!(outcome, SearchOutcome::BackupHit { ref candidate, .. } if candidate.name == "Desk Lamp"));
        assert_eq!(backup.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let catalogs = [
            FakeSource::new("food", Answer::NotFound),
            FakeSource::new("beauty", Answer::Pending),
            FakeSource::new("product", Answer::NotFound),
        ];
        let backup = FakeSource::new("backup", Answer::NotFound);
        let search = coordinator(FakeCloud::miss(), &catalogs, backup.clone());

        let started = tokio::time::Instant::now();
        let outcome = search.resolve(&barcode("500123")).await.unwrap();

        assert!(outcome.needs_manual_entry());
        assert_eq!(search.failure_count(), 3);
        assert_eq!(backup.calls(), 1);
        assert!(started.elapsed() >= Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_width_sets_the_threshold() {
        let catalogs = misses(5);
        let backup = FakeSource::new("backup", Answer::NotFound);
        let search = coordinator(FakeCloud::miss(), &catalogs, backup.clone());
        assert_eq!(search.race_width(), 5);

        search.resolve(&barcode("500123")).await.unwrap();

        assert_eq!(search.failure_count(), 5);
        assert_eq!(backup.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_catalogs_goes_straight_to_backup() {
        let backup = FakeSource::new("backup", Answer::Found(candidate("Lamp", "Lumo")));
        let search = coordinator(FakeCloud::miss(), &[], backup.clone());

        let outcome = search.resolve(&barcode("500123")).await.unwrap();

        assert_eq!(outcome.kind(), "backup_hit");
        assert_eq!(backup.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_resolve_while_active_is_dropped() {
        let catalogs = misses(3);
        let search = Arc::new(coordinator(
            FakeCloud::slow_miss(Duration::from_secs(1)),
            &catalogs,
            FakeSource::new("backup", Answer::NotFound),
        ));

        let first = {
            let search = search.clone();
            tokio::spawn(async move { search.resolve(&barcode("500123")).await })
        };
        wait_until(|| search.is_active()).await;

        assert!(search.resolve(&barcode("500999")).await.is_none());

        let outcome = first.await.unwrap().unwrap();
        assert_eq!(outcome.barcode(), &barcode("500123"));
        assert!(catalogs.iter().all(|c| c.calls() == 1));
        assert!(!search.is_active());

        // The flag is free again.
        assert!(search.resolve(&barcode("500999")).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_count_resets_per_session() {
        let search = coordinator(
            FakeCloud::miss(),
            &misses(3),
            FakeSource::new("backup", Answer::NotFound),
        );

        search.resolve(&barcode("1")).await.unwrap();
        search.resolve(&barcode("2")).await.unwrap();

        assert_eq!(search.failure_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_resolve_releases_the_flag() {
        let pending = FakeSource::new("food", Answer::Pending);
        let search = Arc::new(coordinator(
            FakeCloud::miss(),
            &[pending.clone()],
            FakeSource::new("backup", Answer::NotFound),
        ));

        let task = {
            let search = search.clone();
            tokio::spawn(async move { search.resolve(&barcode("500123")).await })
        };
        wait_until(|| pending.calls() == 1).await;
        assert!(search.is_active());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert!(!search.is_active());
        assert!(pending.was_cancelled());
    }

    #[test]
    fn test_builder_requires_sources() {
        let err = SearchCoordinator::builder()
            .with_backup(FakeSource::new("backup", Answer::NotFound))
            .build()
            .unwrap_err();
        assert!(err.is_config_error());

        let err = SearchCoordinator::builder()
            .with_cloud(FakeCloud::miss())
            .with_backup(FakeSource::new("backup", Answer::NotFound))
            .with_settings(SearchSettings {
                lookup_timeout: Duration::ZERO,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, LookupError::InvalidConfig(_)));
    }

    #[test]
    fn test_session_guard_is_single_flight() {
        let active = AtomicBool::new(false);
        let guard = SessionGuard::acquire(&active).unwrap();
        assert!(SessionGuard::acquire(&active).is_none());

        assert!(guard.release());
        assert!(!guard.release());
        assert!(guard.token().is_cancelled());

        // A stale guard must not free a newer session's flag.
        let newer = SessionGuard::acquire(&active).unwrap();
        drop(guard);
        assert!(active.load(Ordering::Acquire));
        drop(newer);
        assert!(!active.load(Ordering::Acquire));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(SearchPhase::BackupChecking.to_string(), "backup_checking");
        assert_eq!(SearchPhase::default(), SearchPhase::Idle);
    }
}
