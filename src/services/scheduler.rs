//! Auto-scrape scheduler
//!
//! Each enabled scrape config owns one fixed-rate timer task. Every tick runs
//! in its own task so a slow scrape never shifts the timer; a tick that fires
//! while the previous tick of the same config is still running is skipped.
//!
//! Clearing a timer stops future ticks only. A tick already in flight runs to
//! completion and may still write its results.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::clock::SharedClock;
use super::manager::{Service, ServiceHealth};
use super::scraper::{ScrapeJob, ScrapeRoutine, ScrapeSummary};
use crate::db::{Database, NewScrapeRun, ScrapeConfigRecord};

/// Storage the scheduler needs: the configs and a place to record results
#[async_trait]
pub trait ScrapeConfigStore: Send + Sync {
    async fn list_configs(&self) -> Result<Vec<ScrapeConfigRecord>>;

    async fn get_config(&self, id: &str) -> Result<Option<ScrapeConfigRecord>>;

    /// Persist the timestamps of a successful run
    async fn record_success(
        &self,
        id: &str,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<()>;

    /// Persist when the live timer fires next
    async fn set_next_run(&self, id: &str, next_run: DateTime<Utc>) -> Result<()>;

    /// Append one entry to the run history
    async fn record_run(&self, run: &NewScrapeRun) -> Result<()>;
}

#[async_trait]
impl ScrapeConfigStore for Database {
    async fn list_configs(&self) -> Result<Vec<ScrapeConfigRecord>> {
        self.scrape_configs().list().await
    }

    async fn get_config(&self, id: &str) -> Result<Option<ScrapeConfigRecord>> {
        self.scrape_configs().get(id).await
    }

    async fn record_success(
        &self,
        id: &str,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<()> {
        self.scrape_configs()
            .record_success(id, last_run, next_run)
            .await
    }

    async fn set_next_run(&self, id: &str, next_run: DateTime<Utc>) -> Result<()> {
        self.scrape_configs().set_next_run(id, next_run).await
    }

    async fn record_run(&self, run: &NewScrapeRun) -> Result<()> {
        self.scrape_configs().insert_run(run).await.map(|_| ())
    }
}

/// What started a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Schedule,
    Manual,
}

impl Trigger {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Manual => "manual",
        }
    }
}

/// Result of asking for an immediate run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunNow {
    Started,
    Busy,
    NotFound,
}

/// Outcome of one executed tick, as written to the run history
enum TickOutcome {
    Completed(ScrapeSummary),
    Failed(String),
}

struct Shared {
    store: Arc<dyn ScrapeConfigStore>,
    routine: Arc<dyn ScrapeRoutine>,
    clock: SharedClock,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    /// Outlives timers so a rescheduled config still sees its in-flight tick
    busy: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

/// Held while a tick runs; releases the config's busy flag when dropped
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Shared {
    fn try_begin(&self, id: &str) -> Option<BusyGuard> {
        let flag = self
            .busy
            .lock()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone();

        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(BusyGuard(flag))
        }
    }

    async fn execute(
        &self,
        config: &ScrapeConfigRecord,
        trigger: Trigger,
        _guard: BusyGuard,
    ) {
        let started_at = self.clock.now();
        debug!(
            service = "scheduler",
            config_id = %config.id,
            trigger = trigger.as_str(),
            "Scrape tick started"
        );

        let result = self.routine.run(&ScrapeJob::from(config)).await;
        let outcome = match result {
            Ok(summary) => {
                let next_run = started_at + config.interval();
                match self.store.record_success(&config.id, started_at, next_run).await {
                    Ok(()) => TickOutcome::Completed(summary),
                    Err(e) => {
                        error!(
                            service = "scheduler",
                            config_id = %config.id,
                            error = %e,
                            "Failed to record scrape run"
                        );
                        TickOutcome::Failed(format!("failed to record run: {}", e))
                    }
                }
            }
            Err(e) => {
                error!(
                    service = "scheduler",
                    config_id = %config.id,
                    error = %format!("{:#}", e),
                    "Scrape tick failed"
                );
                TickOutcome::Failed(format!("{:#}", e))
            }
        };

        let (status, summary, error) = match &outcome {
            TickOutcome::Completed(summary) => ("success", summary.clone(), None),
            TickOutcome::Failed(message) => ("failed", ScrapeSummary::default(), Some(message.clone())),
        };
        let run = NewScrapeRun {
            config_id: config.id.clone(),
            trigger: trigger.as_str().to_string(),
            status: status.to_string(),
            pages: summary.pages,
            fetched: summary.fetched,
            inserted: summary.inserted,
            updated: summary.updated,
            skipped: summary.skipped,
            error,
            started_at,
            finished_at: self.clock.now(),
        };
        if let Err(e) = self.store.record_run(&run).await {
            warn!(service = "scheduler", config_id = %config.id, error = %e, "Failed to store run history");
        }
    }

    /// Start a tick in its own task unless the previous one is still running
    fn spawn_tick(self: &Arc<Self>, config: ScrapeConfigRecord, trigger: Trigger) -> bool {
        let Some(guard) = self.try_begin(&config.id) else {
            warn!(
                service = "scheduler",
                config_id = %config.id,
                "Previous scrape still running, skipping tick"
            );
            return false;
        };

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            shared.execute(&config, trigger, guard).await;
        });
        true
    }
}

/// Owns one timer per scheduled scrape config
#[derive(Clone)]
pub struct AutoScrapeScheduler {
    shared: Arc<Shared>,
    autostart: bool,
}

impl AutoScrapeScheduler {
    pub fn new(
        store: Arc<dyn ScrapeConfigStore>,
        routine: Arc<dyn ScrapeRoutine>,
        clock: SharedClock,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                routine,
                clock,
                timers: Mutex::new(HashMap::new()),
                busy: Mutex::new(HashMap::new()),
            }),
            autostart: true,
        }
    }

    /// Whether [Service::start] loads the stored configs
    pub fn with_autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    /// Register a fixed-rate timer for `config`, replacing any existing one.
    /// The first tick fires one interval from now.
    pub fn schedule(&self, config: ScrapeConfigRecord) {
        let id = config.id.clone();
        let period = config.period();
        let start = Instant::now() + period;
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);

        let mut timers = self.shared.timers.lock();
        if let Some(previous) = timers.remove(&id) {
            previous.abort();
        }

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                shared.spawn_tick(config.clone(), Trigger::Schedule);
            }
        });
        timers.insert(id.clone(), handle);

        info!(
            service = "scheduler",
            config_id = %id,
            interval_secs = period.as_secs(),
            "Auto-scrape scheduled"
        );
    }

    /// Cancel the timer of one config. Returns whether one existed.
    pub fn clear(&self, id: &str) -> bool {
        match self.shared.timers.lock().remove(id) {
            Some(handle) => {
                handle.abort();
                info!(service = "scheduler", config_id = %id, "Auto-scrape cleared");
                true
            }
            None => false,
        }
    }

    /// Cancel every timer. Returns how many were cancelled.
    pub fn clear_all(&self) -> usize {
        let drained: Vec<_> = self.shared.timers.lock().drain().collect();
        for (_, handle) in &drained {
            handle.abort();
        }
        if !drained.is_empty() {
            info!(service = "scheduler", count = drained.len(), "All auto-scrapes cleared");
        }
        drained.len()
    }

    /// Replace all timers with one per enabled stored config.
    /// Each config's stored `next_run` is moved to its new first tick.
    pub async fn initialize_from_storage(&self) -> Result<usize> {
        let configs = self.shared.store.list_configs().await?;
        self.clear_all();

        let now = self.shared.clock.now();
        let mut scheduled = 0;
        for mut config in configs.into_iter().filter(|c| c.enabled) {
            if let Some(next_run) = now.checked_add_signed(config.interval()) {
                if let Err(e) = self.shared.store.set_next_run(&config.id, next_run).await {
                    warn!(service = "scheduler", config_id = %config.id, error = %e, "Failed to store next run");
                }
                config.next_run = Some(next_run);
            }
            self.schedule(config);
            scheduled += 1;
        }

        info!(service = "scheduler", scheduled, "Auto-scrapes initialized from storage");
        Ok(scheduled)
    }

    /// Run a config immediately, outside its timer
    pub async fn run_now(&self, id: &str) -> Result<RunNow> {
        let Some(config) = self.shared.store.get_config(id).await? else {
            return Ok(RunNow::NotFound);
        };
        if self.shared.spawn_tick(config, Trigger::Manual) {
            Ok(RunNow::Started)
        } else {
            Ok(RunNow::Busy)
        }
    }

    pub fn is_scheduled(&self, id: &str) -> bool {
        self.shared.timers.lock().contains_key(id)
    }

    /// Ids with a live timer, sorted
    pub fn scheduled_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared.timers.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids with a tick in flight, sorted
    pub fn busy_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .shared
            .busy
            .lock()
            .iter()
            .filter(|(_, flag)| flag.load(Ordering::SeqCst))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Service for AutoScrapeScheduler {
    fn name(&self) -> &str {
        "scheduler"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["database".to_string()]
    }

    async fn start(&self) -> Result<()> {
        if !self.autostart {
            info!(service = "scheduler", "Auto-scrape disabled, not loading configs");
            return Ok(());
        }
        self.initialize_from_storage().await?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.clear_all();
        Ok(())
    }

    /// Degraded while an enabled config has no live timer
    async fn health(&self) -> Result<ServiceHealth> {
        if !self.autostart {
            return Ok(ServiceHealth::healthy());
        }
        let configs = self.shared.store.list_configs().await?;
        let unscheduled = configs
            .iter()
            .filter(|c| c.enabled && !self.is_scheduled(&c.id))
            .count();
        if unscheduled > 0 {
            Ok(ServiceHealth::degraded(format!(
                "{} enabled scrape config(s) have no timer",
                unscheduled
            )))
        } else {
            Ok(ServiceHealth::healthy())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ScrapeSourceType;
    use crate::services::clock::TokioClock;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryStore {
        configs: Mutex<Vec<ScrapeConfigRecord>>,
        runs: Mutex<Vec<NewScrapeRun>>,
    }

    impl MemoryStore {
        fn with(configs: Vec<ScrapeConfigRecord>) -> Arc<Self> {
            Arc::new(Self {
                configs: Mutex::new(configs),
                ..Default::default()
            })
        }

        fn config(&self, id: &str) -> ScrapeConfigRecord {
            self.configs
                .lock()
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .unwrap()
        }
    }

    #[async_trait]
    impl ScrapeConfigStore for MemoryStore {
        async fn list_configs(&self) -> Result<Vec<ScrapeConfigRecord>> {
            Ok(self.configs.lock().clone())
        }

        async fn get_config(&self, id: &str) -> Result<Option<ScrapeConfigRecord>> {
            Ok(self.configs.lock().iter().find(|c| c.id == id).cloned())
        }

        async fn record_success(
            &self,
            id: &str,
            last_run: DateTime<Utc>,
            next_run: DateTime<Utc>,
        ) -> Result<()> {
            let mut configs = self.configs.lock();
            if let Some(config) = configs.iter_mut().find(|c| c.id == id) {
                config.last_run = Some(last_run);
                config.next_run = Some(next_run);
            }
            Ok(())
        }

        async fn set_next_run(&self, id: &str, next_run: DateTime<Utc>) -> Result<()> {
            if let Some(config) = self.configs.lock().iter_mut().find(|c| c.id == id) {
                config.next_run = Some(next_run);
            }
            Ok(())
        }

        async fn record_run(&self, run: &NewScrapeRun) -> Result<()> {
            self.runs.lock().push(run.clone());
            Ok(())
        }
    }

    /// Counts calls; fails while `failing` is set and sleeps for `delay`
    #[derive(Default)]
    struct CountingRoutine {
        calls: AtomicUsize,
        failing: AtomicBool,
        delay: Option<Duration>,
        jobs: Mutex<Vec<ScrapeJob>>,
    }

    #[async_trait]
    impl ScrapeRoutine for CountingRoutine {
        async fn run(&self, job: &ScrapeJob) -> Result<ScrapeSummary> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.jobs.lock().push(job.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("catalog unavailable");
            }
            Ok(ScrapeSummary {
                pages: 1,
                inserted: 2,
                ..Default::default()
            })
        }
    }

    fn config(id: &str, enabled: bool, interval_minutes: i64) -> ScrapeConfigRecord {
        let now = Utc::now();
        ScrapeConfigRecord {
            id: id.to_string(),
            name: id.to_string(),
            enabled,
            source_type: ScrapeSourceType::Movies,
            start_page: 1,
            end_page: 5,
            keyword: None,
            interval_minutes,
            update_existing: false,
            last_run: None,
            next_run: None,
            created_at: now,
            updated_at: now,
        }
    }

    struct Harness {
        scheduler: AutoScrapeScheduler,
        store: Arc<MemoryStore>,
        routine: Arc<CountingRoutine>,
        t0: DateTime<Utc>,
    }

    fn harness(configs: Vec<ScrapeConfigRecord>, routine: CountingRoutine) -> Harness {
        let t0 = Utc::now();
        let store = MemoryStore::with(configs);
        let routine = Arc::new(routine);
        let scheduler = AutoScrapeScheduler::new(
            store.clone(),
            routine.clone(),
            Arc::new(TokioClock::new(t0)),
        );
        Harness {
            scheduler,
            store,
            routine,
            t0,
        }
    }

    impl Harness {
        fn calls(&self) -> usize {
            self.routine.calls.load(Ordering::SeqCst)
        }
    }

    /// Let spawned timer and tick tasks run without moving the clock
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance_minutes(minutes: u64) {
        tokio::time::advance(Duration::from_secs(minutes * 60)).await;
        settle().await;
    }

    fn minutes(n: i64) -> chrono::Duration {
        chrono::Duration::minutes(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_skips_disabled_configs() {
        let h = harness(
            vec![config("c1", true, 15), config("c2", false, 15)],
            CountingRoutine::default(),
        );

        assert_eq!(h.scheduler.initialize_from_storage().await.unwrap(), 1);
        assert_eq!(h.scheduler.scheduled_ids(), vec!["c1".to_string()]);
        assert!(!h.scheduler.is_scheduled("c2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_moves_stale_next_run_to_first_tick() {
        let mut c1 = config("c1", true, 15);
        c1.next_run = Some(Utc::now() - minutes(600));
        let h = harness(vec![c1, config("c2", false, 15)], CountingRoutine::default());

        h.scheduler.initialize_from_storage().await.unwrap();
        assert_eq!(h.store.config("c1").next_run, Some(h.t0 + minutes(15)));
        assert_eq!(h.store.config("c2").next_run, None);

        advance_minutes(15).await;
        assert_eq!(h.calls(), 1);
        assert_eq!(h.store.config("c1").last_run, Some(h.t0 + minutes(15)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_interval_schedules_without_overflow() {
        let h = harness(
            vec![config("c1", true, i64::MAX)],
            CountingRoutine::default(),
        );

        assert_eq!(h.scheduler.initialize_from_storage().await.unwrap(), 1);
        assert!(h.scheduler.is_scheduled("c1"));
        assert_eq!(
            h.store.config("c1").next_run,
            Some(h.t0 + minutes(crate::db::scrape_configs::MAX_INTERVAL_MINUTES))
        );

        advance_minutes(60).await;
        assert_eq!(h.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_twice_keeps_one_timer_per_config() {
        let h = harness(vec![config("c1", true, 15)], CountingRoutine::default());

        h.scheduler.initialize_from_storage().await.unwrap();
        h.scheduler.initialize_from_storage().await.unwrap();
        assert_eq!(h.scheduler.scheduled_ids(), vec!["c1".to_string()]);

        advance_minutes(15).await;
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_then_clear_never_runs() {
        let h = harness(vec![], CountingRoutine::default());

        h.scheduler.schedule(config("c1", true, 15));
        assert!(h.scheduler.clear("c1"));
        assert!(!h.scheduler.clear("c1"));

        advance_minutes(60).await;
        assert_eq!(h.calls(), 0);
        assert!(h.scheduler.scheduled_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_tick_records_last_and_next_run() {
        let c1 = config("c1", true, 15);
        let h = harness(vec![c1.clone()], CountingRoutine::default());
        h.scheduler.schedule(c1);

        advance_minutes(14).await;
        assert_eq!(h.calls(), 0);

        advance_minutes(1).await;
        assert_eq!(h.calls(), 1);
        let stored = h.store.config("c1");
        assert_eq!(stored.last_run, Some(h.t0 + minutes(15)));
        assert_eq!(stored.next_run, Some(h.t0 + minutes(30)));

        let job = h.routine.jobs.lock()[0].clone();
        assert_eq!((job.start_page, job.end_page), (1, 5));
        assert_eq!(job.source_type, ScrapeSourceType::Movies);

        let runs = h.store.runs.lock();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, "success");
        assert_eq!(runs[0].trigger, "schedule");
        assert_eq!(runs[0].inserted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_keeps_timestamps_and_schedule() {
        let c1 = config("c1", true, 15);
        let h = harness(
            vec![c1.clone()],
            CountingRoutine {
                failing: AtomicBool::new(true),
                ..Default::default()
            },
        );
        h.scheduler.schedule(c1);

        advance_minutes(15).await;
        assert_eq!(h.calls(), 1);
        let stored = h.store.config("c1");
        assert_eq!(stored.last_run, None);
        assert_eq!(stored.next_run, None);
        assert_eq!(h.store.runs.lock()[0].status, "failed");
        assert!(h.scheduler.is_scheduled("c1"));

        h.routine.failing.store(false, Ordering::SeqCst);
        advance_minutes(15).await;
        assert_eq!(h.calls(), 2);
        assert_eq!(h.store.config("c1").last_run, Some(h.t0 + minutes(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_tick_is_skipped() {
        let c1 = config("c1", true, 15);
        let h = harness(
            vec![c1.clone()],
            CountingRoutine {
                delay: Some(Duration::from_secs(20 * 60)),
                ..Default::default()
            },
        );
        h.scheduler.schedule(c1);

        advance_minutes(15).await;
        assert_eq!(h.calls(), 1);
        assert_eq!(h.scheduler.busy_ids(), vec!["c1".to_string()]);

        // 30min: first tick still sleeping until 35min
        advance_minutes(15).await;
        assert_eq!(h.calls(), 1);

        advance_minutes(5).await;
        assert!(h.scheduler.busy_ids().is_empty());

        advance_minutes(10).await;
        assert_eq!(h.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_does_not_abort_in_flight_tick() {
        let c1 = config("c1", true, 15);
        let h = harness(
            vec![c1.clone()],
            CountingRoutine {
                delay: Some(Duration::from_secs(60)),
                ..Default::default()
            },
        );
        h.scheduler.schedule(c1);

        advance_minutes(15).await;
        assert_eq!(h.calls(), 1);
        h.scheduler.clear_all();

        advance_minutes(1).await;
        assert!(h.store.config("c1").last_run.is_some());

        advance_minutes(30).await;
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_timer() {
        let h = harness(vec![], CountingRoutine::default());

        h.scheduler.schedule(config("c1", true, 15));
        advance_minutes(10).await;
        h.scheduler.schedule(config("c1", true, 15));

        // the replaced timer would have fired at 15min
        advance_minutes(10).await;
        assert_eq!(h.calls(), 0);
        advance_minutes(5).await;
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_now() {
        let h = harness(
            vec![config("c1", false, 15)],
            CountingRoutine {
                delay: Some(Duration::from_secs(10)),
                ..Default::default()
            },
        );

        assert_eq!(h.scheduler.run_now("c1").await.unwrap(), RunNow::Started);
        settle().await;
        assert_eq!(h.scheduler.run_now("c1").await.unwrap(), RunNow::Busy);
        assert_eq!(h.scheduler.run_now("nope").await.unwrap(), RunNow::NotFound);

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(h.calls(), 1);
        assert_eq!(h.store.runs.lock()[0].trigger, "manual");
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_stop_clears_timers() {
        let h = harness(vec![config("c1", true, 15)], CountingRoutine::default());

        h.scheduler.start().await.unwrap();
        assert!(h.scheduler.is_scheduled("c1"));
        h.scheduler.stop().await.unwrap();
        assert!(h.scheduler.scheduled_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_degraded_until_enabled_configs_are_scheduled() {
        use crate::services::manager::HealthStatus;

        let h = harness(
            vec![config("c1", true, 15), config("c2", false, 15)],
            CountingRoutine::default(),
        );
        assert_eq!(h.scheduler.health().await.unwrap().status, HealthStatus::Degraded);

        h.scheduler.initialize_from_storage().await.unwrap();
        assert_eq!(h.scheduler.health().await.unwrap().status, HealthStatus::Healthy);

        let manual = h.scheduler.clone().with_autostart(false);
        manual.clear_all();
        assert_eq!(manual.health().await.unwrap().status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_database_store_records_runs() {
        let db = crate::db::test_db().await;
        let created = db
            .scrape_configs()
            .create(
                &crate::db::CreateScrapeConfig {
                    name: "movies".to_string(),
                    enabled: true,
                    source_type: ScrapeSourceType::Movies,
                    start_page: 1,
                    end_page: 2,
                    keyword: None,
                    interval_minutes: 15,
                    update_existing: false,
                },
                None,
            )
            .await
            .unwrap();

        let routine = Arc::new(CountingRoutine::default());
        let t0 = Utc::now();
        let scheduler = AutoScrapeScheduler::new(
            Arc::new(db.clone()),
            routine.clone(),
            Arc::new(TokioClock::new(t0)),
        );
        assert_eq!(scheduler.run_now(&created.id).await.unwrap(), RunNow::Started);

        // the tick runs in the background; wait for its history row
        let mut runs = Vec::new();
        for _ in 0..100 {
            runs = db.scrape_configs().recent_runs(Some(&created.id), 10).await.unwrap();
            if !runs.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, "success");
        let stored = db.scrape_configs().get(&created.id).await.unwrap().unwrap();
        assert!(stored.last_run.is_some());
    }
}
