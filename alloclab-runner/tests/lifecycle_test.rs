//! Lifecycle, store and query integration tests.

use std::sync::Arc;

use chrono::NaiveDate;

use alloclab_core::data::{InMemoryPrices, InMemorySignals, PriceSource};
use alloclab_core::domain::{DailyBar, PriceLookup, Signal};
use alloclab_core::{CancellationToken, ErrorKind};
use alloclab_runner::{
    ArtifactStore, FsArtifactStore, MemoryArtifactStore, QueryError, RunManager, RunQueries,
    RunRequest, RunStatus, SeriesSource,
};

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i64::from(day) - 1)
}

/// Sixty sessions of two symbols with a dip in the middle.
fn universe() -> InMemoryPrices {
    let mut prices = InMemoryPrices::new();
    for day in 1..=60u32 {
        let t = f64::from(day);
        let a = 100.0 + t - if (20..35).contains(&day) { 15.0 } else { 0.0 };
        let b = 50.0 + (t * 0.3).sin() * 3.0;
        prices.insert("AAA", DailyBar::new(d(day), a - 0.5, a));
        prices.insert("BBB", DailyBar::new(d(day), b + 0.2, b));
    }
    prices
}

fn signals() -> InMemorySignals {
    let mut out = Vec::new();
    for (day, wa, wb) in [(1, 0.6, 0.3), (15, 0.3, 0.6), (30, 0.8, 0.1), (45, 0.0, 0.5)] {
        out.push(Signal { date: d(day), symbol: "AAA".into(), target_weight: wa });
        out.push(Signal { date: d(day), symbol: "BBB".into(), target_weight: wb });
    }
    InMemorySignals::new(out)
}

fn request() -> RunRequest {
    let mut req = RunRequest::new(Some("integration".into()), d(1), d(60), 50_000.0);
    req.cost_model = alloclab_core::engine::CostModel::bps(1.0, 2.0);
    req.run.risk_free_rate = 0.01;
    req
}

#[test]
fn completed_run_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsArtifactStore::new(dir.path()).unwrap());
    let manager = RunManager::new(store.clone());

    let run = manager
        .submit_and_execute(request(), &universe(), &signals())
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    let run_dir = store.run_dir(&run.run_id);
    for file in [
        "run.json",
        "request.json",
        "timeseries.json",
        "timeseries.csv",
        "timeseries.parquet",
        "trades.json",
        "trades.csv",
        "warnings.json",
        "summary.json",
    ] {
        assert!(run_dir.join(file).is_file(), "missing {file}");
    }
    assert_eq!(run.output_location, run_dir.display().to_string());

    let csv = std::fs::read_to_string(run_dir.join("timeseries.csv")).unwrap();
    assert!(csv.starts_with("date,portfolio_value,drawdown"));
    assert_eq!(csv.lines().count(), 61);

    // a fresh store over the same root sees the same run
    let reopened = FsArtifactStore::new(dir.path()).unwrap();
    assert_eq!(reopened.load_run(&run.run_id).unwrap(), run);
    assert_eq!(reopened.list_runs().unwrap().len(), 1);
}

#[test]
fn queries_over_completed_run() {
    let store: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
    let manager = RunManager::new(store.clone());
    let queries = RunQueries::new(store);

    let run = manager
        .submit_and_execute(request(), &universe(), &signals())
        .unwrap();
    let id = run.run_id.as_str();

    let summary = queries.summary(id).unwrap();
    let full = queries.timeseries(id, SeriesSource::Completed, 1_000).unwrap();
    assert!(!full.truncated);
    assert_eq!(full.total_points, 60);
    let deepest = full.points.iter().map(|p| -p.drawdown).fold(0.0_f64, f64::max);
    assert_eq!(summary.max_drawdown, deepest);
    assert!(summary.max_drawdown > 0.0);
    assert_eq!(summary.risk_free_rate, 0.01);
    assert_eq!(
        summary.final_equity,
        full.points.last().map(|p| p.portfolio_value).unwrap()
    );

    let small = queries.timeseries(id, SeriesSource::Completed, 10).unwrap();
    assert!(small.truncated);
    assert!(small.points.len() <= 10);
    assert_eq!(small.points.first(), full.points.first());
    assert_eq!(small.points.last(), full.points.last());

    let rolling = queries.rolling(id, 20, 1_000).unwrap();
    assert_eq!(rolling.total_points, 40);
    assert!(rolling.points.iter().all(|r| r.window_days == 20));
    assert!(queries.rolling(id, 60, 100).unwrap().points.is_empty());
    assert!(matches!(
        queries.rolling(id, 1, 100),
        Err(QueryError::InvalidArgument(_))
    ));

    let episodes = queries.drawdowns(id, None).unwrap();
    let top = queries.drawdowns(id, Some(1)).unwrap();
    assert!(!episodes.is_empty());
    assert_eq!(top.len(), 1);
    assert!(episodes.iter().all(|e| e.depth >= top[0].depth));

    let page = queries.trades(id, 3, 2).unwrap();
    assert_eq!(page.total, summary.trades);
    assert_eq!(page.items.len(), 3.min(page.total.saturating_sub(2)));
    assert_eq!(page.offset, 2);
    let past_end = queries.trades(id, 10, 10_000).unwrap();
    assert!(past_end.items.is_empty());
    assert!(queries.trades(id, 0, 0).is_err());
}

#[test]
fn queued_run_is_not_ready() {
    let store: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
    let manager = RunManager::new(store.clone());
    let queries = RunQueries::new(store);

    let id = manager.submit(request()).unwrap();
    let err = queries.summary(&id).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NotReady));
    assert!(matches!(
        queries.timeseries(&id, SeriesSource::Diagnostics, 100),
        Err(QueryError::NotReady { .. })
    ));
    assert!(matches!(queries.trades(&id, 10, 0), Err(QueryError::NotReady { .. })));
    assert_eq!(queries.status(&id).unwrap().status, RunStatus::Queued);
    assert!(matches!(queries.status("missing"), Err(QueryError::NotFound(_))));
}

/// Cancels the run's token once the given date's close is read.
struct CancelAt {
    inner: InMemoryPrices,
    token: CancellationToken,
    date: NaiveDate,
}

impl PriceSource for CancelAt {
    fn name(&self) -> &str {
        "cancel-at"
    }

    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        self.inner.trading_days(start, end)
    }

    fn bar(&self, symbol: &str, date: NaiveDate) -> PriceLookup {
        if date == self.date {
            self.token.cancel();
        }
        self.inner.bar(symbol, date)
    }
}

#[test]
fn cancelled_mid_run_keeps_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(dir.path()).unwrap());
    let manager = RunManager::new(store.clone());
    let queries = RunQueries::new(store.clone());

    let id = manager.submit(request()).unwrap();
    let prices = CancelAt {
        inner: universe(),
        token: manager.cancellation_token(&id).unwrap(),
        date: d(10),
    };
    let run = manager.execute(&id, &prices, &signals()).unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    let error = run.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Cancelled);

    let partial = queries.timeseries(&id, SeriesSource::Diagnostics, 100).unwrap();
    assert_eq!(partial.total_points, 10);
    assert_eq!(partial.points.last().map(|p| p.date), Some(d(10)));

    assert!(matches!(
        queries.timeseries(&id, SeriesSource::Completed, 100),
        Err(QueryError::RunFailed { kind: ErrorKind::Cancelled, .. })
    ));
    assert!(queries.summary(&id).is_err());
    assert!(!dir.path().join(&id).join("summary.json").exists());
}

#[test]
fn batch_runs_in_parallel() {
    let store: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
    let manager = RunManager::new(store.clone());
    let prices = universe();
    let signals = signals();

    let ids: Vec<_> = (0..6)
        .map(|i| {
            let mut req = request();
            req.run.initial_cash = 10_000.0 * f64::from(i + 1);
            manager.submit(req).unwrap()
        })
        .collect();
    let results = manager.execute_batch(&ids, &prices, &signals);

    assert_eq!(results.len(), 6);
    for (id, result) in ids.iter().zip(&results) {
        let run = result.as_ref().unwrap();
        assert_eq!(&run.run_id, id);
        assert_eq!(run.status, RunStatus::Completed);
    }
    assert_eq!(store.list_runs().unwrap().len(), 6);

    // a second batch over the same ids is rejected per run
    let again = manager.execute_batch(&ids[..1], &prices, &signals);
    assert!(again[0].is_err());
}

#[test]
fn data_gap_is_a_warning_not_a_failure() {
    let store: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
    let manager = RunManager::new(store.clone());

    // 2024-01-02 is a weekday with no session
    let mut prices = InMemoryPrices::new();
    for day in [1u32, 3, 4, 5] {
        prices.insert("AAA", DailyBar::new(d(day), 10.0, 10.0));
    }
    let signals = InMemorySignals::new(vec![Signal {
        date: d(1),
        symbol: "AAA".into(),
        target_weight: 0.5,
    }]);
    let req = RunRequest::new(None, d(1), d(5), 1_000.0);

    let run = manager.submit_and_execute(req, &prices, &signals).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(store.load_warnings(&run.run_id).unwrap().len(), 1);
}
