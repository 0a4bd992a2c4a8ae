use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use facility_planner::domain::{CandidateFacility, DataSetId, DemandPoint, Flow};
use facility_planner::optimizer::{
    FacilityLocationModel, GoodLpSolver, MilpSolver, OptimizationRun, OptimizerSettings,
    RunOutcome, SolveOptions, SolveOutcome,
};
use facility_planner::progress::{ChannelProgress, CollectingProgress};
use facility_planner::repo::{DataSetStore, MemoryStore};

/// Delegates to the real solver and counts invocations.
#[derive(Default)]
struct CountingSolver {
    calls: AtomicUsize,
}

#[async_trait]
impl MilpSolver for CountingSolver {
    async fn solve(
        &self,
        model: Arc<FacilityLocationModel>,
        options: SolveOptions,
    ) -> Result<SolveOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        GoodLpSolver.solve(model, options).await
    }
}

async fn seeded_store(ds: &DataSetId) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .add_facility(ds, CandidateFacility::new("F1", 0.0, 0.0, 100, 10.0))
        .await
        .unwrap();
    store
        .add_facility(ds, CandidateFacility::new("F2", 10.0, 10.0, 50, 5.0))
        .await
        .unwrap();
    store
        .add_demand_point(ds, DemandPoint::new("D1", 0.0, 0.1, 60))
        .await
        .unwrap();
    store
        .add_demand_point(ds, DemandPoint::new("D2", 0.1, 0.0, 40))
        .await
        .unwrap();
    store
}

fn runner(store: Arc<MemoryStore>, settings: OptimizerSettings) -> OptimizationRun {
    OptimizationRun::new(store, Arc::new(GoodLpSolver), settings)
}

fn assert_feasible(facilities: &[CandidateFacility], demand_points: &[DemandPoint], flows: &[Flow]) {
    let mut supplied: HashMap<&str, f64> = HashMap::new();
    let mut shipped: HashMap<&str, f64> = HashMap::new();
    for flow in flows {
        assert!(flow.volume > 0.0, "stored a zero flow: {flow:?}");
        *supplied.entry(flow.demand_name.as_str()).or_default() += flow.volume;
        *shipped.entry(flow.facility_name.as_str()).or_default() += flow.volume;
    }
    for d in demand_points {
        let got = supplied.get(d.name.as_str()).copied().unwrap_or(0.0);
        assert!(got + 1e-6 >= d.demand as f64, "{} under-supplied: {got}", d.name);
    }
    for f in facilities {
        let out = shipped.get(f.name.as_str()).copied().unwrap_or(0.0);
        assert!(out <= f.capacity as f64 + 1e-6, "{} over capacity: {out}", f.name);
    }
}

#[tokio::test]
async fn cheap_nearby_facility_serves_everything() {
    let ds = DataSetId::from("two-sites");
    let store = seeded_store(&ds).await;
    let progress = CollectingProgress::new();

    let outcome = runner(store.clone(), OptimizerSettings::default())
        .run(&ds, &progress, CancellationToken::new())
        .await
        .unwrap();

    let RunOutcome::Solved(report) = outcome else {
        panic!("expected a solved run, got {outcome:?}");
    };
    assert!(report.status.is_optimal());
    assert_eq!(report.open_facilities, vec!["F1"]);

    let flows = store.list_flows(&ds).await.unwrap();
    assert!(flows.iter().all(|f| f.facility_name == "F1"));
    assert_eq!(flows.len(), 2);
    assert_feasible(
        &store.list_facilities(&ds).await.unwrap(),
        &store.list_demand_points(&ds).await.unwrap(),
        &flows,
    );

    let messages = progress.messages();
    assert_eq!(messages.first().map(String::as_str), Some("Commencing optimisation"));
    assert_eq!(messages[1], "Status: Optimal");
    assert!(messages[2].starts_with("Total Cost = "));
    assert_eq!(messages.last().map(String::as_str), Some("Finished"));
}

#[tokio::test]
async fn rerun_replaces_rather_than_appends() {
    let ds = DataSetId::from("rerun");
    let store = seeded_store(&ds).await;
    let run = runner(store.clone(), OptimizerSettings::default());

    run.run(&ds, &CollectingProgress::new(), CancellationToken::new())
        .await
        .unwrap();
    let first = store.list_flows(&ds).await.unwrap();

    run.run(&ds, &CollectingProgress::new(), CancellationToken::new())
        .await
        .unwrap();
    let second = store.list_flows(&ds).await.unwrap();

    assert_eq!(first.len(), second.len());
    let total = |flows: &[Flow]| flows.iter().map(|f| f.volume).sum::<f64>();
    assert!((total(&first) - total(&second)).abs() < 1e-6);
}

#[tokio::test]
async fn only_nonzero_flows_are_stored() {
    let ds = DataSetId::from("sparse");
    let store = Arc::new(MemoryStore::new());
    for (i, lon) in [0.0, 20.0, 40.0].into_iter().enumerate() {
        store
            .add_facility(&ds, CandidateFacility::new(format!("F{i}"), 0.0, lon, 100, 1.0))
            .await
            .unwrap();
        store
            .add_demand_point(&ds, DemandPoint::new(format!("D{i}"), 0.0, lon + 0.05, 10))
            .await
            .unwrap();
    }

    let settings = OptimizerSettings {
        integer_flows: false,
        ..OptimizerSettings::default()
    };
    runner(store.clone(), settings)
        .run(&ds, &CollectingProgress::new(), CancellationToken::new())
        .await
        .unwrap();

    let flows = store.list_flows(&ds).await.unwrap();
    // Each demand point is served from its own neighbour: 3 of the 9 pairs.
    assert_eq!(flows.len(), 3);
    for flow in &flows {
        assert_eq!(&flow.facility_name[1..], &flow.demand_name[1..]);
        assert!((flow.volume - 10.0).abs() < 1e-6);
    }
}

#[tokio::test]
async fn infeasible_run_keeps_previous_solution() {
    let ds = DataSetId::from("infeasible");
    let store = seeded_store(&ds).await;
    let run = runner(store.clone(), OptimizerSettings::default());

    run.run(&ds, &CollectingProgress::new(), CancellationToken::new())
        .await
        .unwrap();
    let before = store.list_flows(&ds).await.unwrap();
    assert!(!before.is_empty());

    // Total demand now exceeds the combined capacity of 150.
    store
        .add_demand_point(&ds, DemandPoint::new("D3", 0.2, 0.2, 1_000))
        .await
        .unwrap();
    let progress = CollectingProgress::new();
    let outcome = run
        .run(&ds, &progress, CancellationToken::new())
        .await
        .unwrap();

    match outcome {
        RunOutcome::SolverFailure { status, .. } => assert!(!status.is_optimal()),
        other => panic!("expected a solver failure, got {other:?}"),
    }
    assert_eq!(store.list_flows(&ds).await.unwrap(), before);
    assert!(progress.messages().iter().any(|m| m.contains("left unchanged")));
    assert!(!progress.messages().iter().any(|m| m == "Finished"));
}

#[tokio::test]
async fn oversized_data_set_never_reaches_the_solver() {
    let ds = DataSetId::from("oversized");
    let store = seeded_store(&ds).await;
    store
        .replace_flows(&ds, vec![Flow::new("F2", "D1", 7.0)])
        .await
        .unwrap();
    let solver = Arc::new(CountingSolver::default());
    let settings = OptimizerSettings {
        max_demand_points: 1,
        ..OptimizerSettings::default()
    };
    let run = OptimizationRun::new(store.clone(), solver.clone(), settings);
    let progress = CollectingProgress::new();

    let outcome = run
        .run(&ds, &progress, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RunOutcome::CapacityLimitExceeded {
            demand_points: 2,
            limit: 1
        }
    );
    assert_eq!(solver.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        store.list_flows(&ds).await.unwrap(),
        vec![Flow::new("F2", "D1", 7.0)]
    );
    let messages = progress.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("1 demand points or fewer"));
}

#[tokio::test]
async fn empty_data_set_is_rejected_without_solving() {
    let ds = DataSetId::from("empty");
    let store = Arc::new(MemoryStore::new());
    let solver = Arc::new(CountingSolver::default());
    let run = OptimizationRun::new(store, solver.clone(), OptimizerSettings::default());

    let err = run
        .run(&ds, &CollectingProgress::new(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_user_facing());
    assert_eq!(solver.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn channel_progress_delivers_lines_in_order() {
    let ds = DataSetId::from("streamed");
    let store = seeded_store(&ds).await;
    let (sink, mut rx) = ChannelProgress::channel();

    runner(store, OptimizerSettings::default())
        .run(&ds, &sink, CancellationToken::new())
        .await
        .unwrap();
    drop(sink);

    let mut lines = Vec::new();
    while let Some(line) = rx.recv().await {
        lines.push(line);
    }
    assert_eq!(lines[0], "Commencing optimisation");
    assert_eq!(lines[1], "Status: Optimal");
    assert_eq!(lines.last().map(String::as_str), Some("Finished"));
}
