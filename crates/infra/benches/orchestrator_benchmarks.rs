use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use sprout_ai::{AnalyzerChain, AnalyzerStrategy, RuleBasedAnalyzer};
use sprout_core::{AnalysisStatus, BehaviorCategory, ChildId, Observation, RecordId};
use sprout_infra::{
    AnalysisConfig, AnalysisJob, AnalysisOrchestrator, InMemoryJobStore, InMemoryMetricsStore,
    MetricsAggregator, MetricsDelta,
};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn observation() -> Observation {
    Observation::new("走了5步，扶着沙发", BehaviorCategory::Motor, 14)
        .unwrap()
        .with_context("living room after nap")
}

fn rules_only_orchestrator() -> (
    AnalysisOrchestrator<InMemoryJobStore, InMemoryMetricsStore>,
    Arc<InMemoryJobStore>,
) {
    let jobs = InMemoryJobStore::arc();
    let rules: Arc<dyn AnalyzerStrategy> = Arc::new(RuleBasedAnalyzer::new());
    let orchestrator = AnalysisOrchestrator::new(
        Arc::clone(&jobs),
        AnalyzerChain::new(vec![rules]),
        Arc::new(InMemoryMetricsStore::new()),
        AnalysisConfig::default().with_metrics_invariant_check(false),
    );
    (orchestrator, jobs)
}

fn bench_rule_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_evaluation");
    let analyzer = RuleBasedAnalyzer::new();

    group.bench_function("matching_rule", |b| {
        let obs = observation();
        b.iter(|| black_box(analyzer.evaluate(black_box(&obs))));
    });

    group.bench_function("no_match", |b| {
        let obs = Observation::new("looked at the ceiling fan", BehaviorCategory::Other, 40).unwrap();
        b.iter(|| black_box(analyzer.evaluate(black_box(&obs))));
    });

    group.finish();
}

fn bench_run_analysis(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("run_analysis");

    group.bench_function("fresh_pending_job", |b| {
        let (orchestrator, jobs) = rules_only_orchestrator();
        b.iter(|| {
            let job = AnalysisJob::pending(RecordId::new(), ChildId::new(), observation());
            let id = jobs.insert(job).expect("insert");
            black_box(rt.block_on(orchestrator.run_analysis(id)))
        });
    });

    group.bench_function("cached_done_job", |b| {
        let (orchestrator, jobs) = rules_only_orchestrator();
        let id = jobs
            .insert(AnalysisJob::pending(RecordId::new(), ChildId::new(), observation()))
            .expect("insert");
        rt.block_on(orchestrator.run_analysis(id));
        assert_eq!(
            rt.block_on(sprout_infra::JobStore::get(jobs.as_ref(), id))
                .expect("get")
                .map(|j| j.status),
            Some(AnalysisStatus::Done)
        );
        b.iter(|| black_box(rt.block_on(orchestrator.run_analysis(id))));
    });

    group.finish();
}

fn bench_metrics_apply(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("metrics_apply");

    for writers in [1usize, 8, 64].iter() {
        group.throughput(Throughput::Elements(*writers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(writers), writers, |b, &writers| {
            b.iter(|| {
                let aggregator = MetricsAggregator::new(Arc::new(InMemoryMetricsStore::new()));
                rt.block_on(async {
                    let tasks: Vec<_> = (0..writers)
                        .map(|_| {
                            let aggregator = aggregator.clone();
                            tokio::spawn(async move { aggregator.apply(&MetricsDelta::skip()).await })
                        })
                        .collect();
                    for task in tasks {
                        let _ = task.await;
                    }
                });
                black_box(aggregator)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_rule_evaluation,
    bench_run_analysis,
    bench_metrics_apply
);
criterion_main!(benches);
