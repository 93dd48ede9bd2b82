use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use diagnostic_engine::{
    AnswerEvidence, AssessmentConfig, AssessmentEngine, ConceptGraph, ConceptId, DiagnosticEngine,
    EngineConfig, MasteryConfig, MasteryModel, MasteryScores, MisconceptionCatalog,
    PrescriptionPlanner, SelectionStrategy, StaticResourceCurator,
};

fn evidence(graph: &ConceptGraph, answers: &[(&str, usize)]) -> Vec<AnswerEvidence> {
    answers
        .iter()
        .map(|&(id, chosen)| {
            let q = graph.question(id).unwrap();
            AnswerEvidence {
                question: q.id.clone(),
                concept: q.concept.clone(),
                chosen,
                correct: q.correct,
            }
        })
        .collect()
}

fn bench_select_next(c: &mut Criterion) {
    let graph = ConceptGraph::linear_algebra().unwrap();
    let mastery = MasteryModel::new(MasteryConfig::default());

    let mut group = c.benchmark_group("select_next");
    group.throughput(Throughput::Elements(1));
    for strategy in [
        SelectionStrategy::MaximumInformation,
        SelectionStrategy::Progressive,
        SelectionStrategy::Random,
    ] {
        let mut engine = AssessmentEngine::with_seed(AssessmentConfig::default(), 42);
        group.bench_function(strategy.to_string(), |b| {
            b.iter(|| {
                let q = engine
                    .select_next(&graph, &mastery, "eigenvalues", strategy)
                    .unwrap();
                black_box(q);
            });
        });
    }
    group.finish();
}

fn bench_record_response(c: &mut Criterion) {
    let concepts: Vec<ConceptId> = ["vectors", "matrix_ops", "determinants"]
        .into_iter()
        .map(ConceptId::new_unchecked)
        .collect();

    let mut group = c.benchmark_group("mastery");
    group.throughput(Throughput::Elements(1));
    group.bench_function("record_response", |b| {
        let mut model = MasteryModel::new(MasteryConfig::default());
        let mut i = 0usize;
        b.iter(|| {
            let concept = &concepts[i % concepts.len()];
            black_box(model.record_response(concept, 0.0, i % 3 != 0));
            i += 1;
        });
    });
    group.finish();
}

fn bench_prescription(c: &mut Criterion) {
    let graph = ConceptGraph::linear_algebra().unwrap();
    let catalog = MisconceptionCatalog::builtin().unwrap();
    let curator = StaticResourceCurator::builtin().unwrap();
    let answers = evidence(&graph, &[("eig_1", 0), ("eig_5", 0), ("eig_2", 0), ("eig_3", 0)]);
    let mastery: MasteryScores = [
        ("vectors", 0.9),
        ("matrix_ops", 0.8),
        ("determinants", 0.45),
        ("inverse_matrix", 0.7),
    ]
    .into_iter()
    .map(|(id, m)| (ConceptId::new_unchecked(id), m))
    .collect();

    c.bench_function("prescription/generate", |b| {
        let planner = PrescriptionPlanner::new(&graph, &catalog, &curator);
        b.iter(|| black_box(planner.generate("eigenvalues", &answers, &mastery).unwrap()));
    });
}

fn bench_engine_round_trip(c: &mut Criterion) {
    c.bench_function("engine/next_question_after_10_answers", |b| {
        // Fresh session per sample; setup is excluded from timing.
        b.iter_custom(|iters| {
            let engine = DiagnosticEngine::builtin(EngineConfig::default()).unwrap();
            let session = engine.create_session().unwrap();
            for concept in ["vectors", "matrix_ops"] {
                for _ in 0..5 {
                    let q = engine
                        .next_question(session, concept, SelectionStrategy::Progressive)
                        .unwrap();
                    engine.submit_answer(session, q.id.as_str(), q.correct, None).unwrap();
                }
            }

            let start = Instant::now();
            for _ in 0..iters {
                black_box(
                    engine
                        .next_question(session, "determinants", SelectionStrategy::MaximumInformation)
                        .unwrap(),
                );
            }
            start.elapsed()
        });
    });
}

criterion_group!(
    engine,
    bench_select_next,
    bench_record_response,
    bench_prescription,
    bench_engine_round_trip
);
criterion_main!(engine);
