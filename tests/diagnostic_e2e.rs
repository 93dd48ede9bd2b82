use std::collections::HashSet;

use diagnostic_engine::{
    DiagnosticEngine, EngineConfig, RootCauseKind, SelectionStrategy, SessionId, StopReason,
    TreatmentPhaseKind,
};

fn engine() -> DiagnosticEngine {
    DiagnosticEngine::builtin(EngineConfig::default()).unwrap()
}

fn wrong_option(correct: usize) -> usize {
    usize::from(correct == 0)
}

/// Answers `count` progressive questions of `concept` correctly.
fn master(engine: &DiagnosticEngine, session: SessionId, concept: &str, count: usize) {
    for _ in 0..count {
        let question = engine
            .next_question(session, concept, SelectionStrategy::Progressive)
            .unwrap();
        let outcome = engine
            .submit_answer(session, question.id.as_str(), question.correct, Some(4_000))
            .unwrap();
        assert!(outcome.correct);
        assert!(outcome.diagnosis.is_none());
    }
}

#[test]
fn full_diagnostic_flow() {
    let engine = engine();
    let session = engine.create_session().unwrap();

    master(&engine, session, "vectors", 3);
    master(&engine, session, "matrix_ops", 3);
    let scores = engine.mastery(session).unwrap();
    assert!(scores.values().all(|&m| m >= 0.6), "{scores:?}");

    // Adaptive loop on determinants, every answer wrong.
    let mut answered = HashSet::new();
    let decision = loop {
        let decision = engine.should_stop(session, "determinants").unwrap();
        if decision.stop {
            break decision;
        }
        let question = engine
            .next_question(session, "determinants", SelectionStrategy::MaximumInformation)
            .unwrap();
        assert!(answered.insert(question.id.clone()), "{} asked twice", question.id);
        let outcome = engine
            .submit_answer(session, question.id.as_str(), wrong_option(question.correct), None)
            .unwrap();
        assert!(!outcome.correct);
        assert!(outcome.diagnosis.is_some());
    };
    assert_eq!(decision.reason, StopReason::ConsistentPerformance);
    assert_eq!(decision.responses, 5);
    assert!(engine.mastery(session).unwrap()["determinants"] < 0.6);

    // Remaining determinants questions form the checkpoint.
    let checkpoint = engine.checkpoint(session, "determinants").unwrap();
    assert_eq!(checkpoint.len(), 1);
    assert!(!answered.contains(&checkpoint[0].id));
    assert!(engine.evaluate_checkpoint(&[true, true, false]).passed);
    assert!(!engine.evaluate_checkpoint(&[true, false, false]).passed);

    // Eigenvalues failure traces to determinants.
    let prescription = engine.prescribe(session, "eigenvalues").unwrap();
    assert_eq!(prescription.failed_concept.as_str(), "eigenvalues");
    assert_eq!(prescription.target_concept.as_str(), "determinants");
    assert!(matches!(
        prescription.root_cause.kind,
        RootCauseKind::WeakPrerequisite { .. }
    ));
    assert_eq!(prescription.severity, 3);
    assert!(prescription.verification.must_show_work);
    assert!((0.5..=0.95).contains(&prescription.confidence));
    assert!(prescription.total_minutes >= 15);

    let kinds: Vec<TreatmentPhaseKind> = prescription.phases.iter().map(|p| p.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TreatmentPhaseKind::Understand,
            TreatmentPhaseKind::Practice,
            TreatmentPhaseKind::Verify
        ]
    );
    assert!(prescription.phases[0]
        .resources
        .iter()
        .all(|r| r.kind.phase() == TreatmentPhaseKind::Understand));

    let ids = &prescription.verification.question_ids;
    assert!(!ids.is_empty());
    assert!(ids.iter().all(|q| q.as_str().starts_with("det_")));
    // Unanswered questions come first.
    let seen: Vec<bool> = ids.iter().map(|q| answered.contains(q)).collect();
    assert!(seen.windows(2).all(|w| !w[0] || w[1]), "{seen:?}");

    let markdown = prescription.render_markdown();
    assert!(markdown.starts_with("# Learning Prescription"));
    assert!(markdown.contains("**Root cause:**"));
    assert!(markdown.contains("Determinants"));
    assert!(markdown.contains("## Verification"));

    // Dialogue context and progress views.
    let context = engine.tutor_context(session, "determinants").unwrap();
    assert_eq!(context.concept_name, "Determinants");
    assert_eq!(context.streak, 0);
    assert!(context.mastery < 0.6);

    let path: Vec<String> = engine
        .learning_path(session, "eigenvalues")
        .unwrap()
        .into_iter()
        .map(|c| c.to_string())
        .collect();
    assert_eq!(path, vec!["determinants", "inverse_matrix", "eigenvalues"]);

    let snapshot = engine.snapshot(session).unwrap();
    assert_eq!(snapshot.nodes.len(), 5);
    assert_eq!(snapshot.edges.len(), 6);
    assert_eq!(snapshot.nodes[0].id.as_str(), "vectors");

    assert!(engine.due_for_review(session).unwrap().is_empty());

    engine.end_session(session).unwrap();
    assert!(engine.mastery(session).unwrap_err().is_not_found());
}

#[test]
fn exhausted_bank_is_recoverable() {
    let engine = engine();
    let session = engine.create_session().unwrap();
    master(&engine, session, "vectors", 6);

    let err = engine
        .next_question(session, "vectors", SelectionStrategy::Random)
        .unwrap_err();
    assert!(err.is_recoverable());
    assert!(engine.checkpoint(session, "vectors").unwrap().is_empty());

    // Other concepts are unaffected.
    assert!(engine
        .next_question(session, "matrix_ops", SelectionStrategy::Random)
        .is_ok());
}

#[test]
fn sessions_are_isolated() {
    let engine = engine();
    let first = engine.create_session().unwrap();
    let second = engine.create_session().unwrap();

    let question = engine
        .next_question(first, "eigenvalues", SelectionStrategy::Progressive)
        .unwrap();
    engine
        .submit_answer(first, question.id.as_str(), wrong_option(question.correct), None)
        .unwrap();

    assert_eq!(engine.mastery(first).unwrap().len(), 1);
    assert!(engine.mastery(second).unwrap().is_empty());
    assert_eq!(
        engine.should_stop(second, "eigenvalues").unwrap().responses,
        0
    );

    engine.reset_session(first).unwrap();
    assert!(engine.mastery(first).unwrap().is_empty());
    assert_eq!(engine.store().session_ids().unwrap().len(), 2);
}

#[test]
fn invalid_requests_are_rejected() {
    let engine = engine();
    let session = engine.create_session().unwrap();

    assert!(engine
        .next_question(session, "topology", SelectionStrategy::Random)
        .unwrap_err()
        .is_not_found());
    assert!(engine
        .submit_answer(session, "nope_1", 0, None)
        .unwrap_err()
        .is_not_found());
    assert!(engine.submit_answer(session, "vec_1", 9, None).is_err());
    assert!(engine.prescribe(SessionId::new(), "eigenvalues").is_err());

    // Rejected answers leave no trace.
    assert!(engine.store().load(session).unwrap().answers.is_empty());
}
