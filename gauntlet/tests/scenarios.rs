//! End-to-end engine scenarios: candidates answer, the judge grades, results
//! and events land where the control flow says they must.

mod common;

use common::{collect_events, event_type, harness, wait_for_run_status};
use gauntlet::run_event::{RunEvent, TokenKind, Verdict};
use gauntlet::{ProblemKind, ResultStatus, ReviewDecision, RunStatus};

const PASS_JSON: &str = r#"{"verdict":"PASS","reasoning":"correct","score":100}"#;
const FAIL_JSON: &str = r#"{"verdict":"FAIL","reasoning":"wrong","score":0}"#;

#[tokio::test]
async fn two_models_one_text_problem_judged() {
    let h = harness();
    let provider = h.seed_provider();
    let a = h.seed_model(&provider.id, "cand-a");
    let b = h.seed_model(&provider.id, "cand-b");
    let judge = h.seed_model(&provider.id, "judge-1");
    let set = h.seed_problem_set("arithmetic");
    h.seed_problem(&set.id, ProblemKind::Text, "2+2?", Some("4"), 100);

    h.mock.reply("cand-a", "4");
    h.mock.reply("cand-b", "five");
    h.mock.reply_when("judge-1", "five", FAIL_JSON);
    h.mock.reply("judge-1", PASS_JSON);

    let run = h.create_run(&set.id, vec![a.id.clone(), b.id.clone()], &judge.id, false);
    let executed = h.engine.execute(&run.id).await.unwrap();
    assert_eq!(executed.status, RunStatus::Running);

    wait_for_run_status(&h.store, &run.id, RunStatus::Completed).await;

    let results = h.store.results_for_run(&run.id).unwrap();
    assert_eq!(results.len(), 2);
    let score_of = |model_id: &str| {
        results
            .iter()
            .find(|r| r.result.model_id == model_id)
            .unwrap()
    };
    let ra = score_of(&a.id);
    assert_eq!(ra.result.status, ResultStatus::Completed);
    assert_eq!(ra.result.score, Some(100));
    assert_eq!(ra.result.output.as_deref(), Some("4"));
    assert_eq!(ra.result.judged_by.as_deref(), Some(judge.id.as_str()));
    assert_eq!(ra.result.judge_reasoning.as_deref(), Some("correct"));
    assert_eq!(ra.result.passed(), Some(true));

    let rb = score_of(&b.id);
    assert_eq!(rb.result.status, ResultStatus::Completed);
    assert_eq!(rb.result.score, Some(0));
    assert_eq!(rb.result.passed(), Some(false));

    // registry entries are cleaned up on terminal transition
    assert!(h.registry.run_token(&run.id).is_none());
}

#[tokio::test]
async fn html_problem_streams_and_waits_for_manual_review() {
    let h = harness();
    let provider = h.seed_provider();
    let model = h.seed_model(&provider.id, "cand-a");
    let judge = h.seed_model(&provider.id, "judge-1");
    let set = h.seed_problem_set("widgets");
    let html = "<button style=\"color:red\">Hi</button>";
    h.seed_problem(&set.id, ProblemKind::Html, "write a red button", None, 100);

    h.mock.reply("cand-a", html);

    let run = h.create_run(&set.id, vec![model.id.clone()], &judge.id, true);
    let rx = h.bus.subscribe(&run.id, "queued");
    h.engine.execute(&run.id).await.unwrap();
    wait_for_run_status(&h.store, &run.id, RunStatus::Completed).await;

    let events = collect_events(rx).await;
    let types: Vec<&str> = events.iter().map(event_type).collect();
    assert!(types.contains(&"model_started"));
    assert!(types.contains(&"model_streaming_started"));
    assert!(types.contains(&"html_candidate_done"));
    assert!(!types.contains(&"judge_done"), "{types:?}");
    let tokens: String = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::CandidateToken { delta, kind, .. } => {
                assert_eq!(*kind, TokenKind::Html);
                Some(delta.clone())
            }
            _ => None,
        })
        .collect();
    assert_eq!(tokens, html);
    match events
        .iter()
        .find(|e| matches!(e, RunEvent::HtmlCandidateDone { .. }))
        .unwrap()
    {
        RunEvent::HtmlCandidateDone { html: done, .. } => assert_eq!(done, html),
        _ => unreachable!(),
    }

    // the judge never ran and the row awaits a human
    assert_eq!(h.mock.attempts_for("judge-1"), 0);
    let results = h.store.results_for_run(&run.id).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result.status, ResultStatus::Manual);
    assert_eq!(results[0].result.output.as_deref(), Some(html));
    assert_eq!(results[0].problem_kind, ProblemKind::Html);
    assert!(results[0].result.score.is_none());

    // manual review settles it
    let reviewed = h
        .engine
        .review_result(&results[0].result.id, ReviewDecision::Pass, Some("looks red".into()))
        .unwrap();
    assert_eq!(reviewed.status, ResultStatus::Completed);
    assert_eq!(reviewed.score, Some(100));
    assert_eq!(reviewed.judged_by.as_deref(), Some("human"));
    assert_eq!(reviewed.judge_reasoning.as_deref(), Some("looks red"));

    // a second review is rejected
    assert!(h
        .engine
        .review_result(&results[0].result.id, ReviewDecision::Fail, None)
        .is_err());
}

#[tokio::test]
async fn malformed_judge_response_falls_back_to_textual_verdict() {
    let h = harness();
    let provider = h.seed_provider();
    let model = h.seed_model(&provider.id, "cand-a");
    let judge = h.seed_model(&provider.id, "judge-1");
    let set = h.seed_problem_set("fallback");
    h.seed_problem(&set.id, ProblemKind::Text, "2+2?", Some("4"), 100);

    h.mock.reply("cand-a", "4");
    h.mock.reply("judge-1", "PASS — looks fine");

    let run = h.create_run(&set.id, vec![model.id.clone()], &judge.id, false);
    h.engine.execute(&run.id).await.unwrap();
    wait_for_run_status(&h.store, &run.id, RunStatus::Completed).await;

    let results = h.store.results_for_run(&run.id).unwrap();
    assert_eq!(results[0].result.score, Some(100));
    assert_eq!(results[0].result.status, ResultStatus::Completed);
    let reasoning = results[0].result.judge_reasoning.as_deref().unwrap();
    assert!(reasoning.starts_with("Simple verdict: PASS"), "{reasoning}");
}

#[tokio::test]
async fn non_retriable_upstream_failure_errors_one_worker_only() {
    let h = harness();
    let provider = h.seed_provider();
    let a = h.seed_model(&provider.id, "broken");
    let b = h.seed_model(&provider.id, "healthy");
    let judge = h.seed_model(&provider.id, "judge-1");
    let set = h.seed_problem_set("resilience");
    h.seed_problem(&set.id, ProblemKind::Text, "2+2?", Some("4"), 100);

    h.mock.fail("broken", 401, "unauthorized");
    h.mock.reply("healthy", "4");
    h.mock.reply("judge-1", PASS_JSON);

    let run = h.create_run(&set.id, vec![a.id.clone(), b.id.clone()], &judge.id, false);
    let rx = h.bus.subscribe(&run.id, "queued");
    h.engine.execute(&run.id).await.unwrap();
    wait_for_run_status(&h.store, &run.id, RunStatus::Completed).await;

    // 401 is terminal on the first attempt
    assert_eq!(h.mock.attempts_for("broken"), 1);

    let results = h.store.results_for_run(&run.id).unwrap();
    let broken = results.iter().find(|r| r.result.model_id == a.id).unwrap();
    assert_eq!(broken.result.status, ResultStatus::Error);
    assert!(broken.result.score.is_none());
    let healthy = results.iter().find(|r| r.result.model_id == b.id).unwrap();
    assert_eq!(healthy.result.status, ResultStatus::Completed);
    assert_eq!(healthy.result.score, Some(100));

    let events = collect_events(rx).await;
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::ModelError { error, .. } if error.contains("401")
    )));
}

#[tokio::test]
async fn run_with_only_errored_workers_still_completes() {
    let h = harness();
    let provider = h.seed_provider();
    let model = h.seed_model(&provider.id, "broken");
    let judge = h.seed_model(&provider.id, "judge-1");
    let set = h.seed_problem_set("all-errors");
    h.seed_problem(&set.id, ProblemKind::Text, "2+2?", Some("4"), 100);

    h.mock.fail("broken", 404, "no such model");

    let run = h.create_run(&set.id, vec![model.id.clone()], &judge.id, false);
    h.engine.execute(&run.id).await.unwrap();
    wait_for_run_status(&h.store, &run.id, RunStatus::Completed).await;

    let results = h.store.results_for_run(&run.id).unwrap();
    assert_eq!(results[0].result.status, ResultStatus::Error);
}

#[tokio::test]
async fn per_model_event_order_holds_across_problems() {
    let h = harness();
    let provider = h.seed_provider();
    let model = h.seed_model(&provider.id, "cand-a");
    let judge = h.seed_model(&provider.id, "judge-1");
    let set = h.seed_problem_set("ordered");
    let p1 = h.seed_problem(&set.id, ProblemKind::Text, "first?", Some("1"), 100);
    let p2 = h.seed_problem(&set.id, ProblemKind::Text, "second?", Some("2"), 200);

    h.mock.reply("cand-a", "answer");
    h.mock.reply("judge-1", PASS_JSON);

    let run = h.create_run(&set.id, vec![model.id.clone()], &judge.id, true);
    let rx = h.bus.subscribe(&run.id, "queued");
    h.engine.execute(&run.id).await.unwrap();
    wait_for_run_status(&h.store, &run.id, RunStatus::Completed).await;
    let events = collect_events(rx).await;

    // run_status=running precedes the first worker event, terminal follows the last
    assert!(matches!(&events[0], RunEvent::RunStatus { status, .. } if status == "queued"));
    assert!(matches!(&events[1], RunEvent::RunStatus { status, .. } if status == "running"));
    assert!(matches!(
        events.last().unwrap(),
        RunEvent::RunStatus { status, .. } if status == "completed"
    ));

    // per problem: model_started .. candidate_done .. judge_done, p1 before p2
    let positions = |problem_id: &str, ty: &str| {
        events
            .iter()
            .position(|e| {
                event_type(e) == ty
                    && match e {
                        RunEvent::ModelStarted { problem_id: p, .. }
                        | RunEvent::CandidateDone { problem_id: p, .. }
                        | RunEvent::JudgeDone { problem_id: p, .. } => p == problem_id,
                        _ => false,
                    }
            })
            .unwrap_or_else(|| panic!("missing {ty} for {problem_id}"))
    };
    let s1 = positions(&p1.id, "model_started");
    let d1 = positions(&p1.id, "candidate_done");
    let j1 = positions(&p1.id, "judge_done");
    let s2 = positions(&p2.id, "model_started");
    let d2 = positions(&p2.id, "candidate_done");
    let j2 = positions(&p2.id, "judge_done");
    assert!(s1 < d1 && d1 < j1 && j1 < s2 && s2 < d2 && d2 < j2,
        "order violated: {s1} {d1} {j1} {s2} {d2} {j2}");

    // judge verdict reached the bus
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::JudgeDone { verdict: Verdict::Pass, score: 100, .. }
    )));
}

#[tokio::test]
async fn completed_runs_satisfy_completion_closure_and_score_domain() {
    let h = harness();
    let provider = h.seed_provider();
    let a = h.seed_model(&provider.id, "cand-a");
    let b = h.seed_model(&provider.id, "broken");
    let judge = h.seed_model(&provider.id, "judge-1");
    let set = h.seed_problem_set("closure");
    h.seed_problem(&set.id, ProblemKind::Text, "t1?", Some("x"), 100);
    h.seed_problem(&set.id, ProblemKind::Html, "h1?", None, 200);

    h.mock.reply("cand-a", "x");
    h.mock.fail("broken", 403, "forbidden");
    h.mock.reply("judge-1", PASS_JSON);

    let run = h.create_run(&set.id, vec![a.id.clone(), b.id.clone()], &judge.id, false);
    h.engine.execute(&run.id).await.unwrap();
    wait_for_run_status(&h.store, &run.id, RunStatus::Completed).await;

    for row in h.store.results_for_run(&run.id).unwrap() {
        let r = &row.result;
        assert!(
            matches!(
                r.status,
                ResultStatus::Completed
                    | ResultStatus::Manual
                    | ResultStatus::Cancelled
                    | ResultStatus::Error
            ),
            "non-terminal result {r:?} in completed run"
        );
        match r.status {
            ResultStatus::Completed => {
                let score = r.score.expect("completed result must have a score");
                assert!((0..=100).contains(&score));
            }
            _ => assert!(r.score.is_none(), "score on non-completed result {r:?}"),
        }
    }
}

#[tokio::test]
async fn execute_preconditions_are_caller_errors() {
    let h = harness();
    let provider = h.seed_provider();
    let model = h.seed_model(&provider.id, "cand-a");
    let judge = h.seed_model(&provider.id, "judge-1");
    let set = h.seed_problem_set("preconditions");
    h.seed_problem(&set.id, ProblemKind::Text, "2+2?", Some("4"), 100);

    // unknown run
    assert!(matches!(
        h.engine.execute("missing").await,
        Err(gauntlet::EngineError::RunNotFound(_))
    ));

    // empty candidate list rejected at creation
    assert!(matches!(
        h.engine.create_run(gauntlet::CreateRun {
            name: None,
            problem_set_id: set.id.clone(),
            model_ids: vec![],
            judge_model_id: judge.id.clone(),
            stream: false,
        }),
        Err(gauntlet::EngineError::NoCandidates)
    ));

    // unknown judge rejected at creation
    assert!(matches!(
        h.engine.create_run(gauntlet::CreateRun {
            name: None,
            problem_set_id: set.id.clone(),
            model_ids: vec![model.id.clone()],
            judge_model_id: "ghost".into(),
            stream: false,
        }),
        Err(gauntlet::EngineError::JudgeModelMissing(_))
    ));

    // unknown problem set rejected at creation
    assert!(matches!(
        h.engine.create_run(gauntlet::CreateRun {
            name: None,
            problem_set_id: "ghost".into(),
            model_ids: vec![model.id.clone()],
            judge_model_id: judge.id.clone(),
            stream: false,
        }),
        Err(gauntlet::EngineError::ProblemSetMissing(_))
    ));
}
