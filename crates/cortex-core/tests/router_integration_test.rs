//! Integration tests for the escalation router.
//!
//! Covers:
//! - Simple and complex routing through the standard ladder
//! - Escalation loops and unregistered targets
//! - Failure logging and cost tracking
//! - Model overrides and meta profiles

mod common;

use std::sync::Arc;

use common::{FailingBuilder, STANDARD_PROFILES, complex_request, router_with, standard_router};
use cortex_abstraction::ModelRequest;
use cortex_core::CortexError;
use cortex_models::Provider;

#[tokio::test]
async fn test_simple_request_handled_by_entry() {
    let (_root, router) = standard_router();
    let routed = router
        .process_request(&ModelRequest::from_user_text("list files in current directory"))
        .await
        .unwrap();

    assert_eq!(routed.expert.as_deref(), Some("FirstAttendant"));
    assert!((routed.confidence - 0.85).abs() < f64::EPSILON);
    assert!(!routed.escalated());
    assert_eq!(routed.response.model, "mock-nano");
}

#[tokio::test]
async fn test_complex_request_escalates_to_top() {
    let (_root, router) = standard_router();
    let routed = router.process_request(&complex_request()).await.unwrap();

    assert_eq!(routed.expert.as_deref(), Some("Elite"));
    assert_eq!(routed.escalation_path, vec!["FirstAttendant", "SecondThought", "Elite"]);
    assert_eq!(routed.escalated_to(), Some("Elite"));

    let logs = router.tracker().recent_logs(None);
    let escalations: Vec<_> = logs.iter().filter(|l| l.escalated).collect();
    assert_eq!(escalations.len(), 2);
    assert!(escalations.iter().all(|l| l.success && l.total_tokens() == 0));
}

#[test]
fn test_escalation_cycle_is_detected() {
    let profiles = [
        ("a.yaml", "name: Alpha\nmodel: mock-a\ntier: 1\nescalate_to: Beta\n"),
        ("b.yaml", "name: Beta\nmodel: mock-b\ntier: 2\npolicy: entry\nescalate_to: Alpha\n"),
        ("c.yaml", "name: Gamma\nmodel: mock-c\ntier: 3\n"),
    ];
    let (_root, router) = router_with(&profiles, |_| {});

    let err = router.choose_expert(&ModelRequest::default()).unwrap_err();
    match err {
        CortexError::EscalationLoopDetected { path } => {
            assert_eq!(path, vec!["Alpha", "Beta", "Alpha"]);
        }
        other => panic!("expected a loop, got {other:?}"),
    }

    let hops = router.tracker().recent_logs(None);
    assert_eq!(hops.len(), 2);
    assert_eq!(hops[0].escalated_to.as_deref(), Some("Beta"));
    assert_eq!(hops[1].escalated_to.as_deref(), Some("Alpha"));
}

#[tokio::test]
async fn test_unregistered_target_is_not_found() {
    let profiles = [
        ("a.yaml", "name: Alpha\nmodel: mock-a\ntier: 1\nescalate_to: Ghost\n"),
        ("b.yaml", "name: Beta\nmodel: mock-b\ntier: 2\n"),
    ];
    let (_root, router) = router_with(&profiles, |_| {});

    let err = router.process_request(&ModelRequest::default()).await.unwrap_err();
    assert!(matches!(err, CortexError::ExpertNotFound(ref name) if name == "Ghost"));
}

#[tokio::test]
async fn test_failed_execution_is_logged_before_error() {
    let (_root, router) = router_with(STANDARD_PROFILES, |config| {
        config.dry_run = false;
        config.api_keys.openai = Some("test-key".to_string());
    });
    router.models().register_builder(Provider::Mock, Arc::new(FailingBuilder));

    let err = router.process_request(&ModelRequest::from_user_text("hello")).await.unwrap_err();
    match &err {
        CortexError::Execution { expert, source } => {
            assert_eq!(expert, "FirstAttendant");
            assert!(source.to_string().contains("rejected"));
        }
        other => panic!("expected an execution error, got {other:?}"),
    }

    assert_eq!(router.tracker().pending(), 0);
    let logs = router.tracker().load_today().unwrap();
    assert_eq!(logs.len(), 1);
    assert!(!logs[0].success);
    assert!(logs[0].error_message.as_deref().unwrap().contains("rejected"));
}

#[tokio::test]
async fn test_cost_tracking_toggle() {
    let (_root, router) = router_with(STANDARD_PROFILES, |config| {
        config.models.insert("FIRST_ATTENDANT".to_string(), "gpt-5-nano".to_string());
    });
    let routed = router.process_request(&ModelRequest::from_user_text("hello there")).await.unwrap();
    assert_eq!(routed.response.model, "gpt-5-nano");
    assert!(routed.response.usage.cost_usd > 0.0);

    let (_root, router) = router_with(STANDARD_PROFILES, |config| config.track_costs = false);
    let routed = router.process_request(&ModelRequest::from_user_text("hello there")).await.unwrap();
    assert!(routed.response.usage.cost_usd.abs() < f64::EPSILON);
}

#[test]
fn test_meta_profiles_stay_out_of_listing() {
    let mut profiles = STANDARD_PROFILES.to_vec();
    profiles.push(("recruiter.yaml", "name: ExpertRecruiter\nmodel: mock-nano\ntype: meta\n"));
    let (_root, router) = router_with(&profiles, |_| {});

    let names: Vec<String> = router.experts().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["FirstAttendant", "SecondThought", "Elite"]);
    assert_eq!(router.registry().meta_profiles().len(), 1);
}

#[tokio::test]
async fn test_shutdown_flushes_buffer() {
    let (_root, router) = standard_router();
    router.process_request(&ModelRequest::from_user_text("one")).await.unwrap();
    router.process_request(&complex_request()).await.unwrap();

    assert_eq!(router.shutdown().unwrap(), 4);
    assert_eq!(router.tracker().pending(), 0);

    let stats = router.statistics().unwrap();
    assert_eq!(stats.total_records, 4);
    assert_eq!(stats.executions, 2);
    assert_eq!(stats.escalations, 2);
    assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
}
