//! Policy retrieval point integration tests
//!
//! Consistency state machine, live update feeds and snapshot isolation of
//! concurrent readers.

use authz_engine::ast::build::*;
use authz_engine::ast::{Document, ParsedDocument, Policy};
use authz_engine::functions::FunctionRegistry;
use authz_engine::prp::{update_channel, StaticDocumentSource};
use authz_engine::{
    AuthorizationSubscription, IndexKind, PolicyRetrievalPoint, PolicyRetrievalResult, PrpConfig,
    PrpState, PrpUpdateEvent, RetrievalPoint, Update, Val, Variables,
};
use serde_json::json;
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("authz_engine=debug")
        .with_test_writer()
        .try_init();
}

fn subscription(role: &str) -> AuthorizationSubscription {
    AuthorizationSubscription::new(json!({"role": role}), json!("read"), json!("file"))
}

fn role_policy(name: &str, role: &str) -> ParsedDocument {
    Document::policy(
        Policy::permit(name).with_target(eq(key(var("subject"), "role"), val(json!(role)))),
    )
    .into()
}

fn open_policy(name: &str) -> ParsedDocument {
    Document::policy(Policy::permit(name)).into()
}

async fn retrieve(prp: &RetrievalPoint, role: &str) -> PolicyRetrievalResult {
    prp.retrieve_policies(
        &subscription(role),
        Arc::new(FunctionRegistry::with_standard_library()),
        &Variables::new(),
    )
    .await
}

// ============================================================================
// CONSISTENCY
// ============================================================================

#[tokio::test]
async fn test_policy_without_target_matches_everything() {
    let prp = RetrievalPoint::new(PrpConfig::default());
    prp.publish(open_policy("open")).await;

    for role in ["admin", "guest", ""] {
        let result = retrieve(&prp, role).await;
        assert!(result.is_valid);
        assert_eq!(result.names(), vec!["open"]);
    }
}

#[tokio::test]
async fn test_unrelated_updates_do_not_restore_validity() {
    init_tracing();
    let prp = RetrievalPoint::new(PrpConfig::default());
    prp.publish(role_policy("admins", "admin")).await;
    prp.publish(ParsedDocument::invalid("broken", "unexpected token")).await;

    prp.publish(role_policy("guests", "guest")).await;
    prp.unpublish("admins").await;
    prp.unpublish("never-published").await;

    assert_eq!(prp.state(), PrpState::Inconsistent);
    let result = retrieve(&prp, "guest").await;
    assert!(!result.is_valid);
    assert!(result.matches.is_empty());
    assert_eq!(
        prp.invalid_documents().get("broken").map(String::as_str),
        Some("unexpected token")
    );
}

#[tokio::test]
async fn test_correcting_invalid_document_restores_validity() {
    let prp = RetrievalPoint::new(PrpConfig::default());
    prp.publish(ParsedDocument::invalid("admins", "unexpected token")).await;
    assert!(!retrieve(&prp, "admin").await.is_valid);

    assert_eq!(
        prp.publish(role_policy("admins", "admin")).await,
        PrpState::Consistent
    );
    let result = retrieve(&prp, "admin").await;
    assert!(result.is_valid);
    assert_eq!(result.names(), vec!["admins"]);
}

#[tokio::test]
async fn test_invalid_version_replaces_valid_document() {
    let prp = RetrievalPoint::new(PrpConfig::default());
    prp.publish(role_policy("admins", "admin")).await;
    prp.publish(ParsedDocument::invalid("admins", "truncated")).await;

    assert!(prp.all_documents().is_empty());
    assert_eq!(prp.unpublish("admins").await, PrpState::Empty);
}

#[tokio::test]
async fn test_invalid_policy_in_set_is_rejected() {
    let prp = RetrievalPoint::new(PrpConfig::default());
    let set = authz_engine::ast::PolicySet::new("set", "first-applicable").with_policy(
        Policy::permit("inner").with_target(environment_attribute("time.now", vec![])),
    );
    assert_eq!(
        prp.publish(Document::set(set).into()).await,
        PrpState::Inconsistent
    );
    assert!(prp.invalid_documents().contains_key("set"));
}

// ============================================================================
// BATCHES AND LIVE UPDATES
// ============================================================================

#[tokio::test]
async fn test_batch_is_applied_as_one_update() {
    let prp = RetrievalPoint::new(PrpConfig::default());
    let event = PrpUpdateEvent::publish(role_policy("admins", "admin"))
        .with(Update::Publish(role_policy("also admins", "admin")))
        .with(Update::Unpublish("admins".to_string()));

    assert_eq!(prp.apply(event).await, PrpState::Consistent);
    assert_eq!(retrieve(&prp, "admin").await.names(), vec!["also admins"]);
}

#[tokio::test]
async fn test_live_update_feed() {
    let prp = Arc::new(RetrievalPoint::new(PrpConfig::default()));
    let (sender, updates) = update_channel(8);
    let handle = prp.clone().spawn_updates(updates);

    sender.publish(role_policy("admins", "admin")).await.unwrap();
    sender.publish(role_policy("guests", "guest")).await.unwrap();
    sender.unpublish("guests").await.unwrap();
    sender.mark_inconsistent().await.unwrap();
    drop(sender);
    handle.await.unwrap();

    assert_eq!(prp.state(), PrpState::Inconsistent);
    assert_eq!(prp.all_documents().len(), 1);

    prp.reset().await;
    assert_eq!(prp.state(), PrpState::Empty);
}

#[tokio::test]
async fn test_closed_feed_reports_error() {
    let (sender, updates) = update_channel(1);
    drop(updates);
    assert!(sender.unpublish("admins").await.is_err());
}

#[tokio::test]
async fn test_follow_static_source() {
    let prp = Arc::new(RetrievalPoint::new(PrpConfig::default()));
    let source = StaticDocumentSource::new(vec![
        role_policy("admins", "admin"),
        open_policy("open"),
    ]);
    prp.clone().follow(&source).await.unwrap();

    assert_eq!(prp.state(), PrpState::Consistent);
    assert_eq!(retrieve(&prp, "admin").await.names(), vec!["admins", "open"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_half_applied_batches() {
    let prp = Arc::new(RetrievalPoint::new(PrpConfig::default()));
    let generations = 50;

    let writer = {
        let prp = prp.clone();
        tokio::spawn(async move {
            for generation in 0..generations {
                let mut event = PrpUpdateEvent::default();
                if generation > 0 {
                    for side in ["left", "right"] {
                        event = event.with(Update::Unpublish(format!("{}-{side}", generation - 1)));
                    }
                }
                for side in ["left", "right"] {
                    event = event.with(Update::Publish(open_policy(&format!("{generation}-{side}"))));
                }
                prp.apply(event).await;
                tokio::task::yield_now().await;
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let prp = prp.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let result = retrieve(&prp, "anyone").await;
                    let names = result.names();
                    assert!(names.is_empty() || names.len() == 2, "{names:?}");
                    if let [left, right] = names.as_slice() {
                        let generation = |name: &str| name.split('-').next().map(str::to_string);
                        assert_eq!(generation(left), generation(right));
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(prp.all_documents().len(), 2);
}

// ============================================================================
// REQUEST CONTEXT
// ============================================================================

#[tokio::test]
async fn test_variables_are_visible_to_targets() {
    let prp = RetrievalPoint::new(PrpConfig::default());
    let tenant_policy = Document::policy(
        Policy::permit("acme only").with_target(eq(var("tenant"), val(json!("acme")))),
    );
    prp.publish(tenant_policy.into()).await;

    let mut variables = Variables::new();
    variables.insert("tenant".to_string(), Val::of(json!("acme")));
    // subscription variables cannot be overridden
    variables.insert("subject".to_string(), Val::of(json!({"role": "admin"})));

    let result = prp
        .retrieve_policies(
            &subscription("guest"),
            Arc::new(FunctionRegistry::new()),
            &variables,
        )
        .await;
    assert_eq!(result.names(), vec!["acme only"]);

    // without the variable the target is an error
    let result = retrieve(&prp, "guest").await;
    assert!(!result.is_valid);
}

#[tokio::test]
async fn test_subscription_variables_win() {
    let prp = RetrievalPoint::new(PrpConfig::default());
    prp.publish(role_policy("admins", "admin")).await;

    let mut variables = Variables::new();
    variables.insert("subject".to_string(), Val::of(json!({"role": "admin"})));
    let result = prp
        .retrieve_policies(
            &subscription("guest"),
            Arc::new(FunctionRegistry::new()),
            &variables,
        )
        .await;
    assert!(result.is_valid);
    assert!(result.matches.is_empty());
}

#[tokio::test]
async fn test_naive_index_configuration() {
    let config = PrpConfig {
        index: IndexKind::Naive,
        ..PrpConfig::default()
    };
    let prp = RetrievalPoint::with_config(config).unwrap();
    prp.publish(role_policy("admins", "admin")).await;
    prp.publish(role_policy("guests", "guest")).await;

    assert_eq!(retrieve(&prp, "guest").await.names(), vec!["guests"]);
}

#[tokio::test]
async fn test_zero_clause_limit_is_rejected() {
    let config = PrpConfig {
        max_clauses_per_target: 0,
        ..PrpConfig::default()
    };
    assert!(RetrievalPoint::with_config(config).is_err());
}

// ============================================================================
// METRICS
// ============================================================================

#[tokio::test]
async fn test_metrics_export() {
    let prp = RetrievalPoint::new(PrpConfig::default());
    prp.publish(role_policy("admins", "admin")).await;
    prp.publish(ParsedDocument::invalid("broken", "oops")).await;
    retrieve(&prp, "admin").await;

    let metrics = prp.metrics().unwrap();
    let snapshot = metrics.get_metrics().await;
    assert_eq!(snapshot.retrievals, 1);
    assert_eq!(snapshot.invalid_results, 1);
    assert_eq!(snapshot.publishes, 2);

    let exported = metrics.export_prometheus().await;
    assert!(exported.contains("authz_prp_retrievals_total 1"));
    assert!(exported.contains("authz_prp_invalid_results_total 1"));
}

#[tokio::test]
async fn test_metrics_can_be_disabled() {
    let config = PrpConfig {
        enable_metrics: false,
        ..PrpConfig::default()
    };
    let prp = RetrievalPoint::new(config);
    assert!(prp.metrics().is_none());
}
