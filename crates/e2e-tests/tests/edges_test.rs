//! Sharp-edge detection E2E tests against RocksDB-backed edges.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;

use e2e_tests::TestHarness;
use memory_edges::EdgeError;
use memory_storage::MemoryStore;
use memory_types::{
    ContextPredicate, DetectionPattern, EdgeStatus, PatternKind, Severity, SharpEdge,
};

fn context(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn edge_runtime_uuid() -> SharpEdge {
    SharpEdge::with_id(
        "edge-uuid",
        "crypto.randomUUID is missing on the edge runtime",
        "Use the uuid package",
    )
    .with_pattern(DetectionPattern::context(vec![ContextPredicate::equals("runtime", "edge")]))
    .with_pattern(DetectionPattern::code("crypto"))
}

#[test]
fn test_code_pattern_wins_over_context() {
    let harness = TestHarness::new();
    let now = Utc::now();
    harness.edges.register_edge(edge_runtime_uuid()).unwrap();

    let warnings = harness
        .edges
        .check_edges("crypto.randomUUID()", "", &context(&[("runtime", "edge")]), now)
        .unwrap();

    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].edge_id, "edge-uuid");
    assert_eq!(warnings[0].severity, Severity::High);
    assert_eq!(warnings[0].pattern_kind, PatternKind::Code);
    assert_eq!(warnings[0].pattern_index, 1);
    assert_eq!(warnings[0].workaround, "Use the uuid package");

    let stored = harness.storage.get_edge("edge-uuid").unwrap().unwrap();
    assert_eq!(stored.last_triggered_at, Some(now));
}

#[test]
fn test_context_only_match_is_medium() {
    let harness = TestHarness::new();
    let now = Utc::now();
    harness.edges.register_edge(edge_runtime_uuid()).unwrap();

    let warnings = harness
        .edges
        .check_edges("let id = nanoid();", "", &context(&[("runtime", "EDGE")]), now)
        .unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].severity, Severity::Medium);
    assert_eq!(warnings[0].pattern_index, 0);

    let none = harness
        .edges
        .check_edges("let id = nanoid();", "", &context(&[("runtime", "node")]), now)
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_warnings_ordered_by_severity_then_recency() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let edges = [
        SharpEdge::with_id("intent-a", "Migrations lock tables", "Run off-peak")
            .with_pattern(DetectionPattern::intent(["migration"])),
        SharpEdge::with_id("intent-b", "Migrations need a backup", "Snapshot first")
            .with_pattern(DetectionPattern::intent(["migration"]))
            .with_last_triggered_at(now - Duration::days(1)),
        SharpEdge::with_id("code-c", "DROP is irreversible", "Rename instead")
            .with_pattern(DetectionPattern::code(r"(?i)\bdrop\s+table\b")),
    ];
    for edge in edges {
        harness.edges.register_edge(edge).unwrap();
    }

    let warnings = harness
        .edges
        .check_edges("DROP TABLE users;", "write a migration", &HashMap::new(), now)
        .unwrap();

    let ids: Vec<&str> = warnings.iter().map(|w| w.edge_id.as_str()).collect();
    assert_eq!(ids, vec!["code-c", "intent-b", "intent-a"]);
}

#[test]
fn test_malformed_regex_flagged_not_fatal() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let broken = SharpEdge::with_id("broken", "Broken pattern", "Fix the regex")
        .with_pattern(DetectionPattern::code("(unclosed"))
        .with_pattern(DetectionPattern::intent(["deploy"]));

    let registered = harness.edges.register_edge(broken).unwrap();
    assert!(registered.needs_review);

    let warnings = harness
        .edges
        .check_edges("(unclosed", "deploy to prod", &HashMap::new(), now)
        .unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].pattern_kind, PatternKind::Intent);

    let review: Vec<String> = harness
        .edges
        .edges_needing_review()
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(review, vec!["broken".to_string()]);
}

#[test]
fn test_retired_edge_is_silent() {
    let harness = TestHarness::new();
    let now = Utc::now();
    harness.edges.register_edge(edge_runtime_uuid()).unwrap();

    let retired = harness.edges.retire_edge("edge-uuid").unwrap();
    assert_eq!(retired.status, EdgeStatus::Retired);

    let warnings = harness
        .edges
        .check_edges("crypto.randomUUID()", "", &HashMap::new(), now)
        .unwrap();
    assert!(warnings.is_empty());

    assert!(matches!(
        harness.edges.retire_edge("missing"),
        Err(EdgeError::NotFound(_))
    ));
}
