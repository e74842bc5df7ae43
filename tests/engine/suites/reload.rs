//! 规则热重载

use natal_shared::config::MatchingConfig;
use rule_engine::{InMemoryRuleRepository, RuleMatchService, VersionWatcher};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::data::{jiazi_male, static_rule};

#[tokio::test]
async fn test_enabling_rule_takes_effect_after_reload() {
    let repo = Arc::new(InMemoryRuleRepository::with_rules(vec![
        static_rule("BASE", 1, json!({})),
        static_rule("JIAZI", 5, json!({"day_pillar": "甲子"})).disabled(),
    ]));
    let service = RuleMatchService::new(repo.clone(), &MatchingConfig::default());
    service.reload_rules().await;

    let before = service.match_rules(jiazi_male(), None).await;
    assert!(!before.iter().any(|m| m.code == "JIAZI"));

    repo.upsert_rule(static_rule("JIAZI", 5, json!({"day_pillar": "甲子"})));

    // 未重载前仍使用旧快照
    let stale = service.match_rules(jiazi_male(), None).await;
    assert_eq!(stale, before);

    let outcome = service.reload_rules().await;
    assert!(outcome.reloaded);
    assert_eq!(outcome.count_before, 1);
    assert_eq!(outcome.count_after, 2);

    let after = service.match_rules(jiazi_male(), None).await;
    assert_eq!(after[0].code, "JIAZI");
}

#[tokio::test]
async fn test_store_outage_keeps_serving() {
    let repo = Arc::new(InMemoryRuleRepository::with_rules(vec![static_rule(
        "BASE",
        1,
        json!({}),
    )]));
    let service = RuleMatchService::new(repo.clone(), &MatchingConfig::default());
    service.reload_rules().await;
    let rule_version = service.snapshot().versions.rule_version;

    repo.set_unavailable(true);
    let outcome = service.reload_rules().await;
    assert!(!outcome.reloaded);
    assert_eq!(outcome.count_after, 1);
    assert!(service.poll_once().await.is_err());

    assert_eq!(service.snapshot().versions.rule_version, rule_version);
    assert_eq!(service.match_rules(jiazi_male(), None).await.len(), 1);
}

#[tokio::test]
async fn test_malformed_rule_is_skipped_not_fatal() {
    let repo = Arc::new(InMemoryRuleRepository::with_rules(vec![
        static_rule("GOOD", 1, json!({"day_stem": "甲"})),
        static_rule("BAD", 9, json!({"stem_count": {"stem": "甲", "min": 3, "max": 1}})),
    ]));
    let service = RuleMatchService::new(repo, &MatchingConfig::default());

    let outcome = service.reload_rules().await;
    assert!(outcome.reloaded);
    assert_eq!(outcome.count_after, 1);

    let matched = service.match_rules(jiazi_male(), None).await;
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].code, "GOOD");
}

#[tokio::test]
async fn test_snapshot_held_by_reader_survives_reload() {
    let repo = Arc::new(InMemoryRuleRepository::with_rules(vec![static_rule(
        "OLD",
        1,
        json!({}),
    )]));
    let service = RuleMatchService::new(repo.clone(), &MatchingConfig::default());
    service.reload_rules().await;

    let held = service.snapshot();
    repo.replace_rules(vec![static_rule("NEW_A", 1, json!({})), static_rule("NEW_B", 1, json!({}))]);
    service.reload_rules().await;

    assert_eq!(held.index.len(), 1);
    assert!(held.index.get("OLD").is_some());
    assert_eq!(service.snapshot().index.len(), 2);
}

#[tokio::test]
async fn test_watcher_stops_cleanly() {
    let repo = Arc::new(InMemoryRuleRepository::with_rules(vec![static_rule(
        "BASE",
        1,
        json!({}),
    )]));
    let service = Arc::new(RuleMatchService::new(repo.clone(), &MatchingConfig::default()));
    service.reload_rules().await;

    let handle = VersionWatcher::spawn(Arc::clone(&service), Duration::from_millis(20));
    repo.upsert_rule(static_rule("ADDED", 2, json!({})));

    let mut reloaded = false;
    for _ in 0..100 {
        if service.rule_count() == 2 {
            reloaded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(reloaded);

    tokio::time::timeout(Duration::from_secs(1), handle.stop())
        .await
        .expect("watcher did not stop");
}
