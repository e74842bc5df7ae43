//! 典型匹配场景

use natal_shared::config::MatchingConfig;
use rule_engine::{InMemoryRuleRepository, RuleMatchService, RuleRecord};
use serde_json::json;
use std::sync::Arc;

use crate::data::{jiazi_male, static_rule};
use crate::helpers::CountingAdapter;

async fn service_with(rules: Vec<RuleRecord>) -> RuleMatchService {
    let repo = Arc::new(InMemoryRuleRepository::with_rules(rules));
    let service = RuleMatchService::new(repo, &MatchingConfig::default());
    service.reload_rules().await;
    service
}

#[tokio::test]
async fn test_day_pillar_and_gender_match() {
    let service = service_with(vec![static_rule(
        "JIAZI_MALE",
        1,
        json!({"all": [{"day_pillar": {"stem": "甲", "branch": "子"}}, {"gender": "male"}]}),
    )])
    .await;

    let matched = service.match_rules(jiazi_male(), None).await;
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].code, "JIAZI_MALE");
}

#[tokio::test]
async fn test_other_day_pillar_does_not_match() {
    let service = service_with(vec![static_rule(
        "YICHOU_MALE",
        1,
        json!({"all": [{"day_pillar": {"stem": "乙", "branch": "丑"}}, {"gender": "male"}]}),
    )])
    .await;

    assert!(service.match_rules(jiazi_male(), None).await.is_empty());
}

#[tokio::test]
async fn test_missing_adapter_returns_default() {
    let service = service_with(vec![RuleRecord::new(
        "DYN",
        "general",
        1,
        json!({"day_stem": "甲"}),
        json!({
            "type": "dynamic",
            "adapter": "Missing",
            "method": "x",
            "default": {"type": "text", "text": "fallback"}
        }),
    )])
    .await;

    let matched = service.match_rules(jiazi_male(), None).await;
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].content, json!({"type": "text", "text": "fallback"}));
}

#[tokio::test]
async fn test_failing_adapter_returns_default() {
    let service = service_with(vec![RuleRecord::new(
        "DYN_FAIL",
        "general",
        1,
        json!({}),
        json!({
            "type": "dynamic",
            "adapter": "Counting",
            "method": "fail",
            "default": [{"type": "text", "text": "默认内容"}]
        }),
    )])
    .await;
    service.register_content_adapter("Counting", Arc::new(CountingAdapter::default()));

    let matched = service.match_rules(jiazi_male(), None).await;
    assert_eq!(matched[0].content, json!([{"type": "text", "text": "默认内容"}]));
}

#[tokio::test]
async fn test_content_version_bump_recomputes() {
    let repo = Arc::new(InMemoryRuleRepository::with_rules(vec![RuleRecord::new(
        "DYN",
        "general",
        1,
        json!({}),
        json!({"type": "dynamic", "adapter": "Counting", "method": "next"}),
    )]));
    let service = RuleMatchService::new(repo.clone(), &MatchingConfig::default());
    let adapter = Arc::new(CountingAdapter::default());
    service.register_content_adapter("Counting", adapter.clone());
    service.reload_rules().await;

    let first = service.match_rules(jiazi_male(), None).await;
    let cached = service.match_rules(jiazi_male(), None).await;
    assert_eq!(first, cached);
    assert_eq!(adapter.calls(), 1);

    repo.bump_content_version();
    let poll = service.poll_once().await.unwrap();
    assert!(poll.content_reloaded);
    assert!(!poll.rules_reloaded);

    let fresh = service.match_rules(jiazi_male(), None).await;
    assert_eq!(adapter.calls(), 2);
    assert_eq!(fresh[0].content["text"], "call-2");
    assert_ne!(fresh, first);
}

#[tokio::test]
async fn test_explicit_content_reload_without_version_change() {
    let repo = Arc::new(InMemoryRuleRepository::with_rules(vec![RuleRecord::new(
        "DYN",
        "general",
        1,
        json!({}),
        json!({"type": "dynamic", "adapter": "Counting", "method": "next"}),
    )]));
    let service = RuleMatchService::new(repo, &MatchingConfig::default());
    let adapter = Arc::new(CountingAdapter::default());
    service.register_content_adapter("Counting", adapter.clone());
    service.reload_rules().await;

    service.match_rules(jiazi_male(), None).await;
    let outcome = service.reload_content().await;
    assert_eq!(outcome.invalidated_cache_entries, 1);

    service.match_rules(jiazi_male(), None).await;
    assert_eq!(adapter.calls(), 2);
}
