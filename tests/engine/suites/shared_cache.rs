//! 共享缓存层

use natal_shared::config::MatchingConfig;
use rule_engine::{InMemoryRuleRepository, RuleMatchService};
use serde_json::json;
use std::sync::Arc;

use crate::data::{jiazi_male, static_rule};
use crate::helpers::MemorySharedCache;

fn repo() -> Arc<InMemoryRuleRepository> {
    Arc::new(InMemoryRuleRepository::with_rules(vec![
        static_rule("A", 2, json!({"day_stem": "甲"})),
        static_rule("B", 1, json!({})),
    ]))
}

/// 两个实例共用同一共享缓存：后者可直接命中前者写入的结果
#[tokio::test]
async fn test_second_instance_hits_shared_tier() {
    let shared = Arc::new(MemorySharedCache::default());
    let repo = repo();

    let first = RuleMatchService::new(repo.clone(), &MatchingConfig::default())
        .with_shared_cache(shared.clone());
    let second = RuleMatchService::new(repo, &MatchingConfig::default())
        .with_shared_cache(shared.clone());
    first.reload_rules().await;
    second.reload_rules().await;

    let a = first.match_rules(jiazi_male(), None).await;
    assert_eq!(shared.len(), 1);

    let b = second.match_rules(jiazi_male(), None).await;
    assert_eq!(a, b);
    assert_eq!(second.cache_stats().shared_hits, 1);

    // 共享层命中后回填本地层
    second.match_rules(jiazi_male(), None).await;
    assert_eq!(second.cache_stats().local_hits, 1);
}

/// 共享层故障时匹配照常进行
#[tokio::test]
async fn test_shared_outage_is_a_miss() {
    let shared = Arc::new(MemorySharedCache::default());
    let service = RuleMatchService::new(repo(), &MatchingConfig::default())
        .with_shared_cache(shared.clone());
    service.reload_rules().await;

    shared.set_down(true);
    let matched = service.match_rules(jiazi_male(), None).await;
    assert_eq!(matched.len(), 2);

    let stats = service.cache_stats();
    assert_eq!(stats.misses, 1);
    assert!(stats.shared_errors >= 2);
}

/// 规则版本变化后共享层旧条目不再被使用
#[tokio::test]
async fn test_stale_shared_entry_is_ignored() {
    let shared = Arc::new(MemorySharedCache::default());
    let repo = repo();
    let service = RuleMatchService::new(repo.clone(), &MatchingConfig::default())
        .with_shared_cache(shared.clone());
    service.reload_rules().await;

    service.match_rules(jiazi_male(), None).await;

    repo.upsert_rule(static_rule("C", 3, json!({"gender": "male"})));
    service.reload_rules().await;

    let matched = service.match_rules(jiazi_male(), None).await;
    assert_eq!(matched[0].code, "C");
    assert_eq!(service.cache_stats().shared_hits, 0);
}

/// 内容重载同时清空共享层
#[tokio::test]
async fn test_content_reload_clears_shared_tier() {
    let shared = Arc::new(MemorySharedCache::default());
    let service = RuleMatchService::new(repo(), &MatchingConfig::default())
        .with_shared_cache(shared.clone());
    service.reload_rules().await;

    service.match_rules(jiazi_male(), None).await;
    assert_eq!(shared.len(), 1);

    let outcome = service.reload_content().await;
    // 本地 1 条 + 共享 1 条
    assert_eq!(outcome.invalidated_cache_entries, 2);
    assert_eq!(shared.len(), 0);
}
