//! 匹配结果的通用性质

use natal_shared::config::MatchingConfig;
use rule_engine::{
    AnnualPillar, Branch, ConditionEvaluator, FactRecord, InMemoryRuleRepository, RuleCompiler,
    RuleIndex, RuleMatchService, Stem,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use crate::data::{catalog_rules, generated_facts, jiazi_male, static_rule};

/// 索引剪枝不能漏掉任何真正命中的规则
#[test]
fn test_index_shortlist_is_complete() {
    let report = RuleCompiler::new().compile_all(catalog_rules());
    assert!(report.malformed.is_empty(), "{:?}", report.malformed);
    let index = RuleIndex::build(report.rules);

    let mut total_matches = 0;
    for fact in generated_facts(60) {
        let shortlist: HashSet<String> = index
            .shortlist(&fact, None)
            .iter()
            .map(|rule| rule.code.clone())
            .collect();

        for rule in index.rules() {
            if ConditionEvaluator::evaluate(&rule.conditions, &fact) {
                total_matches += 1;
                assert!(
                    shortlist.contains(&rule.code),
                    "rule {} matches {} but was pruned",
                    rule.code,
                    fact.ganzhi(rule_engine::PillarPosition::Day)
                );
            }
        }
    }

    // 确认测试数据确实产生了命中
    assert!(total_matches > 60);
}

/// 结果按优先级降序，同优先级按编码升序
#[tokio::test]
async fn test_results_are_sorted() {
    let repo = Arc::new(InMemoryRuleRepository::with_rules(catalog_rules()));
    let service = RuleMatchService::new(repo, &MatchingConfig::default());
    service.reload_rules().await;

    for fact in generated_facts(20) {
        let matched = service.match_rules(fact, None).await;
        for pair in matched.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                a.priority > b.priority || (a.priority == b.priority && a.code < b.code),
                "{}({}) before {}({})",
                a.code,
                a.priority,
                b.code,
                b.priority
            );
        }
    }
}

/// 并行路径与串行路径结果一致
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_matches_inline() {
    let repo = Arc::new(InMemoryRuleRepository::with_rules(catalog_rules()));

    let inline = RuleMatchService::new(
        repo.clone(),
        &MatchingConfig {
            inline_threshold: usize::MAX,
            ..Default::default()
        },
    );
    let parallel = RuleMatchService::new(
        repo,
        &MatchingConfig {
            inline_threshold: 1,
            worker_cap: 4,
            ..Default::default()
        },
    );
    inline.reload_rules().await;
    parallel.reload_rules().await;

    for fact in generated_facts(30) {
        let fact = Arc::new(fact);
        let a = inline.match_rules(Arc::clone(&fact), None).await;
        let b = parallel.match_rules(fact, None).await;
        assert_eq!(a, b);
    }
}

/// 重复匹配结果一致，且第二次由缓存提供
#[tokio::test]
async fn test_repeated_match_is_cached() {
    let repo = Arc::new(InMemoryRuleRepository::with_rules(catalog_rules()));
    let service = RuleMatchService::new(repo, &MatchingConfig::default());
    service.reload_rules().await;

    let first = service.match_rules(jiazi_male(), None).await;
    let hits_before = service.cache_stats().local_hits;
    let second = service.match_rules(jiazi_male(), None).await;

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(service.cache_stats().local_hits, hits_before + 1);
}

fn with_annuals(current_year: i32) -> FactRecord {
    let mut fact = jiazi_male();
    fact.birth_time = Some("1990-05-06T04:30:00+08:00".to_string());
    fact.annual_pillars = vec![
        AnnualPillar {
            year: 2024,
            stem: Stem::Jia,
            branch: Branch::Chen,
        },
        AnnualPillar {
            year: 2025,
            stem: Stem::Yi,
            branch: Branch::Si,
        },
    ];
    fact.current_year = Some(current_year);
    fact
}

/// 同一命盘仅流年或神煞不同，缓存不能串用结果
#[tokio::test]
async fn test_cache_distinguishes_non_pillar_fields() {
    let repo = Arc::new(InMemoryRuleRepository::with_rules(vec![
        static_rule("ANNUAL_JIA", 2, json!({"annual_stem": "甲"})),
        static_rule("WENCHANG", 1, json!({"deity_any": "文昌"})),
    ]));
    let service = RuleMatchService::new(repo, &MatchingConfig::default());
    service.reload_rules().await;

    let codes = |matched: Vec<rule_engine::MatchedRule>| -> Vec<String> {
        matched.into_iter().map(|m| m.code).collect()
    };

    let year_2024 = service.match_rules(with_annuals(2024), None).await;
    assert_eq!(codes(year_2024), vec!["ANNUAL_JIA"]);
    let year_2025 = service.match_rules(with_annuals(2025), None).await;
    assert!(year_2025.is_empty());

    let mut with_deity = with_annuals(2025);
    with_deity.pillars.day.deities = vec!["文昌".to_string()];
    assert_eq!(codes(service.match_rules(with_deity, None).await), vec!["WENCHANG"]);
    assert!(service.match_rules(with_annuals(2025), None).await.is_empty());

    // 最后一次与第二次完全相同，由缓存提供
    assert_eq!(service.cache_stats().local_hits, 1);
}

/// 缓存结果始终与直接求值一致
#[tokio::test]
async fn test_cached_results_agree_with_evaluator() {
    let rules = catalog_rules();
    let repo = Arc::new(InMemoryRuleRepository::with_rules(rules.clone()));
    let service = RuleMatchService::new(repo, &MatchingConfig::default());
    service.reload_rules().await;
    let compiled = RuleCompiler::new().compile_all(rules).rules;

    // 相同四柱，神煞各不相同
    for deities in [vec![], vec!["文昌"], vec!["天乙贵人", "文昌"], vec!["驿马"]] {
        let mut fact = jiazi_male();
        fact.pillars.day.deities = deities.iter().map(|d| d.to_string()).collect();

        let expected: HashSet<String> = compiled
            .iter()
            .filter(|rule| ConditionEvaluator::evaluate(&rule.conditions, &fact))
            .map(|rule| rule.code.clone())
            .collect();
        let actual: HashSet<String> = service
            .match_rules(fact, None)
            .await
            .into_iter()
            .map(|m| m.code)
            .collect();
        assert_eq!(actual, expected, "deities {:?}", deities);
    }
}
