//! 条件评估器性能基准测试
//!
//! 针对 ConditionEvaluator 的各类谓词进行细粒度的性能测试。

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rule_engine::{ConditionEvaluator, ConditionNode, FactRecord};
use serde_json::{Value, json};
use std::hint::black_box;

/// 创建测试命盘：庚午 辛巳 甲子 丙寅，男
fn create_fact() -> FactRecord {
    FactRecord::from_json(
        &json!({
            "pillars": {
                "year": {"stem": "庚", "branch": "午", "deities": ["将星"]},
                "month": {"stem": "辛", "branch": "巳", "deities": ["驿马"]},
                "day": {"stem": "甲", "branch": "子", "deities": ["天乙贵人"]},
                "hour": {"stem": "丙", "branch": "寅", "deities": ["文昌"]}
            },
            "gender": "male",
            "current_age": 34,
            "luck_pillars": [
                {"stem": "壬", "branch": "午", "start_age": 28, "end_age": 37}
            ]
        })
        .to_string(),
    )
    .expect("valid fact record")
}

fn node(value: Value) -> ConditionNode {
    ConditionNode::parse(&value).unwrap()
}

/// 干支直接比较类谓词
fn bench_pillar_predicates(c: &mut Criterion) {
    let mut group = c.benchmark_group("pillar_predicates");
    let fact = create_fact();

    let cases = [
        ("day_pillar", json!({"day_pillar": "甲子"})),
        ("stem_in", json!({"stem_in": {"pillar": "hour", "values": ["丙", "丁"]}})),
        ("nayin", json!({"nayin": {"pillar": "day", "values": "海中金"}})),
        ("gender", json!({"gender": "male"})),
    ];

    for (name, cond) in cases {
        let cond = node(cond);
        group.bench_function(name, |b| {
            b.iter(|| ConditionEvaluator::evaluate(black_box(&cond), black_box(&fact)))
        });
    }

    group.finish();
}

/// 关系与统计类谓词
fn bench_relation_predicates(c: &mut Criterion) {
    let mut group = c.benchmark_group("relation_predicates");
    let fact = create_fact();

    let cases = [
        (
            "pillar_relation",
            json!({"pillar_relation": {"a": "year", "b": "day", "relation": "clash"}}),
        ),
        ("branch_relation_any", json!({"branch_relation_any": "harm"})),
        ("three_harmony", json!({"three_harmony": {"element": "火", "partial": true}})),
        ("ten_god_count", json!({"ten_god_count": {"god": "七杀", "min": 1}})),
        ("element_dominant", json!({"element_dominant": "火"})),
        ("void_any", json!({"void_any": null})),
        ("luck_relation", json!({"luck_relation": {"pillar": "day", "relation": "clash"}})),
    ];

    for (name, cond) in cases {
        let cond = node(cond);
        group.bench_function(name, |b| {
            b.iter(|| ConditionEvaluator::evaluate(black_box(&cond), black_box(&fact)))
        });
    }

    group.finish();
}

/// 条件树深度对评估耗时的影响
fn bench_nested_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_depth");
    let fact = create_fact();

    for depth in [1usize, 4, 16, 32] {
        let mut cond = json!({"day_stem": "甲"});
        for i in 0..depth {
            cond = if i % 2 == 0 {
                json!({"all": [cond, {"gender": "male"}]})
            } else {
                json!({"any": [{"gender": "female"}, cond]})
            };
        }
        let cond = node(cond);

        group.bench_with_input(BenchmarkId::from_parameter(depth), &cond, |b, cond| {
            b.iter(|| ConditionEvaluator::evaluate(black_box(cond), black_box(&fact)))
        });
    }

    group.finish();
}

/// 条件解析
fn bench_parse(c: &mut Criterion) {
    let raw = json!({
        "all": [
            {"day_pillar": {"stem": "甲", "branch": "子"}},
            {"any": [
                {"deity_in_pillar": {"pillar": "day", "deity": "天乙贵人"}},
                {"ten_god_count": {"god": "正官", "min": 2}}
            ]},
            {"not": {"branch_relation_any": "clash"}}
        ]
    });

    c.bench_function("parse_condition_tree", |b| {
        b.iter(|| ConditionNode::parse(black_box(&raw)))
    });
}

criterion_group!(
    benches,
    bench_pillar_predicates,
    bench_relation_predicates,
    bench_nested_depth,
    bench_parse,
);
criterion_main!(benches);
