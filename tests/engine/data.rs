//! 测试数据生成

use rule_engine::{FactRecord, FourPillars, Gender, PillarPosition, RuleRecord};
use serde_json::{Value, json};

const STEMS: [&str; 10] = ["甲", "乙", "丙", "丁", "戊", "己", "庚", "辛", "壬", "癸"];
const BRANCHES: [&str; 12] = [
    "子", "丑", "寅", "卯", "辰", "巳", "午", "未", "申", "酉", "戌", "亥",
];

const DEITIES: [&str; 4] = ["天乙贵人", "文昌", "驿马", "桃花"];

/// 六十甲子第 i 位
pub fn cycle(i: usize) -> String {
    format!("{}{}", STEMS[i % 10], BRANCHES[i % 12])
}

/// 标准测试命盘：庚午 辛巳 甲子 丙寅，男
pub fn jiazi_male() -> FactRecord {
    FactRecord::new(
        FourPillars::parse("庚午", "辛巳", "甲子", "丙寅").unwrap(),
        Gender::Male,
    )
}

/// 按序号生成一组覆盖不同干支、性别、神煞的命盘
pub fn generated_facts(count: usize) -> Vec<FactRecord> {
    (0..count)
        .map(|i| {
            let pillars = FourPillars::parse(
                &cycle(i),
                &cycle((i * 7 + 3) % 60),
                &cycle((i * 13 + 5) % 60),
                &cycle((i * 17 + 11) % 60),
            )
            .unwrap();
            let gender = if i % 2 == 0 { Gender::Male } else { Gender::Female };
            let mut fact = FactRecord::new(pillars, gender);

            fact.pillars.get_mut(PillarPosition::Day).deities = vec![DEITIES[i % 4].to_string()];
            if i % 3 == 0 {
                fact.pillars.get_mut(PillarPosition::Hour).deities =
                    vec![DEITIES[(i + 1) % 4].to_string()];
            }
            fact
        })
        .collect()
}

/// 覆盖主要谓词类别的条件集合
pub fn condition_catalog() -> Vec<Value> {
    vec![
        json!({"day_pillar": "甲子"}),
        json!({"day_pillar": {"stem": "丙"}}),
        json!({"year_pillar": {"branch": "午"}}),
        json!({"stem_in": {"pillar": "hour", "values": ["丙", "丁"]}}),
        json!({"branch_in": {"pillar": "month", "values": ["寅", "申"]}}),
        json!({"pillar_in": {"pillar": "day", "values": ["甲子", "乙丑", "丙寅"]}}),
        json!({"ganzhi_present": "庚午"}),
        json!({"nayin": {"pillar": "year", "values": ["海中金", "炉中火"]}}),
        json!({"any": [{"day_pillar": "甲子"}, {"gender": "female"}]}),
        json!({"not": {"day_stem": "甲"}}),
        json!({"deity_in_pillar": {"pillar": "day", "deity": "天乙贵人"}}),
        json!({"deity_any": "文昌"}),
        json!({"deity_count": {"deity": "文昌", "min": 1}}),
        json!({"deity_count": {"deity": "文昌", "max": 0}}),
        json!({"deities_all": ["天乙贵人", "文昌"]}),
        json!({"deities_any": ["驿马", "桃花"]}),
        json!({"stem_count": {"stem": "庚", "min": 2}}),
        json!({"branch_count": {"branch": "子", "min": 1}}),
        json!({"branch_count": {"branch": "子", "max": 0}}),
        json!({"all": [{"day_stem": ["甲", "乙"]}, {"branch_relation_any": "clash"}]}),
        json!({"pillar_relation": {"a": "year", "b": "day", "relation": "combine"}}),
        json!({"three_harmony": {"element": "水", "partial": true}}),
        json!({"element_missing": "土"}),
        json!({"ten_god_count": {"god": "正官", "min": 1}}),
        json!({"month_ten_god": ["正财", "偏财"]}),
        json!({"void_any": null}),
        json!({"gender": "male", "hour_pillar": {"branch": "寅"}}),
        json!({}),
    ]
}

/// 由条件集合生成规则，优先级刻意制造并列
pub fn catalog_rules() -> Vec<RuleRecord> {
    condition_catalog()
        .into_iter()
        .enumerate()
        .map(|(i, conditions)| {
            RuleRecord::new(
                format!("R{:03}", i),
                if i % 2 == 0 { "even" } else { "odd" },
                (i % 4) as i32,
                conditions,
                json!({"type": "static", "items": [format!("R{:03}", i)]}),
            )
        })
        .collect()
}

/// 静态内容规则
pub fn static_rule(code: &str, priority: i32, conditions: Value) -> RuleRecord {
    RuleRecord::new(
        code,
        "general",
        priority,
        conditions,
        json!({"type": "static", "items": [{"type": "text", "text": code}]}),
    )
}
