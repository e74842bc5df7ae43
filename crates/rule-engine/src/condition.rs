//! 条件树
//!
//! 规则条件以 JSON 存储，每个节点是一个对象：
//!
//! ```text
//! {"all": [..]} | {"any": [..]} | {"not": {..}}   组合节点
//! {"day_pillar": {"stem": "甲", "branch": "子"}}   叶子谓词
//! ```
//!
//! 含多个键的对象视为隐式 `all`；`{}` 与 `null` 恒为真。
//! 未知的谓词类型解析为 [`Predicate::Unsupported`]，评估时失败关闭；
//! 已知类型但参数非法时整条规则解析失败。

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Result, RuleError};
use crate::ganzhi::{
    Branch, Element, GanZhi, Gender, LifeStage, PillarPosition, Season, Stem, TenGod, YinYang,
};
use crate::operators::{Bounds, CountMode, Relation, TenGodScope};

/// 条件树最大嵌套深度
pub const MAX_DEPTH: usize = 64;

/// 条件节点
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    All(Vec<ConditionNode>),
    Any(Vec<ConditionNode>),
    Not(Box<ConditionNode>),
    Leaf(Predicate),
}

impl ConditionNode {
    /// 从 JSON 解析条件树
    pub fn parse(value: &Value) -> Result<Self> {
        parse_node(value, "root", 0)
    }

    pub fn leaf(predicate: Predicate) -> Self {
        Self::Leaf(predicate)
    }

    /// 叶子谓词总数
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::All(children) | Self::Any(children) => {
                children.iter().map(Self::leaf_count).sum()
            }
            Self::Not(inner) => inner.leaf_count(),
            Self::Leaf(_) => 1,
        }
    }

    /// 收集未识别的谓词类型
    pub fn unsupported_kinds(&self) -> Vec<&str> {
        let mut kinds = Vec::new();
        self.collect_unsupported(&mut kinds);
        kinds
    }

    fn collect_unsupported<'a>(&'a self, kinds: &mut Vec<&'a str>) {
        match self {
            Self::All(children) | Self::Any(children) => {
                for child in children {
                    child.collect_unsupported(kinds);
                }
            }
            Self::Not(inner) => inner.collect_unsupported(kinds),
            Self::Leaf(Predicate::Unsupported { kind }) => kinds.push(kind),
            Self::Leaf(_) => {}
        }
    }
}

fn parse_node(value: &Value, path: &str, depth: usize) -> Result<ConditionNode> {
    if depth > MAX_DEPTH {
        return Err(RuleError::ParseError(format!(
            "{}: 条件嵌套超过 {} 层",
            path, MAX_DEPTH
        )));
    }

    match value {
        Value::Null => Ok(ConditionNode::All(Vec::new())),
        Value::Array(items) => Ok(ConditionNode::All(parse_list(items, path, depth)?)),
        Value::Object(map) => {
            let mut nodes = Vec::with_capacity(map.len());
            for (kind, args) in map {
                nodes.push(parse_entry(kind, args, path, depth)?);
            }
            if nodes.len() == 1 {
                Ok(nodes.remove(0))
            } else {
                Ok(ConditionNode::All(nodes))
            }
        }
        other => Err(RuleError::ParseError(format!(
            "{}: 条件节点必须是对象，实际为 {}",
            path, other
        ))),
    }
}

fn parse_list(items: &[Value], path: &str, depth: usize) -> Result<Vec<ConditionNode>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_node(item, &format!("{}[{}]", path, i), depth + 1))
        .collect()
}

fn parse_entry(kind: &str, args: &Value, path: &str, depth: usize) -> Result<ConditionNode> {
    let child_path = format!("{}.{}", path, kind);
    match kind {
        "all" | "and" | "any" | "or" => {
            let items = args.as_array().ok_or_else(|| {
                RuleError::ParseError(format!("{}: {} 需要数组", child_path, kind))
            })?;
            let children = parse_list(items, &child_path, depth)?;
            if matches!(kind, "all" | "and") {
                Ok(ConditionNode::All(children))
            } else {
                Ok(ConditionNode::Any(children))
            }
        }
        "not" => Ok(ConditionNode::Not(Box::new(parse_node(
            args,
            &child_path,
            depth + 1,
        )?))),
        _ => Predicate::parse(kind, args)
            .map(ConditionNode::Leaf)
            .map_err(|reason| RuleError::ParseError(format!("{}: {}", child_path, reason))),
    }
}

/// 叶子谓词
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    // ---- 四柱取值 ----
    PillarEquals {
        pillar: PillarPosition,
        stem: Option<Stem>,
        branch: Option<Branch>,
    },
    PillarIn {
        pillar: PillarPosition,
        values: Vec<GanZhi>,
    },
    StemIn {
        pillar: PillarPosition,
        values: Vec<Stem>,
    },
    BranchIn {
        pillar: PillarPosition,
        values: Vec<Branch>,
    },
    DayStem(Vec<Stem>),
    GanZhiPresent(GanZhi),
    Nayin {
        pillar: PillarPosition,
        values: Vec<String>,
    },

    // ---- 柱间关系 ----
    PillarRelation {
        a: PillarPosition,
        b: PillarPosition,
        relation: Relation,
    },
    BranchRelationAny(Relation),
    StemRelationAny(Relation),
    ThreeHarmony {
        element: Option<Element>,
        partial: bool,
    },
    ThreeMeeting {
        element: Option<Element>,
    },
    SelfPunishment,
    VoidInPillar(PillarPosition),
    VoidAny,

    // ---- 神煞 ----
    DeityInPillar {
        pillar: PillarPosition,
        deity: String,
    },
    DeityAny(String),
    DeityCount {
        deity: String,
        bounds: Bounds,
    },
    DeitiesAll(Vec<String>),
    DeitiesAny(Vec<String>),
    DeityInPillars {
        deity: String,
        pillars: Vec<PillarPosition>,
    },

    // ---- 十神 ----
    TenGodCount {
        god: TenGod,
        bounds: Bounds,
    },
    TenGodGroupCount {
        gods: Vec<TenGod>,
        bounds: Bounds,
    },
    TenGodInPillar {
        pillar: PillarPosition,
        god: TenGod,
        scope: TenGodScope,
    },
    TenGodPresent(TenGod),
    TenGodAbsent(TenGod),
    MonthTenGod(Vec<TenGod>),

    // ---- 干支计数 ----
    StemCount {
        stem: Stem,
        bounds: Bounds,
        include_luck: bool,
        include_annual: bool,
    },
    BranchCount {
        branch: Branch,
        bounds: Bounds,
        include_luck: bool,
        include_annual: bool,
    },
    StemPresent(Stem),
    BranchPresent(Branch),
    StemCounts {
        counts: BTreeMap<Stem, u32>,
        mode: CountMode,
    },
    BranchCounts {
        counts: BTreeMap<Branch, u32>,
        mode: CountMode,
    },
    HiddenStemPresent {
        stem: Stem,
        pillar: Option<PillarPosition>,
    },
    DistinctBranchCount(Bounds),
    RepeatedBranch {
        min: u32,
    },

    // ---- 五行 ----
    ElementCount {
        element: Element,
        bounds: Bounds,
    },
    ElementMissing(Element),
    ElementDominant(Element),
    ElementWeakest(Element),
    DayMasterElement(Vec<Element>),
    DayMasterYinYang(YinYang),
    DayMasterStrength(Vec<String>),
    YangCount(Bounds),

    // ---- 大运 / 流年 ----
    LuckStem(Vec<Stem>),
    LuckBranch(Vec<Branch>),
    AnnualStem(Vec<Stem>),
    AnnualBranch(Vec<Branch>),
    LuckGanZhi(Vec<GanZhi>),
    AnnualGanZhi(Vec<GanZhi>),
    LuckRelation {
        pillar: PillarPosition,
        relation: Relation,
    },
    AnnualRelation {
        pillar: PillarPosition,
        relation: Relation,
    },
    AnnualLuckRelation(Relation),
    LuckTenGod(Vec<TenGod>),
    AnnualTenGod(Vec<TenGod>),
    AgeRange(Bounds),

    // ---- 历法 / 个人 ----
    LunarMonth(Vec<u32>),
    LunarDay(Vec<u32>),
    LunarLeapMonth(bool),
    BirthSeason(Vec<Season>),
    Gender(Gender),
    LifeStage {
        pillar: PillarPosition,
        stages: Vec<LifeStage>,
    },
    LifeStageAny(Vec<LifeStage>),

    // ---- 字面量 ----
    Always(bool),

    /// 未识别的谓词类型，评估恒为假
    Unsupported {
        kind: String,
    },
}

// ==================== 参数结构 ====================

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(v) => vec![v],
            Self::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
struct PillarMatchArgs {
    #[serde(default)]
    stem: Option<Stem>,
    #[serde(default)]
    branch: Option<Branch>,
}

#[derive(Deserialize)]
struct PillarValuesArgs<T> {
    pillar: PillarPosition,
    values: OneOrMany<T>,
}

#[derive(Deserialize)]
struct PairRelationArgs {
    a: PillarPosition,
    b: PillarPosition,
    relation: Relation,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RelationArg {
    Plain(Relation),
    Wrapped { relation: Relation },
}

#[derive(Deserialize)]
struct HarmonyArgs {
    #[serde(default)]
    element: Option<Element>,
    #[serde(default)]
    partial: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PillarArg {
    Plain(PillarPosition),
    Wrapped { pillar: PillarPosition },
}

#[derive(Deserialize)]
struct DeityPillarArgs {
    pillar: PillarPosition,
    deity: String,
}

#[derive(Deserialize)]
struct DeityCountArgs {
    deity: String,
    #[serde(flatten)]
    bounds: Bounds,
}

#[derive(Deserialize)]
struct DeityPillarsArgs {
    deity: String,
    pillars: Vec<PillarPosition>,
}

#[derive(Deserialize)]
struct TenGodCountArgs {
    god: TenGod,
    #[serde(flatten)]
    bounds: Bounds,
}

#[derive(Deserialize)]
struct TenGodGroupArgs {
    gods: Vec<TenGod>,
    #[serde(flatten)]
    bounds: Bounds,
}

#[derive(Deserialize)]
struct TenGodPillarArgs {
    pillar: PillarPosition,
    god: TenGod,
    #[serde(default)]
    scope: TenGodScope,
}

#[derive(Deserialize)]
struct StemCountArgs {
    stem: Stem,
    #[serde(flatten)]
    bounds: Bounds,
    #[serde(default)]
    include_luck: bool,
    #[serde(default)]
    include_annual: bool,
}

#[derive(Deserialize)]
struct BranchCountArgs {
    branch: Branch,
    #[serde(flatten)]
    bounds: Bounds,
    #[serde(default)]
    include_luck: bool,
    #[serde(default)]
    include_annual: bool,
}

#[derive(Deserialize)]
struct CountsArgs<K: Ord> {
    counts: BTreeMap<K, u32>,
    #[serde(default)]
    mode: CountMode,
}

#[derive(Deserialize)]
struct HiddenStemArgs {
    stem: Stem,
    #[serde(default)]
    pillar: Option<PillarPosition>,
}

#[derive(Deserialize)]
struct RepeatedArgs {
    #[serde(default = "default_repeat")]
    min: u32,
}

fn default_repeat() -> u32 {
    2
}

#[derive(Deserialize)]
struct ElementCountArgs {
    element: Element,
    #[serde(flatten)]
    bounds: Bounds,
}

#[derive(Deserialize)]
struct BaseRelationArgs {
    pillar: PillarPosition,
    relation: Relation,
}

#[derive(Deserialize)]
struct LifeStageArgs {
    pillar: PillarPosition,
    stages: OneOrMany<LifeStage>,
}

fn de<T: DeserializeOwned>(args: &Value) -> std::result::Result<T, String> {
    T::deserialize(args).map_err(|e| e.to_string())
}

fn many<T: DeserializeOwned>(args: &Value) -> std::result::Result<Vec<T>, String> {
    // 兼容 {"values": [...]} 写法
    let args = match args.get("values") {
        Some(values) if args.as_object().is_some_and(|m| m.len() == 1) => values,
        _ => args,
    };
    de::<OneOrMany<T>>(args).map(OneOrMany::into_vec)
}

fn checked(bounds: Bounds) -> std::result::Result<Bounds, String> {
    if bounds.is_valid() {
        Ok(bounds)
    } else {
        Err(format!("区间无效: min={:?} > max={:?}", bounds.min, bounds.max))
    }
}

fn relation(args: &Value) -> std::result::Result<Relation, String> {
    de::<RelationArg>(args).map(|arg| match arg {
        RelationArg::Plain(r) | RelationArg::Wrapped { relation: r } => r,
    })
}

impl Predicate {
    /// 解析单个叶子谓词
    pub fn parse(kind: &str, args: &Value) -> std::result::Result<Self, String> {
        use PillarPosition::*;

        let predicate = match kind {
            "year_pillar" | "month_pillar" | "day_pillar" | "hour_pillar" => {
                let pillar = match kind {
                    "year_pillar" => Year,
                    "month_pillar" => Month,
                    "day_pillar" => Day,
                    _ => Hour,
                };
                let parsed = match args {
                    Value::String(s) => {
                        let gz: GanZhi = s.parse().map_err(|e: RuleError| e.to_string())?;
                        PillarMatchArgs {
                            stem: Some(gz.stem),
                            branch: Some(gz.branch),
                        }
                    }
                    _ => de::<PillarMatchArgs>(args)?,
                };
                if parsed.stem.is_none() && parsed.branch.is_none() {
                    return Err("至少需要指定 stem 或 branch".to_string());
                }
                Self::PillarEquals {
                    pillar,
                    stem: parsed.stem,
                    branch: parsed.branch,
                }
            }
            "pillar_in" => {
                let a = de::<PillarValuesArgs<GanZhi>>(args)?;
                Self::PillarIn {
                    pillar: a.pillar,
                    values: a.values.into_vec(),
                }
            }
            "stem_in" => {
                let a = de::<PillarValuesArgs<Stem>>(args)?;
                Self::StemIn {
                    pillar: a.pillar,
                    values: a.values.into_vec(),
                }
            }
            "branch_in" => {
                let a = de::<PillarValuesArgs<Branch>>(args)?;
                Self::BranchIn {
                    pillar: a.pillar,
                    values: a.values.into_vec(),
                }
            }
            "day_stem" => Self::DayStem(many(args)?),
            "ganzhi_present" => Self::GanZhiPresent(de(args)?),
            "nayin" => {
                let a = de::<PillarValuesArgs<String>>(args)?;
                Self::Nayin {
                    pillar: a.pillar,
                    values: a.values.into_vec(),
                }
            }

            "pillar_relation" => {
                let a = de::<PairRelationArgs>(args)?;
                if a.a == a.b {
                    return Err("pillar_relation 的两柱不能相同".to_string());
                }
                Self::PillarRelation {
                    a: a.a,
                    b: a.b,
                    relation: a.relation,
                }
            }
            "branch_relation_any" => Self::BranchRelationAny(relation(args)?),
            "stem_relation_any" => {
                let r = relation(args)?;
                if !r.is_stem_relation() {
                    return Err(format!("{} 不是天干关系", r));
                }
                Self::StemRelationAny(r)
            }
            "three_harmony" => {
                let a = if args.is_null() {
                    HarmonyArgs {
                        element: None,
                        partial: false,
                    }
                } else {
                    de::<HarmonyArgs>(args)?
                };
                Self::ThreeHarmony {
                    element: a.element,
                    partial: a.partial,
                }
            }
            "three_meeting" => {
                let element = if args.is_null() {
                    None
                } else if args.is_string() {
                    Some(de::<Element>(args)?)
                } else {
                    de::<HarmonyArgs>(args)?.element
                };
                Self::ThreeMeeting { element }
            }
            "self_punishment" => Self::SelfPunishment,
            "void_in_pillar" => Self::VoidInPillar(match de::<PillarArg>(args)? {
                PillarArg::Plain(p) | PillarArg::Wrapped { pillar: p } => p,
            }),
            "void_any" => Self::VoidAny,

            "deity_in_pillar" => {
                let a = de::<DeityPillarArgs>(args)?;
                Self::DeityInPillar {
                    pillar: a.pillar,
                    deity: a.deity,
                }
            }
            "deity_any" | "deity" => Self::DeityAny(match args {
                Value::String(s) => s.clone(),
                _ => de::<DeityCountArgs>(args)?.deity,
            }),
            "deity_count" => {
                let a = de::<DeityCountArgs>(args)?;
                Self::DeityCount {
                    deity: a.deity,
                    bounds: checked(a.bounds)?,
                }
            }
            "deities_all" => Self::DeitiesAll(many(args)?),
            "deities_any" => Self::DeitiesAny(many(args)?),
            "deity_in_pillars" => {
                let a = de::<DeityPillarsArgs>(args)?;
                Self::DeityInPillars {
                    deity: a.deity,
                    pillars: a.pillars,
                }
            }

            "ten_god_count" => {
                let a = de::<TenGodCountArgs>(args)?;
                Self::TenGodCount {
                    god: a.god,
                    bounds: checked(a.bounds)?,
                }
            }
            "ten_god_group_count" => {
                let a = de::<TenGodGroupArgs>(args)?;
                if a.gods.is_empty() {
                    return Err("gods 不能为空".to_string());
                }
                Self::TenGodGroupCount {
                    gods: a.gods,
                    bounds: checked(a.bounds)?,
                }
            }
            "ten_god_in_pillar" => {
                let a = de::<TenGodPillarArgs>(args)?;
                Self::TenGodInPillar {
                    pillar: a.pillar,
                    god: a.god,
                    scope: a.scope,
                }
            }
            "ten_god_present" => Self::TenGodPresent(de(args)?),
            "ten_god_absent" => Self::TenGodAbsent(de(args)?),
            "month_ten_god" => Self::MonthTenGod(many(args)?),

            "stem_count" => {
                let a = de::<StemCountArgs>(args)?;
                Self::StemCount {
                    stem: a.stem,
                    bounds: checked(a.bounds)?,
                    include_luck: a.include_luck,
                    include_annual: a.include_annual,
                }
            }
            "branch_count" => {
                let a = de::<BranchCountArgs>(args)?;
                Self::BranchCount {
                    branch: a.branch,
                    bounds: checked(a.bounds)?,
                    include_luck: a.include_luck,
                    include_annual: a.include_annual,
                }
            }
            "stem_present" => Self::StemPresent(de(args)?),
            "branch_present" => Self::BranchPresent(de(args)?),
            "stem_counts" => {
                let a = de::<CountsArgs<Stem>>(args)?;
                Self::StemCounts {
                    counts: a.counts,
                    mode: a.mode,
                }
            }
            "branch_counts" => {
                let a = de::<CountsArgs<Branch>>(args)?;
                Self::BranchCounts {
                    counts: a.counts,
                    mode: a.mode,
                }
            }
            "hidden_stem_present" => {
                let a = match args {
                    Value::String(_) => HiddenStemArgs {
                        stem: de(args)?,
                        pillar: None,
                    },
                    _ => de::<HiddenStemArgs>(args)?,
                };
                Self::HiddenStemPresent {
                    stem: a.stem,
                    pillar: a.pillar,
                }
            }
            "distinct_branch_count" => Self::DistinctBranchCount(checked(de(args)?)?),
            "repeated_branch" => {
                let min = if args.is_null() {
                    default_repeat()
                } else if let Some(n) = args.as_u64() {
                    n as u32
                } else {
                    de::<RepeatedArgs>(args)?.min
                };
                Self::RepeatedBranch { min }
            }

            "element_count" => {
                let a = de::<ElementCountArgs>(args)?;
                Self::ElementCount {
                    element: a.element,
                    bounds: checked(a.bounds)?,
                }
            }
            "element_missing" => Self::ElementMissing(de(args)?),
            "element_dominant" => Self::ElementDominant(de(args)?),
            "element_weakest" => Self::ElementWeakest(de(args)?),
            "day_master_element" => Self::DayMasterElement(many(args)?),
            "day_master_yin_yang" => Self::DayMasterYinYang(de(args)?),
            "day_master_strength" => Self::DayMasterStrength(many(args)?),
            "yang_count" => Self::YangCount(checked(de(args)?)?),

            "luck_stem" => Self::LuckStem(many(args)?),
            "luck_branch" => Self::LuckBranch(many(args)?),
            "annual_stem" => Self::AnnualStem(many(args)?),
            "annual_branch" => Self::AnnualBranch(many(args)?),
            "luck_ganzhi" => Self::LuckGanZhi(many(args)?),
            "annual_ganzhi" => Self::AnnualGanZhi(many(args)?),
            "luck_relation" => {
                let a = de::<BaseRelationArgs>(args)?;
                Self::LuckRelation {
                    pillar: a.pillar,
                    relation: a.relation,
                }
            }
            "annual_relation" => {
                let a = de::<BaseRelationArgs>(args)?;
                Self::AnnualRelation {
                    pillar: a.pillar,
                    relation: a.relation,
                }
            }
            "annual_luck_relation" => Self::AnnualLuckRelation(relation(args)?),
            "luck_ten_god" => Self::LuckTenGod(many(args)?),
            "annual_ten_god" => Self::AnnualTenGod(many(args)?),
            "age_range" => Self::AgeRange(checked(de(args)?)?),

            "lunar_month" => Self::LunarMonth(many(args)?),
            "lunar_day" => Self::LunarDay(many(args)?),
            "lunar_leap_month" => Self::LunarLeapMonth(de(args)?),
            "birth_season" => Self::BirthSeason(many(args)?),
            "gender" => Self::Gender(de(args)?),
            "life_stage" => {
                let a = de::<LifeStageArgs>(args)?;
                Self::LifeStage {
                    pillar: a.pillar,
                    stages: a.stages.into_vec(),
                }
            }
            "life_stage_any" => Self::LifeStageAny(many(args)?),

            "always" => Self::Always(if args.is_null() { true } else { de(args)? }),

            other => Self::Unsupported {
                kind: other.to_string(),
            },
        };

        Ok(predicate)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_composite() {
        let node = ConditionNode::parse(&json!({
            "all": [
                {"day_pillar": {"stem": "甲", "branch": "子"}},
                {"gender": "male"}
            ]
        }))
        .unwrap();

        match node {
            ConditionNode::All(children) => {
                assert_eq!(children.len(), 2);
                assert_eq!(
                    children[0],
                    ConditionNode::Leaf(Predicate::PillarEquals {
                        pillar: PillarPosition::Day,
                        stem: Some(Stem::Jia),
                        branch: Some(Branch::Zi),
                    })
                );
                assert_eq!(children[1], ConditionNode::Leaf(Predicate::Gender(Gender::Male)));
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_parse_not_and_any() {
        let node = ConditionNode::parse(&json!({
            "any": [
                {"not": {"deity_any": "羊刃"}},
                {"ten_god_count": {"god": "正官", "min": 2}}
            ]
        }))
        .unwrap();
        assert_eq!(node.leaf_count(), 2);
    }

    #[test]
    fn test_implicit_all_and_empty() {
        let node = ConditionNode::parse(&json!({
            "gender": "female",
            "day_stem": ["甲", "乙"]
        }))
        .unwrap();
        assert!(matches!(node, ConditionNode::All(ref c) if c.len() == 2));

        assert_eq!(
            ConditionNode::parse(&json!({})).unwrap(),
            ConditionNode::All(vec![])
        );
        assert_eq!(
            ConditionNode::parse(&Value::Null).unwrap(),
            ConditionNode::All(vec![])
        );
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        let node = ConditionNode::parse(&json!({"moon_phase": "full"})).unwrap();
        assert_eq!(node.unsupported_kinds(), vec!["moon_phase"]);
    }

    #[test]
    fn test_malformed_arguments_rejected() {
        // 未知天干
        assert!(ConditionNode::parse(&json!({"day_pillar": {"stem": "X"}})).is_err());
        // 空参数
        assert!(ConditionNode::parse(&json!({"day_pillar": {}})).is_err());
        // all 需要数组
        assert!(ConditionNode::parse(&json!({"all": {"gender": "male"}})).is_err());
        // 区间无效
        assert!(
            ConditionNode::parse(&json!({"ten_god_count": {"god": "正官", "min": 3, "max": 1}}))
                .is_err()
        );
        // 非对象节点
        assert!(ConditionNode::parse(&json!("gender")).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut value = json!({"gender": "male"});
        for _ in 0..(MAX_DEPTH + 2) {
            value = json!({ "not": value });
        }
        assert!(ConditionNode::parse(&value).is_err());
    }

    #[test]
    fn test_parse_one_or_many_forms() {
        let a = Predicate::parse("luck_branch", &json!("子")).unwrap();
        let b = Predicate::parse("luck_branch", &json!(["子"])).unwrap();
        let c = Predicate::parse("luck_branch", &json!({"values": ["子"]})).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_parse_counts_and_flattened_bounds() {
        let p = Predicate::parse(
            "stem_counts",
            &json!({"counts": {"甲": 2, "庚": 1}, "mode": "min"}),
        )
        .unwrap();
        match p {
            Predicate::StemCounts { counts, mode } => {
                assert_eq!(counts.get(&Stem::Jia), Some(&2));
                assert_eq!(mode, CountMode::Min);
            }
            other => panic!("unexpected predicate: {:?}", other),
        }

        let p = Predicate::parse(
            "branch_count",
            &json!({"branch": "午", "min": 2, "include_luck": true}),
        )
        .unwrap();
        assert!(matches!(
            p,
            Predicate::BranchCount {
                include_luck: true,
                include_annual: false,
                ..
            }
        ));
    }

    #[test]
    fn test_pillar_string_shorthand() {
        let p = Predicate::parse("hour_pillar", &json!("丙寅")).unwrap();
        assert_eq!(
            p,
            Predicate::PillarEquals {
                pillar: PillarPosition::Hour,
                stem: Some(Stem::Bing),
                branch: Some(Branch::Yin),
            }
        );
    }
}
