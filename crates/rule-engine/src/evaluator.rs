//! 条件评估器
//!
//! 对命盘事实记录求值条件树。评估是纯函数：不修改事实、不做 I/O，
//! 对任何合法的条件树与事实组合都返回布尔值。

use std::collections::HashSet;
use tracing::debug;

use crate::condition::{ConditionNode, Predicate};
use crate::fact::FactRecord;
use crate::ganzhi::{
    Branch, Element, GanZhi, PillarPosition, TenGod, harmony_branches, meeting_branches,
};
use crate::operators::{Relation, TenGodScope};

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件树
    ///
    /// `all([])` 为真，`any([])` 为假，组合节点短路求值。
    pub fn evaluate(node: &ConditionNode, fact: &FactRecord) -> bool {
        match node {
            ConditionNode::All(children) => children.iter().all(|c| Self::evaluate(c, fact)),
            ConditionNode::Any(children) => children.iter().any(|c| Self::evaluate(c, fact)),
            ConditionNode::Not(inner) => !Self::evaluate(inner, fact),
            ConditionNode::Leaf(predicate) => Self::evaluate_predicate(predicate, fact),
        }
    }

    /// 评估单个叶子谓词
    pub fn evaluate_predicate(predicate: &Predicate, fact: &FactRecord) -> bool {
        use Predicate as P;

        match predicate {
            // ---- 四柱取值 ----
            P::PillarEquals {
                pillar,
                stem,
                branch,
            } => {
                let p = fact.pillar(*pillar);
                stem.is_none_or(|s| p.stem == s) && branch.is_none_or(|b| p.branch == b)
            }
            P::PillarIn { pillar, values } => values.contains(&fact.ganzhi(*pillar)),
            P::StemIn { pillar, values } => values.contains(&fact.pillar(*pillar).stem),
            P::BranchIn { pillar, values } => values.contains(&fact.pillar(*pillar).branch),
            P::DayStem(values) => values.contains(&fact.day_stem()),
            P::GanZhiPresent(gz) => natal_ganzhi(fact).any(|g| g == *gz),
            P::Nayin { pillar, values } => {
                let nayin = fact.nayin(*pillar);
                values.iter().any(|v| v == nayin)
            }

            // ---- 柱间关系 ----
            P::PillarRelation { a, b, relation } => {
                related(*relation, fact.ganzhi(*a), fact.ganzhi(*b))
            }
            P::BranchRelationAny(relation) | P::StemRelationAny(relation) => {
                let pillars: Vec<GanZhi> = natal_ganzhi(fact).collect();
                pillars.iter().enumerate().any(|(i, a)| {
                    pillars[i + 1..]
                        .iter()
                        .any(|b| related(*relation, *a, *b))
                })
            }
            P::ThreeHarmony { element, partial } => {
                let branches = natal_branches(fact);
                frames(*element).any(|e| {
                    let frame = harmony_branches(e);
                    let present = frame.iter().filter(|b| branches.contains(b)).count();
                    // 半合必须含旺支（frame[1]）
                    present == 3 || (*partial && present == 2 && branches.contains(&frame[1]))
                })
            }
            P::ThreeMeeting { element } => {
                let branches = natal_branches(fact);
                frames(*element).any(|e| {
                    meeting_branches(e)
                        .iter()
                        .all(|b| branches.contains(b))
                })
            }
            P::SelfPunishment => Branch::ALL
                .iter()
                .any(|b| b.is_self_punishing() && fact.branch_count(*b) >= 2),
            P::VoidInPillar(pillar) => {
                *pillar != PillarPosition::Day && is_void(fact, fact.pillar(*pillar).branch)
            }
            P::VoidAny => PillarPosition::ALL
                .iter()
                .filter(|p| **p != PillarPosition::Day)
                .any(|p| is_void(fact, fact.pillar(*p).branch)),

            // ---- 神煞 ----
            P::DeityInPillar { pillar, deity } => fact.deity_in(*pillar, deity),
            P::DeityAny(deity) => fact.has_deity(deity),
            P::DeityCount { deity, bounds } => bounds.contains(fact.deity_count(deity) as f64),
            P::DeitiesAll(deities) => deities.iter().all(|d| fact.has_deity(d)),
            P::DeitiesAny(deities) => deities.iter().any(|d| fact.has_deity(d)),
            P::DeityInPillars { deity, pillars } => {
                pillars.iter().any(|p| fact.deity_in(*p, deity))
            }

            // ---- 十神 ----
            P::TenGodCount { god, bounds } => bounds.contains(fact.ten_god_count(*god) as f64),
            P::TenGodGroupCount { gods, bounds } => {
                let unique: HashSet<TenGod> = gods.iter().copied().collect();
                let total: u32 = unique.iter().map(|g| fact.ten_god_count(*g)).sum();
                bounds.contains(total as f64)
            }
            P::TenGodInPillar { pillar, god, scope } => {
                let in_stem = || fact.stem_ten_god(*pillar) == Some(*god);
                let in_hidden = || fact.hidden_ten_gods(*pillar).contains(god);
                match scope {
                    TenGodScope::Stem => in_stem(),
                    TenGodScope::Hidden => in_hidden(),
                    TenGodScope::Any => in_stem() || in_hidden(),
                }
            }
            P::TenGodPresent(god) => fact.ten_god_count(*god) > 0,
            P::TenGodAbsent(god) => fact.ten_god_count(*god) == 0,
            P::MonthTenGod(gods) => fact
                .stem_ten_god(PillarPosition::Month)
                .is_some_and(|g| gods.contains(&g)),

            // ---- 干支计数 ----
            P::StemCount {
                stem,
                bounds,
                include_luck,
                include_annual,
            } => {
                let mut count = fact.stem_count(*stem);
                if *include_luck && fact.active_luck().is_some_and(|l| l.stem == *stem) {
                    count += 1;
                }
                if *include_annual && fact.active_annual().is_some_and(|a| a.stem == *stem) {
                    count += 1;
                }
                bounds.contains(count as f64)
            }
            P::BranchCount {
                branch,
                bounds,
                include_luck,
                include_annual,
            } => {
                let mut count = fact.branch_count(*branch);
                if *include_luck && fact.active_luck().is_some_and(|l| l.branch == *branch) {
                    count += 1;
                }
                if *include_annual && fact.active_annual().is_some_and(|a| a.branch == *branch) {
                    count += 1;
                }
                bounds.contains(count as f64)
            }
            P::StemPresent(stem) => fact.stem_count(*stem) > 0,
            P::BranchPresent(branch) => fact.branch_count(*branch) > 0,
            P::StemCounts { counts, mode } => counts
                .iter()
                .all(|(stem, n)| mode.check(fact.stem_count(*stem), *n)),
            P::BranchCounts { counts, mode } => counts
                .iter()
                .all(|(branch, n)| mode.check(fact.branch_count(*branch), *n)),
            P::HiddenStemPresent { stem, pillar } => match pillar {
                Some(p) => fact.hidden_stems(*p).contains(stem),
                None => PillarPosition::ALL
                    .iter()
                    .any(|p| fact.hidden_stems(*p).contains(stem)),
            },
            P::DistinctBranchCount(bounds) => {
                bounds.contains(natal_branches(fact).len() as f64)
            }
            P::RepeatedBranch { min } => Branch::ALL.iter().any(|b| fact.branch_count(*b) >= *min),

            // ---- 五行 ----
            P::ElementCount { element, bounds } => bounds.contains(fact.element_count(*element)),
            P::ElementMissing(element) => fact.element_count(*element) <= f64::EPSILON,
            P::ElementDominant(element) => {
                let counts = fact.element_counts();
                let own = counts[element.index()];
                own > 0.0 && counts.iter().all(|c| own >= *c)
            }
            P::ElementWeakest(element) => {
                let counts = fact.element_counts();
                let own = counts[element.index()];
                counts.iter().all(|c| own <= *c)
            }
            P::DayMasterElement(elements) => elements.contains(&fact.day_stem().element()),
            P::DayMasterYinYang(yy) => fact.day_stem().yin_yang() == *yy,
            P::DayMasterStrength(values) => fact
                .day_master_strength
                .as_deref()
                .is_some_and(|s| values.iter().any(|v| v.eq_ignore_ascii_case(s))),
            P::YangCount(bounds) => bounds.contains(fact.yang_count() as f64),

            // ---- 大运 / 流年 ----
            P::LuckStem(stems) => fact.active_luck().is_some_and(|l| stems.contains(&l.stem)),
            P::LuckBranch(branches) => fact
                .active_luck()
                .is_some_and(|l| branches.contains(&l.branch)),
            P::AnnualStem(stems) => fact
                .active_annual()
                .is_some_and(|a| stems.contains(&a.stem)),
            P::AnnualBranch(branches) => fact
                .active_annual()
                .is_some_and(|a| branches.contains(&a.branch)),
            P::LuckGanZhi(values) => fact
                .active_luck()
                .is_some_and(|l| values.contains(&l.ganzhi())),
            P::AnnualGanZhi(values) => fact
                .active_annual()
                .is_some_and(|a| values.contains(&a.ganzhi())),
            P::LuckRelation { pillar, relation } => fact
                .active_luck()
                .is_some_and(|l| related(*relation, l.ganzhi(), fact.ganzhi(*pillar))),
            P::AnnualRelation { pillar, relation } => fact
                .active_annual()
                .is_some_and(|a| related(*relation, a.ganzhi(), fact.ganzhi(*pillar))),
            P::AnnualLuckRelation(relation) => match (fact.active_annual(), fact.active_luck()) {
                (Some(a), Some(l)) => related(*relation, a.ganzhi(), l.ganzhi()),
                _ => false,
            },
            P::LuckTenGod(gods) => fact
                .active_luck()
                .is_some_and(|l| gods.contains(&TenGod::of(fact.day_stem(), l.stem))),
            P::AnnualTenGod(gods) => fact
                .active_annual()
                .is_some_and(|a| gods.contains(&TenGod::of(fact.day_stem(), a.stem))),
            P::AgeRange(bounds) => fact
                .current_age
                .is_some_and(|age| bounds.contains(age as f64)),

            // ---- 历法 / 个人 ----
            P::LunarMonth(months) => fact.lunar.as_ref().is_some_and(|l| months.contains(&l.month)),
            P::LunarDay(days) => fact.lunar.as_ref().is_some_and(|l| days.contains(&l.day)),
            P::LunarLeapMonth(leap) => fact
                .lunar
                .as_ref()
                .is_some_and(|l| l.is_leap_month == *leap),
            P::BirthSeason(seasons) => seasons.contains(&fact.pillars.month.branch.season()),
            P::Gender(gender) => fact.gender == *gender,
            P::LifeStage { pillar, stages } => stages.contains(&fact.life_stage(*pillar)),
            P::LifeStageAny(stages) => PillarPosition::ALL
                .iter()
                .any(|p| stages.contains(&fact.life_stage(*p))),

            P::Always(value) => *value,

            P::Unsupported { kind } => {
                debug!(kind = %kind, "未识别的条件类型，按不满足处理");
                false
            }
        }
    }
}

/// 关系在两柱间按任一方向成立即可
fn related(relation: Relation, a: GanZhi, b: GanZhi) -> bool {
    relation.holds(a, b) || relation.holds(b, a)
}

fn natal_ganzhi(fact: &FactRecord) -> impl Iterator<Item = GanZhi> + '_ {
    PillarPosition::ALL.into_iter().map(|p| fact.ganzhi(p))
}

fn natal_branches(fact: &FactRecord) -> HashSet<Branch> {
    PillarPosition::ALL
        .into_iter()
        .map(|p| fact.pillar(p).branch)
        .collect()
}

/// 未指定五行时检查全部四局
fn frames(element: Option<Element>) -> impl Iterator<Item = Element> {
    let all = [Element::Water, Element::Wood, Element::Fire, Element::Metal];
    let filter = element;
    all.into_iter()
        .filter(move |e| filter.is_none_or(|f| f == *e))
        .chain(element.filter(|e| *e == Element::Earth))
}

/// 以日柱所在旬判断空亡
fn is_void(fact: &FactRecord, branch: Branch) -> bool {
    fact.ganzhi(PillarPosition::Day)
        .void_branches()
        .contains(&branch)
}
