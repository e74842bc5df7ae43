//! 规则索引
//!
//! 按四柱干支、神煞和规则类型对规则分桶，匹配时先用事实记录产生的键
//! 取出候选，再交给评估器逐条求值。
//!
//! 正确性依赖见证键的性质：若规则条件对某事实为真，则该事实的键集合
//! 必然与规则的见证键相交。无法给出见证键的规则进入兜底桶，每次都参与评估。

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::compiler::CompiledRule;
use crate::condition::{ConditionNode, Predicate};
use crate::fact::FactRecord;
use crate::ganzhi::{Branch, PillarPosition, Stem};

/// 索引键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKey {
    Stem(PillarPosition, Stem),
    Branch(PillarPosition, Branch),
    Deity(String),
}

/// 计算条件树的见证键
///
/// - 叶子：可枚举的取值给出键，否则为 None
/// - `all`：取键数最少的有键子节点
/// - `any`：所有子节点都有键时取并集
/// - `not`：None
pub fn witness_keys(node: &ConditionNode) -> Option<BTreeSet<IndexKey>> {
    match node {
        ConditionNode::All(children) => children
            .iter()
            .filter_map(witness_keys)
            .min_by_key(BTreeSet::len),
        ConditionNode::Any(children) => {
            let mut union = BTreeSet::new();
            for child in children {
                union.extend(witness_keys(child)?);
            }
            Some(union)
        }
        ConditionNode::Not(_) => None,
        ConditionNode::Leaf(predicate) => predicate_keys(predicate),
    }
}

fn stem_everywhere(stem: Stem) -> BTreeSet<IndexKey> {
    PillarPosition::ALL
        .into_iter()
        .map(|p| IndexKey::Stem(p, stem))
        .collect()
}

fn branch_everywhere(branch: Branch) -> BTreeSet<IndexKey> {
    PillarPosition::ALL
        .into_iter()
        .map(|p| IndexKey::Branch(p, branch))
        .collect()
}

fn deity_key(deity: &str) -> BTreeSet<IndexKey> {
    BTreeSet::from([IndexKey::Deity(deity.to_string())])
}

fn predicate_keys(predicate: &Predicate) -> Option<BTreeSet<IndexKey>> {
    use Predicate as P;

    let keys = match predicate {
        P::PillarEquals {
            pillar,
            stem,
            branch,
        } => match (stem, branch) {
            (Some(s), _) => BTreeSet::from([IndexKey::Stem(*pillar, *s)]),
            (None, Some(b)) => BTreeSet::from([IndexKey::Branch(*pillar, *b)]),
            (None, None) => return None,
        },
        P::PillarIn { pillar, values } => values
            .iter()
            .map(|gz| IndexKey::Stem(*pillar, gz.stem))
            .collect(),
        P::StemIn { pillar, values } => values.iter().map(|s| IndexKey::Stem(*pillar, *s)).collect(),
        P::BranchIn { pillar, values } => values
            .iter()
            .map(|b| IndexKey::Branch(*pillar, *b))
            .collect(),
        P::DayStem(values) => values
            .iter()
            .map(|s| IndexKey::Stem(PillarPosition::Day, *s))
            .collect(),
        P::GanZhiPresent(gz) => stem_everywhere(gz.stem),
        P::StemPresent(stem) => stem_everywhere(*stem),
        P::BranchPresent(branch) => branch_everywhere(*branch),
        // 计数下界大于 0 时，该干支必然出现在原局某柱
        P::StemCount {
            stem,
            bounds,
            include_luck: false,
            include_annual: false,
        } if !bounds.contains(0.0) => stem_everywhere(*stem),
        P::BranchCount {
            branch,
            bounds,
            include_luck: false,
            include_annual: false,
        } if !bounds.contains(0.0) => branch_everywhere(*branch),
        P::StemCounts { counts, mode } => {
            let (stem, _) = counts.iter().find(|(_, n)| !mode.check(0, **n))?;
            stem_everywhere(*stem)
        }
        P::BranchCounts { counts, mode } => {
            let (branch, _) = counts.iter().find(|(_, n)| !mode.check(0, **n))?;
            branch_everywhere(*branch)
        }

        P::DeityInPillar { deity, .. } | P::DeityAny(deity) => deity_key(deity),
        P::DeityInPillars { deity, .. } => deity_key(deity),
        P::DeityCount { deity, bounds } if !bounds.contains(0.0) => deity_key(deity),
        P::DeitiesAll(deities) => deity_key(deities.first()?),
        P::DeitiesAny(deities) => deities
            .iter()
            .map(|d| IndexKey::Deity(d.clone()))
            .collect(),

        _ => return None,
    };

    Some(keys)
}

/// 事实记录产生的索引键：四柱的干、支各一个，加上全部神煞
pub fn fact_keys(fact: &FactRecord) -> Vec<IndexKey> {
    let mut keys = Vec::with_capacity(8);
    for (pos, pillar) in fact.pillars.iter() {
        keys.push(IndexKey::Stem(pos, pillar.stem));
        keys.push(IndexKey::Branch(pos, pillar.branch));
    }
    for (_, pillar) in fact.pillars.iter() {
        for deity in &pillar.deities {
            keys.push(IndexKey::Deity(deity.clone()));
        }
    }
    keys
}

/// 索引统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub rules: usize,
    pub pillar_buckets: usize,
    pub deity_buckets: usize,
    pub types: usize,
    pub catch_all: usize,
}

/// 不可变规则索引
///
/// 构建完成后只读，通过 `Arc` 在匹配任务之间共享。
#[derive(Debug, Default)]
pub struct RuleIndex {
    rules: Vec<Arc<CompiledRule>>,
    by_pillar_value: HashMap<IndexKey, Vec<usize>>,
    by_deity: HashMap<String, Vec<usize>>,
    by_type: HashMap<String, Vec<usize>>,
    catch_all: Vec<usize>,
}

impl RuleIndex {
    /// 构建索引
    pub fn build(rules: Vec<CompiledRule>) -> Self {
        let mut index = Self {
            rules: Vec::with_capacity(rules.len()),
            ..Default::default()
        };

        for (i, rule) in rules.into_iter().enumerate() {
            index
                .by_type
                .entry(rule.rule_type.clone())
                .or_default()
                .push(i);

            match &rule.index_keys {
                Some(keys) => {
                    for key in keys {
                        match key {
                            IndexKey::Deity(name) => {
                                index.by_deity.entry(name.clone()).or_default().push(i)
                            }
                            other => index
                                .by_pillar_value
                                .entry(other.clone())
                                .or_default()
                                .push(i),
                        }
                    }
                }
                None => index.catch_all.push(i),
            }

            index.rules.push(Arc::new(rule));
        }

        index
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Arc<CompiledRule>] {
        &self.rules
    }

    pub fn get(&self, code: &str) -> Option<&Arc<CompiledRule>> {
        self.rules.iter().find(|r| r.code == code)
    }

    pub fn has_type(&self, rule_type: &str) -> bool {
        self.by_type.contains_key(rule_type)
    }

    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.by_type.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            rules: self.rules.len(),
            pillar_buckets: self.by_pillar_value.len(),
            deity_buckets: self.by_deity.len(),
            types: self.by_type.len(),
            catch_all: self.catch_all.len(),
        }
    }

    /// 取候选规则
    ///
    /// 候选 = (事实键命中的桶 ∪ 兜底桶) ∩ 类型过滤，按索引顺序返回。
    /// 指定了过滤类型但没有一个是已知类型时返回空。
    pub fn shortlist(&self, fact: &FactRecord, filter: Option<&[String]>) -> Vec<Arc<CompiledRule>> {
        let allowed: Option<HashSet<usize>> = match filter {
            Some(types) if !types.is_empty() => {
                let allowed: HashSet<usize> = types
                    .iter()
                    .filter_map(|t| self.by_type.get(t))
                    .flatten()
                    .copied()
                    .collect();
                if allowed.is_empty() {
                    return Vec::new();
                }
                Some(allowed)
            }
            _ => None,
        };

        let mut hits: BTreeSet<usize> = self.catch_all.iter().copied().collect();
        for key in fact_keys(fact) {
            let bucket = match &key {
                IndexKey::Deity(name) => self.by_deity.get(name),
                other => self.by_pillar_value.get(other),
            };
            if let Some(bucket) = bucket {
                hits.extend(bucket.iter().copied());
            }
        }

        hits.into_iter()
            .filter(|i| allowed.as_ref().is_none_or(|a| a.contains(i)))
            .map(|i| Arc::clone(&self.rules[i]))
            .collect()
    }
}
