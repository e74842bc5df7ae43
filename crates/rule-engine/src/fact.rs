//! 命盘事实记录
//!
//! 由外部排盘服务计算并传入，本引擎只读。缺省的派生字段（藏干、十神、
//! 长生、五行计数等）在首次访问时按干支规则补全，并在记录生命周期内缓存。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{Result, RuleError};
use crate::ganzhi::{
    Branch, Element, GanZhi, Gender, LifeStage, PillarPosition, Stem, TenGod, YinYang,
};

/// 单柱事实
///
/// 反序列化时校验干支阴阳；`new` 直接构造不做校验，由调用方保证。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPillarFacts")]
pub struct PillarFacts {
    pub stem: Stem,
    pub branch: Branch,
    /// 藏干，缺省时按地支藏干表推导
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_stems: Option<Vec<Stem>>,
    /// 神煞标签
    #[serde(default)]
    pub deities: Vec<String>,
    /// 天干十神，缺省时按日干推导（日柱无）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ten_god: Option<TenGod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_ten_gods: Option<Vec<TenGod>>,
    /// 日干在本柱地支的长生阶段
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub life_stage: Option<LifeStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nayin: Option<String>,
}

#[derive(Deserialize)]
struct RawPillarFacts {
    stem: Stem,
    branch: Branch,
    #[serde(default)]
    hidden_stems: Option<Vec<Stem>>,
    #[serde(default)]
    deities: Vec<String>,
    #[serde(default)]
    ten_god: Option<TenGod>,
    #[serde(default)]
    hidden_ten_gods: Option<Vec<TenGod>>,
    #[serde(default)]
    life_stage: Option<LifeStage>,
    #[serde(default)]
    nayin: Option<String>,
}

impl TryFrom<RawPillarFacts> for PillarFacts {
    type Error = RuleError;

    fn try_from(raw: RawPillarFacts) -> Result<Self> {
        GanZhi::try_new(raw.stem, raw.branch)?;
        Ok(Self {
            stem: raw.stem,
            branch: raw.branch,
            hidden_stems: raw.hidden_stems,
            deities: raw.deities,
            ten_god: raw.ten_god,
            hidden_ten_gods: raw.hidden_ten_gods,
            life_stage: raw.life_stage,
            nayin: raw.nayin,
        })
    }
}

impl PillarFacts {
    pub fn new(stem: Stem, branch: Branch) -> Self {
        Self {
            stem,
            branch,
            hidden_stems: None,
            deities: Vec::new(),
            ten_god: None,
            hidden_ten_gods: None,
            life_stage: None,
            nayin: None,
        }
    }

    pub fn from_ganzhi(gz: GanZhi) -> Self {
        Self::new(gz.stem, gz.branch)
    }

    pub fn with_deities<I, S>(mut self, deities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deities = deities.into_iter().map(Into::into).collect();
        self
    }

    pub fn ganzhi(&self) -> GanZhi {
        GanZhi::new(self.stem, self.branch)
    }
}

/// 四柱
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FourPillars {
    pub year: PillarFacts,
    pub month: PillarFacts,
    pub day: PillarFacts,
    pub hour: PillarFacts,
}

impl FourPillars {
    /// 从四个干支字符串构建，如 `("庚午", "辛巳", "甲子", "丙寅")`
    pub fn parse(year: &str, month: &str, day: &str, hour: &str) -> Result<Self> {
        Ok(Self {
            year: PillarFacts::from_ganzhi(year.parse()?),
            month: PillarFacts::from_ganzhi(month.parse()?),
            day: PillarFacts::from_ganzhi(day.parse()?),
            hour: PillarFacts::from_ganzhi(hour.parse()?),
        })
    }

    pub fn get(&self, pos: PillarPosition) -> &PillarFacts {
        match pos {
            PillarPosition::Year => &self.year,
            PillarPosition::Month => &self.month,
            PillarPosition::Day => &self.day,
            PillarPosition::Hour => &self.hour,
        }
    }

    pub fn get_mut(&mut self, pos: PillarPosition) -> &mut PillarFacts {
        match pos {
            PillarPosition::Year => &mut self.year,
            PillarPosition::Month => &mut self.month,
            PillarPosition::Day => &mut self.day,
            PillarPosition::Hour => &mut self.hour,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (PillarPosition, &PillarFacts)> {
        PillarPosition::ALL.into_iter().map(move |pos| (pos, self.get(pos)))
    }
}

/// 农历日期
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LunarDate {
    #[serde(default)]
    pub year: Option<i32>,
    pub month: u32,
    pub day: u32,
    #[serde(default)]
    pub is_leap_month: bool,
}

/// 大运
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLuckPillar")]
pub struct LuckPillar {
    pub stem: Stem,
    pub branch: Branch,
    #[serde(default)]
    pub start_age: Option<u32>,
    #[serde(default)]
    pub end_age: Option<u32>,
    #[serde(default)]
    pub start_year: Option<i32>,
}

#[derive(Deserialize)]
struct RawLuckPillar {
    stem: Stem,
    branch: Branch,
    #[serde(default)]
    start_age: Option<u32>,
    #[serde(default)]
    end_age: Option<u32>,
    #[serde(default)]
    start_year: Option<i32>,
}

impl TryFrom<RawLuckPillar> for LuckPillar {
    type Error = RuleError;

    fn try_from(raw: RawLuckPillar) -> Result<Self> {
        GanZhi::try_new(raw.stem, raw.branch)?;
        Ok(Self {
            stem: raw.stem,
            branch: raw.branch,
            start_age: raw.start_age,
            end_age: raw.end_age,
            start_year: raw.start_year,
        })
    }
}

impl LuckPillar {
    pub fn ganzhi(&self) -> GanZhi {
        GanZhi::new(self.stem, self.branch)
    }

    fn covers_age(&self, age: u32) -> bool {
        match self.start_age {
            Some(start) => {
                let end = self.end_age.unwrap_or(start + 9);
                age >= start && age <= end
            }
            None => false,
        }
    }

    fn covers_year(&self, year: i32) -> bool {
        self.start_year
            .is_some_and(|start| year >= start && year < start + 10)
    }
}

/// 流年
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAnnualPillar")]
pub struct AnnualPillar {
    pub year: i32,
    pub stem: Stem,
    pub branch: Branch,
}

#[derive(Deserialize)]
struct RawAnnualPillar {
    year: i32,
    stem: Stem,
    branch: Branch,
}

impl TryFrom<RawAnnualPillar> for AnnualPillar {
    type Error = RuleError;

    fn try_from(raw: RawAnnualPillar) -> Result<Self> {
        GanZhi::try_new(raw.stem, raw.branch)?;
        Ok(Self {
            year: raw.year,
            stem: raw.stem,
            branch: raw.branch,
        })
    }
}

impl AnnualPillar {
    pub fn ganzhi(&self) -> GanZhi {
        GanZhi::new(self.stem, self.branch)
    }
}

/// 命盘事实记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactRecord {
    pub pillars: FourPillars,
    pub gender: Gender,
    #[serde(default)]
    pub lunar: Option<LunarDate>,
    /// 规范化后的出生时间（参与缓存键计算）
    #[serde(default)]
    pub birth_time: Option<String>,
    /// 十神总数，缺省时由四柱推导
    #[serde(default)]
    pub ten_god_counts: Option<BTreeMap<String, u32>>,
    /// 五行总数，缺省时按干支本气各计 1
    #[serde(default)]
    pub element_counts: Option<BTreeMap<Element, f64>>,
    #[serde(default)]
    pub day_master_strength: Option<String>,
    #[serde(default)]
    pub current_age: Option<u32>,
    #[serde(default)]
    pub luck_pillars: Vec<LuckPillar>,
    #[serde(default)]
    pub current_luck_index: Option<usize>,
    #[serde(default)]
    pub annual_pillars: Vec<AnnualPillar>,
    #[serde(default)]
    pub current_year: Option<i32>,
    #[serde(skip)]
    derived: OnceLock<DerivedFacts>,
}

/// 派生统计（首次访问时计算）
#[derive(Debug, Clone, Default)]
struct DerivedFacts {
    ten_god_counts: HashMap<TenGod, u32>,
    element_counts: [f64; 5],
    stem_counts: [u32; 10],
    branch_counts: [u32; 12],
    deity_counts: HashMap<String, u32>,
    yang_count: u32,
}

impl FactRecord {
    pub fn new(pillars: FourPillars, gender: Gender) -> Self {
        Self {
            pillars,
            gender,
            lunar: None,
            birth_time: None,
            ten_god_counts: None,
            element_counts: None,
            day_master_strength: None,
            current_age: None,
            luck_pillars: Vec::new(),
            current_luck_index: None,
            annual_pillars: Vec::new(),
            current_year: None,
            derived: OnceLock::new(),
        }
    }

    /// 从 JSON 字符串解析
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn pillar(&self, pos: PillarPosition) -> &PillarFacts {
        self.pillars.get(pos)
    }

    pub fn ganzhi(&self, pos: PillarPosition) -> GanZhi {
        self.pillar(pos).ganzhi()
    }

    pub fn day_stem(&self) -> Stem {
        self.pillars.day.stem
    }

    pub fn hidden_stems(&self, pos: PillarPosition) -> &[Stem] {
        let pillar = self.pillar(pos);
        match &pillar.hidden_stems {
            Some(stems) => stems.as_slice(),
            None => pillar.branch.hidden_stems(),
        }
    }

    /// 天干十神（日柱为日主本身，返回 None）
    pub fn stem_ten_god(&self, pos: PillarPosition) -> Option<TenGod> {
        if pos == PillarPosition::Day {
            return None;
        }
        let pillar = self.pillar(pos);
        Some(
            pillar
                .ten_god
                .unwrap_or_else(|| TenGod::of(self.day_stem(), pillar.stem)),
        )
    }

    pub fn hidden_ten_gods(&self, pos: PillarPosition) -> Vec<TenGod> {
        match &self.pillar(pos).hidden_ten_gods {
            Some(gods) => gods.clone(),
            None => self
                .hidden_stems(pos)
                .iter()
                .map(|s| TenGod::of(self.day_stem(), *s))
                .collect(),
        }
    }

    pub fn life_stage(&self, pos: PillarPosition) -> LifeStage {
        let pillar = self.pillar(pos);
        pillar
            .life_stage
            .unwrap_or_else(|| LifeStage::of(self.day_stem(), pillar.branch))
    }

    pub fn nayin(&self, pos: PillarPosition) -> &str {
        let pillar = self.pillar(pos);
        match &pillar.nayin {
            Some(n) => n.as_str(),
            None => pillar.ganzhi().nayin(),
        }
    }

    pub fn ten_god_count(&self, god: TenGod) -> u32 {
        self.derived().ten_god_counts.get(&god).copied().unwrap_or(0)
    }

    pub fn element_count(&self, element: Element) -> f64 {
        self.derived().element_counts[element.index()]
    }

    pub fn element_counts(&self) -> [f64; 5] {
        self.derived().element_counts
    }

    pub fn stem_count(&self, stem: Stem) -> u32 {
        self.derived().stem_counts[stem.index()]
    }

    pub fn branch_count(&self, branch: Branch) -> u32 {
        self.derived().branch_counts[branch.index()]
    }

    pub fn deity_count(&self, deity: &str) -> u32 {
        self.derived().deity_counts.get(deity).copied().unwrap_or(0)
    }

    pub fn has_deity(&self, deity: &str) -> bool {
        self.deity_count(deity) > 0
    }

    pub fn deity_in(&self, pos: PillarPosition, deity: &str) -> bool {
        self.pillar(pos).deities.iter().any(|d| d == deity)
    }

    /// 八字中阳性干支的个数
    pub fn yang_count(&self) -> u32 {
        self.derived().yang_count
    }

    /// 当前大运
    ///
    /// 优先使用显式索引，其次按当前年龄、当前年份定位。
    pub fn active_luck(&self) -> Option<&LuckPillar> {
        if let Some(i) = self.current_luck_index {
            return self.luck_pillars.get(i);
        }
        if let Some(age) = self.current_age {
            if let Some(p) = self.luck_pillars.iter().find(|p| p.covers_age(age)) {
                return Some(p);
            }
        }
        let year = self.current_year?;
        self.luck_pillars.iter().find(|p| p.covers_year(year))
    }

    /// 当前流年
    ///
    /// 按 current_year 定位；未指定年份时仅当序列只有一项才视为当前流年。
    pub fn active_annual(&self) -> Option<&AnnualPillar> {
        match self.current_year {
            Some(year) => self.annual_pillars.iter().find(|p| p.year == year),
            None if self.annual_pillars.len() == 1 => self.annual_pillars.first(),
            None => None,
        }
    }

    fn derived(&self) -> &DerivedFacts {
        self.derived.get_or_init(|| self.compute_derived())
    }

    fn compute_derived(&self) -> DerivedFacts {
        let mut derived = DerivedFacts::default();

        for (_, pillar) in self.pillars.iter() {
            derived.stem_counts[pillar.stem.index()] += 1;
            derived.branch_counts[pillar.branch.index()] += 1;
            if pillar.stem.yin_yang() == YinYang::Yang {
                derived.yang_count += 1;
            }
            if pillar.branch.yin_yang() == YinYang::Yang {
                derived.yang_count += 1;
            }
            for deity in &pillar.deities {
                *derived.deity_counts.entry(deity.clone()).or_insert(0) += 1;
            }
        }

        derived.ten_god_counts = match &self.ten_god_counts {
            Some(given) => {
                let mut counts = HashMap::new();
                for (name, count) in given {
                    match name.parse::<TenGod>() {
                        Ok(god) => *counts.entry(god).or_insert(0) += *count,
                        Err(_) => debug!(name = %name, "忽略无法识别的十神计数"),
                    }
                }
                counts
            }
            None => {
                let mut counts = HashMap::new();
                for pos in PillarPosition::ALL {
                    if let Some(god) = self.stem_ten_god(pos) {
                        *counts.entry(god).or_insert(0) += 1;
                    }
                    for god in self.hidden_ten_gods(pos) {
                        *counts.entry(god).or_insert(0) += 1;
                    }
                }
                counts
            }
        };

        derived.element_counts = match &self.element_counts {
            Some(given) => {
                let mut counts = [0.0; 5];
                for (element, value) in given {
                    counts[element.index()] = *value;
                }
                counts
            }
            None => {
                let mut counts = [0.0; 5];
                for (_, pillar) in self.pillars.iter() {
                    counts[pillar.stem.element().index()] += 1.0;
                    counts[pillar.branch.element().index()] += 1.0;
                }
                counts
            }
        };

        derived
    }
}

impl PartialEq for FactRecord {
    fn eq(&self, other: &Self) -> bool {
        self.pillars == other.pillars
            && self.gender == other.gender
            && self.lunar == other.lunar
            && self.birth_time == other.birth_time
            && self.ten_god_counts == other.ten_god_counts
            && self.element_counts == other.element_counts
            && self.day_master_strength == other.day_master_strength
            && self.current_age == other.current_age
            && self.luck_pillars == other.luck_pillars
            && self.current_luck_index == other.current_luck_index
            && self.annual_pillars == other.annual_pillars
            && self.current_year == other.current_year
    }
}
