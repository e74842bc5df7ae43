//! 条件操作符定义
//!
//! 干支关系、数值区间和计数模式，供条件树的叶子谓词复用。

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ganzhi::GanZhi;

/// 两柱之间的关系
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    // 地支关系
    #[serde(alias = "冲")]
    Clash,
    #[serde(alias = "合", alias = "六合")]
    Combine,
    #[serde(alias = "害")]
    Harm,
    #[serde(alias = "刑")]
    Punish,
    #[serde(alias = "破")]
    Break,
    #[serde(alias = "半合")]
    HalfCombine,
    Same,

    // 天干关系
    #[serde(alias = "干合")]
    StemCombine,
    #[serde(alias = "干冲")]
    StemClash,
    SameStem,
}

impl Relation {
    /// 判断两柱是否满足该关系
    pub fn holds(self, a: GanZhi, b: GanZhi) -> bool {
        match self {
            Self::Clash => a.branch.clashes_with(b.branch),
            Self::Combine => a.branch.combines_with(b.branch),
            Self::Harm => a.branch.harms(b.branch),
            Self::Punish => a.branch.punishes(b.branch),
            Self::Break => a.branch.breaks(b.branch),
            Self::HalfCombine => a.branch.half_combines_with(b.branch),
            Self::Same => a.branch == b.branch,
            Self::StemCombine => a.stem.combines_with(b.stem),
            Self::StemClash => a.stem.clashes_with(b.stem),
            Self::SameStem => a.stem == b.stem,
        }
    }

    pub fn is_stem_relation(self) -> bool {
        matches!(self, Self::StemCombine | Self::StemClash | Self::SameStem)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Clash => "clash",
            Self::Combine => "combine",
            Self::Harm => "harm",
            Self::Punish => "punish",
            Self::Break => "break",
            Self::HalfCombine => "half_combine",
            Self::Same => "same",
            Self::StemCombine => "stem_combine",
            Self::StemClash => "stem_clash",
            Self::SameStem => "same_stem",
        };
        write!(f, "{}", s)
    }
}

/// 数值区间，所有边界均为闭区间
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub eq: Option<f64>,
}

impl Bounds {
    pub fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            ..Default::default()
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        if let Some(eq) = self.eq {
            if (value - eq).abs() >= f64::EPSILON {
                return false;
            }
        }
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    /// 区间为空（min > max）时规则无意义
    pub fn is_valid(&self) -> bool {
        match (self.min, self.max) {
            (Some(min), Some(max)) => min <= max,
            _ => true,
        }
    }
}

/// 精确计数模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMode {
    #[default]
    Eq,
    Min,
    Max,
}

impl CountMode {
    pub fn check(self, actual: u32, expected: u32) -> bool {
        match self {
            Self::Eq => actual == expected,
            Self::Min => actual >= expected,
            Self::Max => actual <= expected,
        }
    }
}

/// 十神在柱中的查找范围
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenGodScope {
    Stem,
    Hidden,
    #[default]
    Any,
}
