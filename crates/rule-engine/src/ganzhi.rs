//! 干支基础知识
//!
//! 天干、地支、五行、阴阳、十神、十二长生等原语，以及条件评估所依赖的
//! 刑冲合害破、三合三会、空亡等关系表。全部为纯函数，不依赖事实记录。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RuleError;

// ==================== 五行 / 阴阳 ====================

/// 五行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Element {
    #[serde(rename = "木", alias = "wood")]
    Wood,
    #[serde(rename = "火", alias = "fire")]
    Fire,
    #[serde(rename = "土", alias = "earth")]
    Earth,
    #[serde(rename = "金", alias = "metal")]
    Metal,
    #[serde(rename = "水", alias = "water")]
    Water,
}

impl Element {
    pub const ALL: [Element; 5] = [
        Element::Wood,
        Element::Fire,
        Element::Earth,
        Element::Metal,
        Element::Water,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// 我生者
    pub fn generates(self) -> Element {
        Self::ALL[(self.index() + 1) % 5]
    }

    /// 我克者
    pub fn controls(self) -> Element {
        Self::ALL[(self.index() + 2) % 5]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wood => "木",
            Self::Fire => "火",
            Self::Earth => "土",
            Self::Metal => "金",
            Self::Water => "水",
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Element {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "木" | "wood" => Ok(Self::Wood),
            "火" | "fire" => Ok(Self::Fire),
            "土" | "earth" => Ok(Self::Earth),
            "金" | "metal" => Ok(Self::Metal),
            "水" | "water" => Ok(Self::Water),
            _ => Err(RuleError::InvalidValue(format!("未知五行: {}", s))),
        }
    }
}

/// 阴阳
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum YinYang {
    #[serde(rename = "yang", alias = "阳")]
    Yang,
    #[serde(rename = "yin", alias = "阴")]
    Yin,
}

// ==================== 天干 ====================

/// 天干
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stem {
    #[serde(rename = "甲")]
    Jia,
    #[serde(rename = "乙")]
    Yi,
    #[serde(rename = "丙")]
    Bing,
    #[serde(rename = "丁")]
    Ding,
    #[serde(rename = "戊")]
    Wu,
    #[serde(rename = "己")]
    Ji,
    #[serde(rename = "庚")]
    Geng,
    #[serde(rename = "辛")]
    Xin,
    #[serde(rename = "壬")]
    Ren,
    #[serde(rename = "癸")]
    Gui,
}

impl Stem {
    pub const ALL: [Stem; 10] = [
        Stem::Jia,
        Stem::Yi,
        Stem::Bing,
        Stem::Ding,
        Stem::Wu,
        Stem::Ji,
        Stem::Geng,
        Stem::Xin,
        Stem::Ren,
        Stem::Gui,
    ];

    const CHARS: [&'static str; 10] = ["甲", "乙", "丙", "丁", "戊", "己", "庚", "辛", "壬", "癸"];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Stem {
        Self::ALL[i % 10]
    }

    pub fn as_str(self) -> &'static str {
        Self::CHARS[self.index()]
    }

    pub fn element(self) -> Element {
        Element::ALL[self.index() / 2]
    }

    pub fn yin_yang(self) -> YinYang {
        if self.index() % 2 == 0 {
            YinYang::Yang
        } else {
            YinYang::Yin
        }
    }

    /// 天干五合：甲己、乙庚、丙辛、丁壬、戊癸
    pub fn combines_with(self, other: Stem) -> bool {
        (self.index() + 5) % 10 == other.index()
    }

    /// 天干相冲：甲庚、乙辛、丙壬、丁癸
    pub fn clashes_with(self, other: Stem) -> bool {
        let (a, b) = (self.index().min(other.index()), self.index().max(other.index()));
        b - a == 6 && a < 4
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stem {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::CHARS
            .iter()
            .position(|c| *c == s)
            .map(Self::from_index)
            .ok_or_else(|| RuleError::InvalidValue(format!("未知天干: {}", s)))
    }
}

// ==================== 地支 ====================

/// 地支
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Branch {
    #[serde(rename = "子")]
    Zi,
    #[serde(rename = "丑")]
    Chou,
    #[serde(rename = "寅")]
    Yin,
    #[serde(rename = "卯")]
    Mao,
    #[serde(rename = "辰")]
    Chen,
    #[serde(rename = "巳")]
    Si,
    #[serde(rename = "午")]
    Wu,
    #[serde(rename = "未")]
    Wei,
    #[serde(rename = "申")]
    Shen,
    #[serde(rename = "酉")]
    You,
    #[serde(rename = "戌")]
    Xu,
    #[serde(rename = "亥")]
    Hai,
}

/// 季节（按月支划分）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    #[serde(alias = "春")]
    Spring,
    #[serde(alias = "夏")]
    Summer,
    #[serde(alias = "秋")]
    Autumn,
    #[serde(alias = "冬")]
    Winter,
}

impl Branch {
    pub const ALL: [Branch; 12] = [
        Branch::Zi,
        Branch::Chou,
        Branch::Yin,
        Branch::Mao,
        Branch::Chen,
        Branch::Si,
        Branch::Wu,
        Branch::Wei,
        Branch::Shen,
        Branch::You,
        Branch::Xu,
        Branch::Hai,
    ];

    const CHARS: [&'static str; 12] = [
        "子", "丑", "寅", "卯", "辰", "巳", "午", "未", "申", "酉", "戌", "亥",
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Branch {
        Self::ALL[i % 12]
    }

    pub fn as_str(self) -> &'static str {
        Self::CHARS[self.index()]
    }

    /// 地支本气五行
    pub fn element(self) -> Element {
        match self {
            Self::Yin | Self::Mao => Element::Wood,
            Self::Si | Self::Wu => Element::Fire,
            Self::Shen | Self::You => Element::Metal,
            Self::Hai | Self::Zi => Element::Water,
            Self::Chen | Self::Xu | Self::Chou | Self::Wei => Element::Earth,
        }
    }

    pub fn yin_yang(self) -> YinYang {
        if self.index() % 2 == 0 {
            YinYang::Yang
        } else {
            YinYang::Yin
        }
    }

    /// 地支藏干（本气在前）
    pub fn hidden_stems(self) -> &'static [Stem] {
        use Stem::*;
        match self {
            Self::Zi => &[Gui],
            Self::Chou => &[Ji, Gui, Xin],
            Self::Yin => &[Jia, Bing, Wu],
            Self::Mao => &[Yi],
            Self::Chen => &[Wu, Yi, Gui],
            Self::Si => &[Bing, Geng, Wu],
            Self::Wu => &[Ding, Ji],
            Self::Wei => &[Ji, Ding, Yi],
            Self::Shen => &[Geng, Ren, Wu],
            Self::You => &[Xin],
            Self::Xu => &[Wu, Xin, Ding],
            Self::Hai => &[Ren, Jia],
        }
    }

    /// 六冲
    pub fn clashes_with(self, other: Branch) -> bool {
        (self.index() + 6) % 12 == other.index()
    }

    /// 六合
    pub fn combines_with(self, other: Branch) -> bool {
        (self.index() + other.index()) % 12 == 1
    }

    /// 六害
    pub fn harms(self, other: Branch) -> bool {
        (self.index() + other.index()) % 12 == 7
    }

    /// 六破：子酉、卯午、辰丑、未戌、寅亥、巳申
    pub fn breaks(self, other: Branch) -> bool {
        use Branch::*;
        matches!(
            (self, other),
            (Zi, You) | (You, Zi)
                | (Mao, Wu) | (Wu, Mao)
                | (Chen, Chou) | (Chou, Chen)
                | (Wei, Xu) | (Xu, Wei)
                | (Yin, Hai) | (Hai, Yin)
                | (Si, Shen) | (Shen, Si)
        )
    }

    /// 相刑：子卯无礼之刑、寅巳申无恩之刑、丑戌未恃势之刑、辰午酉亥自刑
    pub fn punishes(self, other: Branch) -> bool {
        use Branch::*;
        if self == other {
            return self.is_self_punishing();
        }
        matches!(
            (self, other),
            (Zi, Mao) | (Mao, Zi)
                | (Yin, Si) | (Si, Shen) | (Shen, Yin)
                | (Si, Yin) | (Shen, Si) | (Yin, Shen)
                | (Chou, Xu) | (Xu, Wei) | (Wei, Chou)
                | (Xu, Chou) | (Wei, Xu) | (Chou, Wei)
        )
    }

    pub fn is_self_punishing(self) -> bool {
        matches!(self, Self::Chen | Self::Wu | Self::You | Self::Hai)
    }

    /// 所属三合局的五行：申子辰水、亥卯未木、寅午戌火、巳酉丑金
    pub fn harmony_frame(self) -> Element {
        match self.index() % 4 {
            0 => Element::Water,
            1 => Element::Metal,
            2 => Element::Fire,
            _ => Element::Wood,
        }
    }

    /// 三合局中的旺支（子午卯酉）
    pub fn is_frame_center(self) -> bool {
        self.index() % 3 == 0
    }

    /// 半合：同局两支且其中一支为旺支
    pub fn half_combines_with(self, other: Branch) -> bool {
        self != other
            && self.harmony_frame() == other.harmony_frame()
            && (self.is_frame_center() || other.is_frame_center())
    }

    /// 所属三会方的五行：寅卯辰木、巳午未火、申酉戌金、亥子丑水
    pub fn meeting_direction(self) -> Element {
        match ((self.index() + 10) % 12) / 3 {
            0 => Element::Wood,
            1 => Element::Fire,
            2 => Element::Metal,
            _ => Element::Water,
        }
    }

    pub fn season(self) -> Season {
        match ((self.index() + 10) % 12) / 3 {
            0 => Season::Spring,
            1 => Season::Summer,
            2 => Season::Autumn,
            _ => Season::Winter,
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Branch {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::CHARS
            .iter()
            .position(|c| *c == s)
            .map(Self::from_index)
            .ok_or_else(|| RuleError::InvalidValue(format!("未知地支: {}", s)))
    }
}

/// 三合局的三支（生、旺、墓）
pub fn harmony_branches(element: Element) -> [Branch; 3] {
    use Branch::*;
    match element {
        Element::Water => [Shen, Zi, Chen],
        Element::Wood => [Hai, Mao, Wei],
        Element::Fire => [Yin, Wu, Xu],
        Element::Metal => [Si, You, Chou],
        Element::Earth => [Chen, Xu, Chou],
    }
}

/// 三会方的三支
pub fn meeting_branches(element: Element) -> [Branch; 3] {
    use Branch::*;
    match element {
        Element::Wood => [Yin, Mao, Chen],
        Element::Fire => [Si, Wu, Wei],
        Element::Metal => [Shen, You, Xu],
        Element::Water => [Hai, Zi, Chou],
        Element::Earth => [Chen, Xu, Chou],
    }
}

// ==================== 干支组合 ====================

/// 干支对（柱）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GanZhi {
    pub stem: Stem,
    pub branch: Branch,
}

impl GanZhi {
    pub fn new(stem: Stem, branch: Branch) -> Self {
        Self { stem, branch }
    }

    /// 构造并校验阴阳：阳干配阳支，阴干配阴支
    pub fn try_new(stem: Stem, branch: Branch) -> Result<Self, RuleError> {
        if stem.index() % 2 != branch.index() % 2 {
            return Err(RuleError::InvalidValue(format!(
                "阴阳不配的干支: {}{}",
                stem, branch
            )));
        }
        Ok(Self { stem, branch })
    }

    /// 所在旬的两个空亡地支
    pub fn void_branches(&self) -> [Branch; 2] {
        let xun_start = (self.branch.index() + 12 - self.stem.index()) % 12;
        [
            Branch::from_index(xun_start + 10),
            Branch::from_index(xun_start + 11),
        ]
    }

    /// 六十甲子序号（甲子为 0）
    pub fn cycle_index(&self) -> usize {
        (6 * self.stem.index() + 60 - 5 * self.branch.index()) % 60
    }

    /// 纳音五行
    pub fn nayin(&self) -> &'static str {
        NAYIN[self.cycle_index() / 2]
    }
}

const NAYIN: [&str; 30] = [
    "海中金", "炉中火", "大林木", "路旁土", "剑锋金", "山头火", "涧下水", "城头土", "白蜡金", "杨柳木",
    "泉中水", "屋上土", "霹雳火", "松柏木", "长流水", "砂中金", "山下火", "平地木", "壁上土", "金箔金",
    "覆灯火", "天河水", "大驿土", "钗钏金", "桑柘木", "大溪水", "沙中土", "天上火", "石榴木", "大海水",
];

impl fmt::Display for GanZhi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.stem, self.branch)
    }
}

impl FromStr for GanZhi {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let (Some(stem), Some(branch), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(RuleError::InvalidValue(format!("干支必须为两个字符: {}", s)));
        };
        let stem: Stem = stem.to_string().parse()?;
        let branch: Branch = branch.to_string().parse()?;
        Self::try_new(stem, branch)
    }
}

impl TryFrom<String> for GanZhi {
    type Error = RuleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GanZhi> for String {
    fn from(value: GanZhi) -> Self {
        value.to_string()
    }
}

// ==================== 四柱位置 ====================

/// 四柱位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PillarPosition {
    #[serde(alias = "年", alias = "年柱")]
    Year,
    #[serde(alias = "月", alias = "月柱")]
    Month,
    #[serde(alias = "日", alias = "日柱")]
    Day,
    #[serde(alias = "时", alias = "时柱")]
    Hour,
}

impl PillarPosition {
    pub const ALL: [PillarPosition; 4] = [
        PillarPosition::Year,
        PillarPosition::Month,
        PillarPosition::Day,
        PillarPosition::Hour,
    ];
}

impl fmt::Display for PillarPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
        };
        f.write_str(s)
    }
}

/// 性别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[serde(alias = "男", alias = "M", alias = "m")]
    Male,
    #[serde(alias = "女", alias = "F", alias = "f")]
    Female,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Male => f.write_str("male"),
            Self::Female => f.write_str("female"),
        }
    }
}

// ==================== 十神 ====================

/// 十神
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TenGod {
    #[serde(rename = "比肩")]
    Companion,
    #[serde(rename = "劫财")]
    RobWealth,
    #[serde(rename = "食神")]
    EatingGod,
    #[serde(rename = "伤官")]
    HurtingOfficer,
    #[serde(rename = "偏财")]
    IndirectWealth,
    #[serde(rename = "正财")]
    DirectWealth,
    #[serde(rename = "七杀", alias = "偏官")]
    SevenKillings,
    #[serde(rename = "正官")]
    DirectOfficer,
    #[serde(rename = "偏印", alias = "枭神")]
    IndirectResource,
    #[serde(rename = "正印")]
    DirectResource,
}

impl TenGod {
    /// 以日干为我，求另一天干的十神
    pub fn of(day_stem: Stem, other: Stem) -> TenGod {
        let me = day_stem.element();
        let it = other.element();
        let same_polarity = day_stem.yin_yang() == other.yin_yang();
        let pick = |same: TenGod, diff: TenGod| if same_polarity { same } else { diff };

        if me == it {
            pick(Self::Companion, Self::RobWealth)
        } else if me.generates() == it {
            pick(Self::EatingGod, Self::HurtingOfficer)
        } else if me.controls() == it {
            pick(Self::IndirectWealth, Self::DirectWealth)
        } else if it.controls() == me {
            pick(Self::SevenKillings, Self::DirectOfficer)
        } else {
            pick(Self::IndirectResource, Self::DirectResource)
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Companion => "比肩",
            Self::RobWealth => "劫财",
            Self::EatingGod => "食神",
            Self::HurtingOfficer => "伤官",
            Self::IndirectWealth => "偏财",
            Self::DirectWealth => "正财",
            Self::SevenKillings => "七杀",
            Self::DirectOfficer => "正官",
            Self::IndirectResource => "偏印",
            Self::DirectResource => "正印",
        }
    }
}

impl fmt::Display for TenGod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenGod {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| RuleError::InvalidValue(format!("未知十神: {}", s)))
    }
}

// ==================== 十二长生 ====================

/// 十二长生
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifeStage {
    #[serde(rename = "长生")]
    Birth,
    #[serde(rename = "沐浴")]
    Bath,
    #[serde(rename = "冠带")]
    Crown,
    #[serde(rename = "临官", alias = "建禄")]
    Office,
    #[serde(rename = "帝旺")]
    Peak,
    #[serde(rename = "衰")]
    Decline,
    #[serde(rename = "病")]
    Sickness,
    #[serde(rename = "死")]
    Death,
    #[serde(rename = "墓", alias = "库")]
    Tomb,
    #[serde(rename = "绝")]
    Extinction,
    #[serde(rename = "胎")]
    Conception,
    #[serde(rename = "养")]
    Nurture,
}

impl LifeStage {
    const ORDER: [LifeStage; 12] = [
        LifeStage::Birth,
        LifeStage::Bath,
        LifeStage::Crown,
        LifeStage::Office,
        LifeStage::Peak,
        LifeStage::Decline,
        LifeStage::Sickness,
        LifeStage::Death,
        LifeStage::Tomb,
        LifeStage::Extinction,
        LifeStage::Conception,
        LifeStage::Nurture,
    ];

    /// 日干在某地支的长生阶段（阳干顺行，阴干逆行）
    pub fn of(stem: Stem, branch: Branch) -> LifeStage {
        use Branch::*;
        let birth = match stem {
            Stem::Jia => Hai,
            Stem::Yi => Wu,
            Stem::Bing | Stem::Wu => Yin,
            Stem::Ding | Stem::Ji => You,
            Stem::Geng => Si,
            Stem::Xin => Zi,
            Stem::Ren => Shen,
            Stem::Gui => Mao,
        };
        let offset = match stem.yin_yang() {
            YinYang::Yang => (branch.index() + 12 - birth.index()) % 12,
            YinYang::Yin => (birth.index() + 12 - branch.index()) % 12,
        };
        Self::ORDER[offset]
    }
}

impl FromStr for LifeStage {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| RuleError::InvalidValue(format!("未知长生阶段: {}", s)))
    }
}
