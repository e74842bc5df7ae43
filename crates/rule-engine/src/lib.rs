//! 命理规则匹配引擎
//!
//! 根据排盘事实记录匹配规则库中的断语规则，支持：
//! - JSON 条件树解析（50 余种干支、十神、神煞谓词）
//! - 规则编译与倒排索引
//! - 有界线程池并行评估
//! - 静态 / 动态内容解析（适配器注册表）
//! - 进程内 + Redis 两级结果缓存
//! - 基于版本号轮询的热重载

pub mod cache;
pub mod compiler;
pub mod condition;
pub mod content;
pub mod error;
pub mod evaluator;
pub mod fact;
pub mod ganzhi;
pub mod index;
pub mod matcher;
pub mod models;
pub mod operators;
pub mod service;
pub mod store;
pub mod watcher;

pub use cache::{CacheStats, MatchCache, MatchCacheKey, RedisCacheBackend, SharedCacheBackend};
pub use compiler::{CompileReport, CompiledRule, RuleCompiler};
pub use condition::{ConditionNode, Predicate};
pub use content::{
    AdapterError, ContentAdapter, ContentAdapterRegistry, ContentResolver,
    DayPillarNarrativeAdapter, NarrativeEntry,
};
pub use error::{Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use fact::{AnnualPillar, FactRecord, FourPillars, LuckPillar, LunarDate, PillarFacts};
pub use ganzhi::{Branch, Element, GanZhi, Gender, LifeStage, PillarPosition, Stem, TenGod};
pub use index::{IndexKey, IndexStats, RuleIndex};
pub use matcher::ParallelMatcher;
pub use models::{
    CacheEntry, ContentReloadOutcome, ContentSpec, MatchedRule, ReloadOutcome, RuleRecord,
    VersionStamp,
};
pub use operators::{Bounds, CountMode, Relation, TenGodScope};
pub use service::{EngineSnapshot, PollOutcome, RuleMatchService};
pub use store::{InMemoryRuleRepository, PgRuleRepository, RuleRepository, MIGRATOR};
pub use watcher::{VersionWatcher, WatcherHandle};
