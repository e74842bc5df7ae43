//! 内容解析
//!
//! 静态内容原样返回；动态内容按规则声明的适配器名和方法名从注册表中
//! 查找适配器计算。适配器缺失、方法未知、返回错误、发生 panic 或返回
//! null 时，一律回退到规则声明的默认内容。

use dashmap::DashMap;
use natal_shared::observability::metrics as natal_metrics;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::compiler::CompiledRule;
use crate::error::{Result, RuleError};
use crate::fact::FactRecord;
use crate::ganzhi::{Gender, PillarPosition};
use crate::models::ContentSpec;

/// 适配器错误
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("未知方法: {0}")]
    UnknownMethod(String),

    #[error("缺少数据: {0}")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

/// 动态内容适配器
pub trait ContentAdapter: Send + Sync {
    /// 按方法名计算内容
    fn resolve(&self, method: &str, fact: &FactRecord) -> std::result::Result<Value, AdapterError>;

    /// 结果缓存键，只包含该方法实际依赖的事实字段；None 表示不缓存
    fn cache_key(&self, _method: &str, _fact: &FactRecord) -> Option<String> {
        None
    }
}

/// 适配器注册表
#[derive(Default)]
pub struct ContentAdapterRegistry {
    adapters: DashMap<String, Arc<dyn ContentAdapter>>,
}

impl ContentAdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册适配器，同名覆盖
    pub fn register(&self, name: impl Into<String>, adapter: Arc<dyn ContentAdapter>) {
        let name = name.into();
        if self.adapters.insert(name.clone(), adapter).is_some() {
            info!(adapter = %name, "内容适配器已替换");
        } else {
            info!(adapter = %name, "内容适配器已注册");
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.adapters.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ContentAdapter>> {
        self.adapters.get(name).map(|a| Arc::clone(a.value()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// 回退原因（同时作为指标标签）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FallbackReason {
    MissingAdapter,
    AdapterError,
    Panic,
    NullResult,
}

impl FallbackReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::MissingAdapter => "missing_adapter",
            Self::AdapterError => "adapter_error",
            Self::Panic => "panic",
            Self::NullResult => "null_result",
        }
    }
}

/// 内容解析器
pub struct ContentResolver {
    registry: Arc<ContentAdapterRegistry>,
    /// (适配器, 方法, 缓存键) → (内容版本, 结果)
    results: DashMap<(String, String, String), (i64, Value)>,
    capacity: usize,
}

impl ContentResolver {
    pub fn new(registry: Arc<ContentAdapterRegistry>, capacity: usize) -> Self {
        Self {
            registry,
            results: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<ContentAdapterRegistry> {
        &self.registry
    }

    /// 解析规则内容，永不失败
    pub fn resolve(&self, rule: &CompiledRule, fact: &FactRecord, content_version: i64) -> Value {
        match &rule.content {
            ContentSpec::Static { items } => Value::Array(items.clone()),
            ContentSpec::Dynamic {
                adapter,
                method,
                default,
            } => match self.resolve_dynamic(adapter, method, fact, content_version) {
                Ok(value) => value,
                Err((reason, detail)) => {
                    warn!(
                        code = %rule.code,
                        adapter = %adapter,
                        method = %method,
                        reason = reason.as_str(),
                        detail = %detail,
                        "动态内容解析失败，使用默认内容"
                    );
                    natal_metrics::record_adapter_fallback(adapter, reason.as_str());
                    default.clone()
                }
            },
        }
    }

    fn resolve_dynamic(
        &self,
        name: &str,
        method: &str,
        fact: &FactRecord,
        content_version: i64,
    ) -> std::result::Result<Value, (FallbackReason, String)> {
        let adapter = self
            .registry
            .get(name)
            .ok_or_else(|| (FallbackReason::MissingAdapter, format!("未注册的适配器: {}", name)))?;

        let cache_key = adapter
            .cache_key(method, fact)
            .map(|key| (name.to_string(), method.to_string(), key));

        if let Some(key) = &cache_key {
            if let Some(entry) = self.results.get(key) {
                let (version, value) = entry.value();
                if *version == content_version {
                    debug!(adapter = %name, method = %method, "适配器结果缓存命中");
                    return Ok(value.clone());
                }
            }
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| adapter.resolve(method, fact)));
        let value = match outcome {
            Ok(Ok(Value::Null)) => {
                return Err((FallbackReason::NullResult, "适配器返回 null".to_string()));
            }
            Ok(Ok(value)) => value,
            Ok(Err(e)) => return Err((FallbackReason::AdapterError, e.to_string())),
            Err(_) => return Err((FallbackReason::Panic, "适配器发生 panic".to_string())),
        };

        if let Some(key) = cache_key {
            if self.results.len() >= self.capacity {
                self.results.clear();
            }
            self.results.insert(key, (content_version, value.clone()));
        }

        Ok(value)
    }

    /// 清空适配器结果缓存，返回清除的条目数
    pub fn clear_cache(&self) -> usize {
        let count = self.results.len();
        self.results.clear();
        count
    }

    pub fn cached_results(&self) -> usize {
        self.results.len()
    }
}

// ==================== 内置适配器 ====================

/// 日柱论断条目
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NarrativeEntry {
    #[serde(default)]
    pub male: Option<String>,
    #[serde(default)]
    pub female: Option<String>,
    /// 不区分性别的通用论断
    #[serde(default)]
    pub common: Option<String>,
}

impl NarrativeEntry {
    fn for_gender(&self, gender: Gender) -> Option<&str> {
        let specific = match gender {
            Gender::Male => self.male.as_deref(),
            Gender::Female => self.female.as_deref(),
        };
        specific.or(self.common.as_deref())
    }
}

/// 日柱论断适配器
///
/// 以日柱干支为键查表，按性别取论断文本。支持两个方法：
/// `day_pillar_narrative`（查表）和 `day_pillar_nayin`（纳音，不依赖表）。
#[derive(Debug, Default)]
pub struct DayPillarNarrativeAdapter {
    table: HashMap<String, NarrativeEntry>,
}

impl DayPillarNarrativeAdapter {
    pub const NAME: &'static str = "DayPillarNarrative";

    pub fn new(table: HashMap<String, NarrativeEntry>) -> Self {
        Self { table }
    }

    /// 从 JSON 文件加载论断表
    ///
    /// 文件格式：`{"甲子": {"male": "...", "female": "...", "common": "..."}}`
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| RuleError::AdapterFailure {
            adapter: Self::NAME.to_string(),
            reason: format!("读取 {} 失败: {}", path.display(), e),
        })?;
        let table: HashMap<String, NarrativeEntry> = serde_json::from_str(&raw)?;
        info!(path = %path.display(), entries = table.len(), "日柱论断表已加载");
        Ok(Self::new(table))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl ContentAdapter for DayPillarNarrativeAdapter {
    fn resolve(&self, method: &str, fact: &FactRecord) -> std::result::Result<Value, AdapterError> {
        let day = fact.ganzhi(PillarPosition::Day).to_string();
        match method {
            "day_pillar_narrative" => {
                let text = self
                    .table
                    .get(&day)
                    .and_then(|entry| entry.for_gender(fact.gender))
                    .ok_or_else(|| AdapterError::NotFound(format!("日柱 {} 无论断", day)))?;
                Ok(json!([{"type": "text", "day_pillar": day, "text": text}]))
            }
            "day_pillar_nayin" => Ok(json!([{
                "type": "text",
                "day_pillar": day,
                "text": fact.nayin(PillarPosition::Day),
            }])),
            other => Err(AdapterError::UnknownMethod(other.to_string())),
        }
    }

    fn cache_key(&self, method: &str, fact: &FactRecord) -> Option<String> {
        let day = fact.ganzhi(PillarPosition::Day);
        match method {
            "day_pillar_narrative" => Some(format!("{}:{}", day, fact.gender)),
            "day_pillar_nayin" => Some(day.to_string()),
            _ => None,
        }
    }
}
