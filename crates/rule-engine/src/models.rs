//! 规则引擎领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 规则存储中的原始行
///
/// 条件与内容以 JSON 保存，由编译器解析为执行结构。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub code: String,
    pub name: String,
    pub rule_type: String,
    pub priority: i32,
    pub conditions: Value,
    pub content: Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub version: i64,
}

fn default_enabled() -> bool {
    true
}

impl RuleRecord {
    pub fn new(
        code: impl Into<String>,
        rule_type: impl Into<String>,
        priority: i32,
        conditions: Value,
        content: Value,
    ) -> Self {
        let code = code.into();
        Self {
            name: code.clone(),
            code,
            rule_type: rule_type.into(),
            priority,
            conditions,
            content,
            enabled: true,
            version: 1,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// 内容规格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSpec {
    /// 静态内容，原样返回
    Static {
        #[serde(default)]
        items: Vec<Value>,
    },
    /// 动态内容，由注册的适配器按事实记录计算
    Dynamic {
        adapter: String,
        method: String,
        #[serde(default)]
        default: Value,
    },
}

impl ContentSpec {
    pub fn static_items(items: Vec<Value>) -> Self {
        Self::Static { items }
    }
}

/// 规则集 / 内容版本戳
///
/// 缓存条目只在写入时的版本戳与当前生效版本一致时可信。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionStamp {
    pub rule_version: i64,
    pub content_version: i64,
}

impl VersionStamp {
    pub fn new(rule_version: i64, content_version: i64) -> Self {
        Self {
            rule_version,
            content_version,
        }
    }
}

/// 匹配结果中的单条规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub code: String,
    pub name: String,
    pub rule_type: String,
    pub priority: i32,
    pub content: Value,
}

/// 规则重载结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadOutcome {
    pub reloaded: bool,
    pub count_before: usize,
    pub count_after: usize,
}

/// 内容重载结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContentReloadOutcome {
    pub invalidated_cache_entries: usize,
}

/// 缓存条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<MatchedRule>,
    pub created_at: DateTime<Utc>,
    pub version_at_write: VersionStamp,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: Vec<MatchedRule>, stamp: VersionStamp) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: Utc::now(),
            version_at_write: stamp,
        }
    }

    pub fn is_current(&self, stamp: VersionStamp) -> bool {
        self.version_at_write == stamp
    }
}
