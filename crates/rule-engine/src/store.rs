//! 规则存储
//!
//! 规则与版本计数器由上游维护，本引擎只读。`RuleRepository` 抽象读取方式：
//! 生产环境使用 PostgreSQL，测试与演示使用内存实现。

use async_trait::async_trait;
use natal_shared::database::Database;
use parking_lot::RwLock;
use sqlx::migrate::Migrator;
use tracing::{debug, instrument};

use crate::error::{Result, RuleError};
use crate::models::{RuleRecord, VersionStamp};

/// 规则表与版本计数器的建表脚本
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// 规则仓储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// 读取当前规则版本与内容版本
    async fn fetch_versions(&self) -> Result<VersionStamp>;

    /// 读取全部启用的规则
    async fn fetch_enabled_rules(&self) -> Result<Vec<RuleRecord>>;
}

// ==================== PostgreSQL ====================

/// 数据库规则行
#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    code: String,
    name: Option<String>,
    rule_type: String,
    priority: i32,
    conditions: serde_json::Value,
    content: serde_json::Value,
    enabled: bool,
    version: i64,
}

impl From<RuleRow> for RuleRecord {
    fn from(row: RuleRow) -> Self {
        Self {
            name: row.name.unwrap_or_else(|| row.code.clone()),
            code: row.code,
            rule_type: row.rule_type,
            priority: row.priority,
            conditions: row.conditions,
            content: row.content,
            enabled: row.enabled,
            version: row.version,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VersionRow {
    rule_version: i64,
    content_version: i64,
}

/// PostgreSQL 规则仓储
#[derive(Clone)]
pub struct PgRuleRepository {
    db: Database,
}

impl PgRuleRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RuleRepository for PgRuleRepository {
    #[instrument(skip(self))]
    async fn fetch_versions(&self) -> Result<VersionStamp> {
        let row = sqlx::query_as::<_, VersionRow>(
            r#"
            SELECT rule_version, content_version
            FROM natal_rule_versions
            WHERE id = 1
            "#,
        )
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| RuleError::StoreUnavailable("版本计数器不存在".to_string()))?;

        Ok(VersionStamp::new(row.rule_version, row.content_version))
    }

    #[instrument(skip(self))]
    async fn fetch_enabled_rules(&self) -> Result<Vec<RuleRecord>> {
        let rows = sqlx::query_as::<_, RuleRow>(
            r#"
            SELECT code, name, rule_type, priority, conditions, content, enabled, version
            FROM natal_rules
            WHERE enabled = TRUE
            ORDER BY code
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        debug!(count = rows.len(), "已读取启用的规则");
        Ok(rows.into_iter().map(RuleRecord::from).collect())
    }
}

// ==================== 内存实现 ====================

#[derive(Default)]
struct MemoryState {
    rules: Vec<RuleRecord>,
    versions: VersionStamp,
    unavailable: bool,
}

/// 内存规则仓储
///
/// 修改规则时自动递增规则版本；可模拟存储不可用。
#[derive(Default)]
pub struct InMemoryRuleRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<RuleRecord>) -> Self {
        let repo = Self::new();
        repo.replace_rules(rules);
        repo
    }

    /// 替换全部规则并递增规则版本
    pub fn replace_rules(&self, rules: Vec<RuleRecord>) {
        let mut state = self.state.write();
        state.rules = rules;
        state.versions.rule_version += 1;
    }

    /// 新增或更新一条规则（按编码）并递增规则版本
    pub fn upsert_rule(&self, rule: RuleRecord) {
        let mut state = self.state.write();
        match state.rules.iter().position(|r| r.code == rule.code) {
            Some(i) => state.rules[i] = rule,
            None => state.rules.push(rule),
        }
        state.versions.rule_version += 1;
    }

    pub fn remove_rule(&self, code: &str) -> bool {
        let mut state = self.state.write();
        let before = state.rules.len();
        state.rules.retain(|r| r.code != code);
        let removed = state.rules.len() != before;
        if removed {
            state.versions.rule_version += 1;
        }
        removed
    }

    /// 递增内容版本
    pub fn bump_content_version(&self) -> i64 {
        let mut state = self.state.write();
        state.versions.content_version += 1;
        state.versions.content_version
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }

    pub fn versions(&self) -> VersionStamp {
        self.state.read().versions
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn fetch_versions(&self) -> Result<VersionStamp> {
        let state = self.state.read();
        if state.unavailable {
            return Err(RuleError::StoreUnavailable("内存仓储被设置为不可用".to_string()));
        }
        Ok(state.versions)
    }

    async fn fetch_enabled_rules(&self) -> Result<Vec<RuleRecord>> {
        let state = self.state.read();
        if state.unavailable {
            return Err(RuleError::StoreUnavailable("内存仓储被设置为不可用".to_string()));
        }
        Ok(state.rules.iter().filter(|r| r.enabled).cloned().collect())
    }
}
