//! 匹配结果缓存
//!
//! 两级缓存：进程内 DashMap 在前，Redis 共享层在后。共享层命中的结果
//! 回填本地层。共享层的任何错误都按未命中处理，只记录告警，不重试。
//! 条目带写入时的版本戳，版本不一致的条目视为未命中。

use async_trait::async_trait;
use dashmap::DashMap;
use natal_shared::cache::Cache;
use natal_shared::observability::metrics as natal_metrics;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{Result, RuleError};
use crate::fact::FactRecord;
use crate::models::{CacheEntry, MatchedRule, VersionStamp};

/// 缓存键前缀
pub const KEY_PREFIX: &str = "natal:match:";

/// 缓存键生成器
pub struct MatchCacheKey;

impl MatchCacheKey {
    /// 由完整事实记录和排序去重后的类型过滤计算缓存键
    ///
    /// 条件可以读取事实记录的任意字段（流年、大运、神煞、农历等），因此整条
    /// 记录的 JSON 序列化都参与哈希。派生统计不参与序列化，映射字段均为
    /// `BTreeMap`，同一记录总是得到同一字节序列。
    pub fn derive(fact: &FactRecord, filter: Option<&[String]>) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(fact)?);
        hasher.update(b"|");

        let mut types: Vec<&str> = filter
            .unwrap_or_default()
            .iter()
            .map(String::as_str)
            .collect();
        types.sort_unstable();
        types.dedup();
        hasher.update(types.join(",").as_bytes());

        Ok(format!("{}{:x}", KEY_PREFIX, hasher.finalize()))
    }
}

/// 共享缓存后端
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SharedCacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    async fn set(&self, entry: &CacheEntry, ttl_secs: u64) -> Result<()>;

    /// 删除全部匹配缓存，返回删除的条目数
    async fn invalidate_all(&self) -> Result<usize>;
}

/// 基于 Redis 的共享缓存
pub struct RedisCacheBackend {
    cache: Cache,
}

impl RedisCacheBackend {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl SharedCacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.cache
            .get::<CacheEntry>(key)
            .await
            .map_err(|e| RuleError::CacheBackend(e.to_string()))
    }

    async fn set(&self, entry: &CacheEntry, ttl_secs: u64) -> Result<()> {
        self.cache
            .set(&entry.key, entry, Duration::from_secs(ttl_secs))
            .await
            .map_err(|e| RuleError::CacheBackend(e.to_string()))
    }

    async fn invalidate_all(&self) -> Result<usize> {
        let pattern = format!("{}*", KEY_PREFIX);
        self.cache
            .delete_pattern(&pattern)
            .await
            .map(|n| n as usize)
            .map_err(|e| RuleError::CacheBackend(e.to_string()))
    }
}

/// 缓存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub local_hits: u64,
    pub shared_hits: u64,
    pub misses: u64,
    pub shared_errors: u64,
    pub local_entries: usize,
}

#[derive(Default)]
struct CacheCounters {
    local_hits: AtomicU64,
    shared_hits: AtomicU64,
    misses: AtomicU64,
    shared_errors: AtomicU64,
}

/// 两级匹配缓存
pub struct MatchCache {
    local: DashMap<String, CacheEntry>,
    local_capacity: usize,
    shared: Option<Arc<dyn SharedCacheBackend>>,
    shared_ttl_secs: u64,
    counters: CacheCounters,
}

impl MatchCache {
    pub fn new(local_capacity: usize) -> Self {
        Self {
            local: DashMap::new(),
            local_capacity: local_capacity.max(1),
            shared: None,
            shared_ttl_secs: 3600,
            counters: CacheCounters::default(),
        }
    }

    pub fn with_shared(mut self, backend: Arc<dyn SharedCacheBackend>, ttl_secs: u64) -> Self {
        self.shared = Some(backend);
        self.shared_ttl_secs = ttl_secs;
        self
    }

    pub fn has_shared_tier(&self) -> bool {
        self.shared.is_some()
    }

    /// 读取缓存，只返回与当前版本戳一致的条目
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get(&self, key: &str, stamp: VersionStamp) -> Option<Vec<MatchedRule>> {
        if let Some(entry) = self.local.get(key) {
            if entry.is_current(stamp) {
                self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
                natal_metrics::record_cache_lookup("local", true);
                return Some(entry.value.clone());
            }
        }
        // 过期版本的条目顺手清理
        self.local.remove_if(key, |_, entry| !entry.is_current(stamp));

        if let Some(shared) = &self.shared {
            match shared.get(key).await {
                Ok(Some(entry)) if entry.is_current(stamp) => {
                    self.counters.shared_hits.fetch_add(1, Ordering::Relaxed);
                    natal_metrics::record_cache_lookup("shared", true);
                    let value = entry.value.clone();
                    self.insert_local(entry);
                    return Some(value);
                }
                Ok(_) => {}
                Err(e) => {
                    self.counters.shared_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "共享缓存读取失败，按未命中处理");
                }
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        natal_metrics::record_cache_lookup("all", false);
        None
    }

    /// 写入两级缓存；共享层失败只记录告警
    #[instrument(skip(self, value), fields(key = %key, rules = value.len()))]
    pub async fn set(&self, key: &str, value: Vec<MatchedRule>, stamp: VersionStamp) {
        let entry = CacheEntry::new(key, value, stamp);

        if let Some(shared) = &self.shared {
            if let Err(e) = shared.set(&entry, self.shared_ttl_secs).await {
                self.counters.shared_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "共享缓存写入失败");
            }
        }

        self.insert_local(entry);
    }

    fn insert_local(&self, entry: CacheEntry) {
        if self.local.len() >= self.local_capacity && !self.local.contains_key(&entry.key) {
            debug!(capacity = self.local_capacity, "本地缓存已满，整体清空");
            self.local.clear();
        }
        self.local.insert(entry.key.clone(), entry);
    }

    /// 清空两级缓存，返回清除的条目数
    pub async fn invalidate_all(&self) -> usize {
        let mut removed = self.invalidate_local();

        if let Some(shared) = &self.shared {
            match shared.invalidate_all().await {
                Ok(n) => removed += n,
                Err(e) => {
                    self.counters.shared_errors.fetch_add(1, Ordering::Relaxed);
                    // 共享层残留条目带旧版本戳，读取时会被判为未命中
                    warn!(error = %e, "共享缓存清理失败");
                }
            }
        }

        removed
    }

    pub fn invalidate_local(&self) -> usize {
        let count = self.local.len();
        self.local.clear();
        count
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            shared_hits: self.counters.shared_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            shared_errors: self.counters.shared_errors.load(Ordering::Relaxed),
            local_entries: self.local.len(),
        }
    }
}
