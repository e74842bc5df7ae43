//! 规则匹配服务
//!
//! 组合索引、并行匹配器、内容解析器和两级缓存，对外提供匹配与重载入口。
//!
//! 引擎状态是一份不可变快照（索引 + 版本戳），通过 `ArcSwap` 原子替换。
//! 匹配请求开始时取一次快照，整个请求期间都使用它，重载只影响之后的请求。

use arc_swap::ArcSwap;
use natal_shared::config::MatchingConfig;
use natal_shared::observability::metrics as natal_metrics;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CacheStats, MatchCache, MatchCacheKey, SharedCacheBackend};
use crate::compiler::RuleCompiler;
use crate::content::{ContentAdapter, ContentAdapterRegistry, ContentResolver};
use crate::error::Result;
use crate::fact::FactRecord;
use crate::index::RuleIndex;
use crate::matcher::ParallelMatcher;
use crate::models::{ContentReloadOutcome, MatchedRule, ReloadOutcome, VersionStamp};
use crate::store::RuleRepository;

/// 引擎快照
#[derive(Debug, Default)]
pub struct EngineSnapshot {
    pub index: Arc<RuleIndex>,
    pub versions: VersionStamp,
}

/// 一次版本轮询的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub observed: VersionStamp,
    pub rules_reloaded: bool,
    pub content_reloaded: bool,
}

/// 规则匹配服务
pub struct RuleMatchService {
    repository: Arc<dyn RuleRepository>,
    compiler: RuleCompiler,
    state: ArcSwap<EngineSnapshot>,
    /// 串行化重载，避免两次重载交错发布
    reload_lock: Mutex<()>,
    matcher: ParallelMatcher,
    content: ContentResolver,
    cache: MatchCache,
    shared_cache_ttl_secs: u64,
}

impl RuleMatchService {
    pub fn new(repository: Arc<dyn RuleRepository>, config: &MatchingConfig) -> Self {
        let registry = Arc::new(ContentAdapterRegistry::new());
        Self {
            repository,
            compiler: RuleCompiler::new(),
            state: ArcSwap::from_pointee(EngineSnapshot::default()),
            reload_lock: Mutex::new(()),
            matcher: ParallelMatcher::new(config.worker_cap, config.inline_threshold),
            content: ContentResolver::new(registry, config.adapter_cache_capacity),
            cache: MatchCache::new(config.local_cache_capacity),
            shared_cache_ttl_secs: config.shared_cache_ttl_secs,
        }
    }

    /// 启用共享缓存层
    pub fn with_shared_cache(mut self, backend: Arc<dyn SharedCacheBackend>) -> Self {
        self.cache = self.cache.with_shared(backend, self.shared_cache_ttl_secs);
        self
    }

    pub fn register_content_adapter(&self, name: impl Into<String>, adapter: Arc<dyn ContentAdapter>) {
        self.content.registry().register(name, adapter);
    }

    pub fn content_registry(&self) -> &Arc<ContentAdapterRegistry> {
        self.content.registry()
    }

    /// 当前生效的快照
    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        self.state.load_full()
    }

    pub fn rule_count(&self) -> usize {
        self.state.load().index.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn worker_pool_size(&self) -> usize {
        self.matcher.pool_size()
    }

    /// 匹配规则
    ///
    /// 返回按优先级降序排列的命中规则及其解析后的内容。内部错误一律吸收并
    /// 记录日志；过滤类型全部未知时返回空列表。
    #[instrument(skip(self, fact))]
    pub async fn match_rules(
        &self,
        fact: impl Into<Arc<FactRecord>>,
        filter: Option<&[String]>,
    ) -> Vec<MatchedRule> {
        let start = Instant::now();
        let fact: Arc<FactRecord> = fact.into();
        let snapshot = self.state.load_full();
        let key = match MatchCacheKey::derive(&fact, filter) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "缓存键计算失败，本次匹配不使用缓存");
                None
            }
        };

        if let Some(key) = &key {
            if let Some(cached) = self.cache.get(key, snapshot.versions).await {
                debug!(matched = cached.len(), "匹配结果缓存命中");
                natal_metrics::record_match(cached.len(), true, start.elapsed().as_secs_f64());
                return cached;
            }
        }

        let candidates = snapshot.index.shortlist(&fact, filter);
        let candidate_count = candidates.len();
        let matched = self.matcher.evaluate(candidates, Arc::clone(&fact)).await;

        let content_version = snapshot.versions.content_version;
        let resolved: Vec<MatchedRule> = matched
            .iter()
            .map(|rule| MatchedRule {
                code: rule.code.clone(),
                name: rule.name.clone(),
                rule_type: rule.rule_type.clone(),
                priority: rule.priority,
                content: self.content.resolve(rule, &fact, content_version),
            })
            .collect();

        if let Some(key) = &key {
            self.cache
                .set(key, resolved.clone(), snapshot.versions)
                .await;
        }

        debug!(
            candidates = candidate_count,
            matched = resolved.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "规则匹配完成"
        );
        natal_metrics::record_match(resolved.len(), false, start.elapsed().as_secs_f64());
        resolved
    }

    /// 重新加载全部规则并原子替换索引
    ///
    /// 读取失败时保留旧快照继续服务。
    #[instrument(skip(self))]
    pub async fn reload_rules(&self) -> ReloadOutcome {
        let _guard = self.reload_lock.lock().await;
        self.reload_rules_locked().await
    }

    async fn reload_rules_locked(&self) -> ReloadOutcome {
        let count_before = self.rule_count();

        match self.build_index().await {
            Ok((index, rule_version)) => {
                let count_after = index.len();
                let stats = index.stats();
                let current = self.state.load_full();
                let versions = VersionStamp::new(rule_version, current.versions.content_version);

                self.state.store(Arc::new(EngineSnapshot {
                    index: Arc::new(index),
                    versions,
                }));
                self.cache.invalidate_local();

                info!(
                    rule_version,
                    count_before,
                    count_after,
                    catch_all = stats.catch_all,
                    types = stats.types,
                    "规则索引已重建"
                );
                natal_metrics::record_reload("rules", true);
                natal_metrics::set_rules_loaded(count_after);

                ReloadOutcome {
                    reloaded: true,
                    count_before,
                    count_after,
                }
            }
            Err(e) => {
                error!(error = %e, "规则重载失败，继续使用上一版本");
                natal_metrics::record_reload("rules", false);
                ReloadOutcome {
                    reloaded: false,
                    count_before,
                    count_after: count_before,
                }
            }
        }
    }

    async fn build_index(&self) -> Result<(RuleIndex, i64)> {
        let versions = self.repository.fetch_versions().await?;
        let records = self.repository.fetch_enabled_rules().await?;
        let report = self.compiler.compile_all(records);

        if report.skipped() > 0 {
            warn!(
                disabled = report.disabled,
                malformed = report.malformed.len(),
                duplicates = report.duplicates.len(),
                "部分规则未进入索引"
            );
        }

        Ok((RuleIndex::build(report.rules), versions.rule_version))
    }

    /// 使全部内容相关缓存失效
    ///
    /// 内容版本取存储中的当前值；存储不可达时沿用当前版本，缓存仍被清空。
    #[instrument(skip(self))]
    pub async fn reload_content(&self) -> ContentReloadOutcome {
        let _guard = self.reload_lock.lock().await;
        let content_version = match self.repository.fetch_versions().await {
            Ok(observed) => observed.content_version,
            Err(e) => {
                warn!(error = %e, "读取内容版本失败，仅清空缓存");
                self.state.load().versions.content_version
            }
        };
        self.reload_content_locked(content_version).await
    }

    async fn reload_content_locked(&self, content_version: i64) -> ContentReloadOutcome {
        let current = self.state.load_full();
        if current.versions.content_version != content_version {
            self.state.store(Arc::new(EngineSnapshot {
                index: Arc::clone(&current.index),
                versions: VersionStamp::new(current.versions.rule_version, content_version),
            }));
        }

        let adapter_results = self.content.clear_cache();
        let cache_entries = self.cache.invalidate_all().await;

        info!(
            content_version,
            adapter_results, cache_entries, "内容缓存已失效"
        );
        natal_metrics::record_reload("content", true);

        ContentReloadOutcome {
            invalidated_cache_entries: cache_entries,
        }
    }

    /// 轮询一次存储版本，按需重载规则或内容
    #[instrument(skip(self))]
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let _guard = self.reload_lock.lock().await;

        let observed = self.repository.fetch_versions().await?;
        let current = self.state.load().versions;
        let mut outcome = PollOutcome {
            observed,
            ..Default::default()
        };

        if observed.rule_version > current.rule_version {
            info!(
                from = current.rule_version,
                to = observed.rule_version,
                "检测到规则版本变化"
            );
            outcome.rules_reloaded = self.reload_rules_locked().await.reloaded;
        }

        if observed.content_version > current.content_version {
            info!(
                from = current.content_version,
                to = observed.content_version,
                "检测到内容版本变化"
            );
            self.reload_content_locked(observed.content_version).await;
            outcome.content_reloaded = true;
        }

        Ok(outcome)
    }
}
