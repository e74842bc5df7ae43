//! 并行匹配器
//!
//! 将候选规则分块，在阻塞线程池上并发评估。并发度由共享信号量限制为
//! `min(2 × 可用核数, worker_cap)`，同一时刻所有匹配请求合计不超过该值。
//! 单条规则评估发生 panic 时记录日志并按不匹配处理，不影响同批其他规则。

use futures::future::join_all;
use natal_shared::observability::metrics as natal_metrics;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, instrument};

use crate::compiler::CompiledRule;
use crate::error::{Result, RuleError};
use crate::evaluator::ConditionEvaluator;
use crate::fact::FactRecord;

/// 单条规则的评估函数
pub type EvalFn = dyn Fn(&CompiledRule, &FactRecord) -> bool + Send + Sync;

/// 并行匹配器
pub struct ParallelMatcher {
    semaphore: Arc<Semaphore>,
    pool_size: usize,
    inline_threshold: usize,
    eval: Arc<EvalFn>,
}

impl ParallelMatcher {
    pub fn new(worker_cap: usize, inline_threshold: usize) -> Self {
        Self::with_evaluator(
            worker_cap,
            inline_threshold,
            Arc::new(|rule: &CompiledRule, fact: &FactRecord| {
                ConditionEvaluator::evaluate(&rule.conditions, fact)
            }),
        )
    }

    /// 使用自定义评估函数（测试中用于注入故障）
    pub fn with_evaluator(worker_cap: usize, inline_threshold: usize, eval: Arc<EvalFn>) -> Self {
        let pool_size = pool_size(worker_cap);
        Self {
            semaphore: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            inline_threshold,
            eval,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// 当前空闲的工作槽位
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 评估候选规则，返回按优先级降序、编码升序排列的匹配规则
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn evaluate(
        &self,
        candidates: Vec<Arc<CompiledRule>>,
        fact: Arc<FactRecord>,
    ) -> Vec<Arc<CompiledRule>> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut matched = if candidates.len() < self.inline_threshold {
            evaluate_chunk(&candidates, &fact, self.eval.as_ref())
        } else {
            self.evaluate_parallel(candidates, fact).await
        };

        sort_matches(&mut matched);
        matched
    }

    async fn evaluate_parallel(
        &self,
        candidates: Vec<Arc<CompiledRule>>,
        fact: Arc<FactRecord>,
    ) -> Vec<Arc<CompiledRule>> {
        let chunk_size = candidates.len().div_ceil(self.pool_size).max(1);

        let tasks = candidates.chunks(chunk_size).map(|chunk| {
            let chunk = chunk.to_vec();
            let fact = Arc::clone(&fact);
            let eval = Arc::clone(&self.eval);
            let semaphore = Arc::clone(&self.semaphore);

            async move {
                // 信号量不会被关闭；拿不到许可时直接在当前任务评估
                let permit = semaphore.acquire_owned().await.ok();
                let handle = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    evaluate_chunk(&chunk, &fact, eval.as_ref())
                });

                match handle.await {
                    Ok(matched) => matched,
                    Err(e) => {
                        error!(error = %e, "评估任务异常退出，本块候选按不匹配处理");
                        Vec::new()
                    }
                }
            }
        });

        join_all(tasks).await.into_iter().flatten().collect()
    }
}

fn pool_size(worker_cap: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (2 * cores).min(worker_cap.max(1))
}

fn evaluate_chunk(
    chunk: &[Arc<CompiledRule>],
    fact: &FactRecord,
    eval: &EvalFn,
) -> Vec<Arc<CompiledRule>> {
    chunk
        .iter()
        .filter(|rule| match evaluate_guarded(rule, fact, eval) {
            Ok(matched) => matched,
            Err(e) => {
                error!(code = %rule.code, error = %e, "规则评估异常，按不匹配处理");
                natal_metrics::record_evaluation_error(&rule.rule_type);
                false
            }
        })
        .cloned()
        .collect()
}

/// 评估单条规则，panic 转为 `RuleError::Evaluation`
fn evaluate_guarded(rule: &CompiledRule, fact: &FactRecord, eval: &EvalFn) -> Result<bool> {
    catch_unwind(AssertUnwindSafe(|| eval(rule, fact))).map_err(|panic| {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown".to_string());
        RuleError::Evaluation(format!("{}: {}", rule.code, reason))
    })
}

/// 优先级降序，同优先级按编码升序
pub fn sort_matches(rules: &mut [Arc<CompiledRule>]) {
    rules.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.code.cmp(&b.code))
    });
}
