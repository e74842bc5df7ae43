//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    // 保存到全局，供其他地方获取指标快照
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标
fn register_common_metrics(service_name: &str) {
    // 这些描述会出现在 /metrics 端点的 HELP 注释中
    metrics::describe_counter!("rule_matches_total", "Total number of match requests");
    metrics::describe_histogram!(
        "rule_match_duration_seconds",
        "Match request duration in seconds"
    );
    metrics::describe_histogram!("rule_match_results", "Number of rules matched per request");

    metrics::describe_counter!(
        "rule_evaluation_errors_total",
        "Rule evaluations that failed and were treated as non-matches"
    );

    metrics::describe_counter!("match_cache_hits_total", "Match cache hits by tier");
    metrics::describe_counter!("match_cache_misses_total", "Match cache misses");

    metrics::describe_counter!(
        "content_adapter_fallbacks_total",
        "Dynamic content resolutions that fell back to default content"
    );

    metrics::describe_counter!("rule_reloads_total", "Total number of reloads by kind");
    metrics::describe_gauge!("rules_loaded", "Number of rules in the active index");

    // 记录服务启动
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次匹配请求
#[inline]
pub fn record_match(matched: usize, cached: bool, duration_secs: f64) {
    metrics::counter!(
        "rule_matches_total",
        "cached" => cached.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "rule_match_duration_seconds",
        "cached" => cached.to_string()
    )
    .record(duration_secs);

    metrics::histogram!("rule_match_results").record(matched as f64);
}

/// 记录规则评估异常
#[inline]
pub fn record_evaluation_error(rule_type: &str) {
    metrics::counter!(
        "rule_evaluation_errors_total",
        "rule_type" => rule_type.to_string()
    )
    .increment(1);
}

/// 记录缓存查询
///
/// `tier` 为命中层级（local / shared）；未命中时统一记为 all。
#[inline]
pub fn record_cache_lookup(tier: &str, hit: bool) {
    if hit {
        metrics::counter!("match_cache_hits_total", "tier" => tier.to_string()).increment(1);
    } else {
        metrics::counter!("match_cache_misses_total", "tier" => tier.to_string()).increment(1);
    }
}

/// 记录内容适配器回退
#[inline]
pub fn record_adapter_fallback(adapter: &str, reason: &str) {
    metrics::counter!(
        "content_adapter_fallbacks_total",
        "adapter" => adapter.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录重载
#[inline]
pub fn record_reload(kind: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    metrics::counter!(
        "rule_reloads_total",
        "kind" => kind.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 更新当前索引中的规则数
#[inline]
pub fn set_rules_loaded(count: usize) {
    metrics::gauge!("rules_loaded").set(count as f64);
}
