//! 命理规则匹配引擎服务
//!
//! 启动后加载规则库并按版本号轮询热重载。匹配能力以库的形式提供给上层服务，
//! 本进程只负责保持规则快照与缓存处于最新状态，并在 metrics 端口暴露健康检查与指标。

use anyhow::Result;
use natal_shared::cache::Cache;
use natal_shared::config::AppConfig;
use natal_shared::database::Database;
use natal_shared::observability;
use rule_engine::{
    DayPillarNarrativeAdapter, PgRuleRepository, RedisCacheBackend, RuleMatchService,
    VersionWatcher, MIGRATOR,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 统一加载配置：从 config/{service_name}.toml 加载，包含可观测性配置
    let config = AppConfig::load("rule-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting rule-engine service...");

    let db = Database::connect(&config.database).await?;
    if config.database.run_migrations {
        db.migrate(&MIGRATOR).await?;
    }
    let repository = Arc::new(PgRuleRepository::new(db.clone()));

    let mut service = RuleMatchService::new(repository, &config.matching);

    if config.matching.shared_cache_enabled {
        match Cache::new(&config.redis) {
            Ok(cache) => {
                if let Err(e) = cache.health_check().await {
                    warn!(error = %e, "Redis 暂不可达，共享缓存将在恢复后生效");
                }
                service = service.with_shared_cache(Arc::new(RedisCacheBackend::new(cache)));
                info!("Shared match cache enabled");
            }
            Err(e) => warn!(error = %e, "Redis 配置无效，仅使用进程内缓存"),
        }
    }

    let narrative = match config.matching.narrative_table_path.as_deref() {
        Some(path) => DayPillarNarrativeAdapter::from_json_file(path).unwrap_or_else(|e| {
            error!(path, error = %e, "日柱断语表加载失败，使用空表");
            DayPillarNarrativeAdapter::default()
        }),
        None => DayPillarNarrativeAdapter::default(),
    };
    info!(entries = narrative.len(), "Day pillar narrative adapter registered");
    service.register_content_adapter(DayPillarNarrativeAdapter::NAME, Arc::new(narrative));

    let service = Arc::new(service);

    let outcome = service.reload_rules().await;
    if outcome.reloaded {
        info!(rules = outcome.count_after, "Initial rule load complete");
    } else {
        warn!("Initial rule load failed, starting with empty index");
    }

    let watcher = VersionWatcher::spawn(
        Arc::clone(&service),
        Duration::from_secs(config.matching.poll_interval_secs),
    );

    shutdown_signal().await;

    watcher.stop().await;
    db.close().await;

    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
