//! 版本监听
//!
//! 后台任务按固定间隔轮询存储版本，发现变化时触发重载。
//! 读取失败只记录日志，下一周期重试，期间继续使用上一份快照。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::service::RuleMatchService;

/// 版本监听器
pub struct VersionWatcher;

impl VersionWatcher {
    /// 启动后台轮询任务
    pub fn spawn(service: Arc<RuleMatchService>, interval: Duration) -> WatcherHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval 的第一次 tick 立即完成，跳过
            ticker.tick().await;

            info!(interval_secs = interval.as_secs(), "版本监听已启动");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match service.poll_once().await {
                            Ok(outcome) => debug!(
                                rule_version = outcome.observed.rule_version,
                                content_version = outcome.observed.content_version,
                                rules_reloaded = outcome.rules_reloaded,
                                content_reloaded = outcome.content_reloaded,
                                "版本轮询完成"
                            ),
                            Err(e) => warn!(
                                error = %e,
                                retryable = e.is_retryable(),
                                "版本轮询失败，继续使用当前规则"
                            ),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("版本监听已停止");
        });

        WatcherHandle {
            shutdown_tx,
            handle,
        }
    }
}

/// 监听任务句柄
pub struct WatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl WatcherHandle {
    /// 通知后台任务退出并等待其结束
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "版本监听任务异常退出");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
