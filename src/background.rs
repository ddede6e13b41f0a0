//! 清理中断写入遗留临时文件的后台任务。

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::TEMP_SWEEP_INTERVAL_SECS;
use crate::storage::Storage;

/// 启动后台任务（过期临时文件清理）。
pub fn spawn_background_tasks(storage: Arc<Storage>, temp_ttl: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(TEMP_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match storage.sweep_stale_temp(temp_ttl).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "removed stale scratch files"),
                Err(err) => warn!(error = ?err, "scratch file sweep failed"),
            }
        }
    });
}
