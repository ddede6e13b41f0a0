//! 运行计数指标处理器。

use axum::extract::Extension;
use axum::response::Json as JsonResponse;
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::storage::Storage;

#[derive(Serialize)]
pub(crate) struct MetricsSnapshot {
    pub(crate) files_stored_total: u64,
    pub(crate) files_current: u64,
}

/// 返回累计存储计数与当前磁盘文件数，后者每次请求时重新统计。
pub async fn get_metrics(
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<MetricsSnapshot>, ApiError> {
    let files_current = storage.current_count().await?;
    Ok(JsonResponse(MetricsSnapshot {
        files_stored_total: storage.stored_total(),
        files_current,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn tracks_creations_not_overwrites() {
        let temp = tempdir().expect("tempdir");
        let storage = Arc::new(
            Storage::open(temp.path().join("storage"))
                .await
                .expect("open storage"),
        );
        storage.put("dup.txt", b"first").await.expect("first put");
        storage.put("dup.txt", b"second").await.expect("second put");

        let JsonResponse(snapshot) = get_metrics(Extension(storage)).await.expect("metrics");
        assert_eq!(snapshot.files_stored_total, 1);
        assert_eq!(snapshot.files_current, 1);
    }
}
