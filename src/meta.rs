//! 服务入口信息与健康检查处理器。

use axum::response::Json as JsonResponse;
use serde_json::{Value, json};

/// 返回 API 入口信息与端点列表。
pub async fn service_info() -> JsonResponse<Value> {
    JsonResponse(json!({
        "message": "File Storage API",
        "endpoints": [
            "POST /files",
            "GET /files",
            "GET /files/{filename}",
            "GET /health",
            "GET /metrics",
            "GET /version",
        ],
    }))
}

/// 健康检查；不访问存储状态。
pub async fn health_check() -> JsonResponse<Value> {
    JsonResponse(json!({ "status": "ok" }))
}
