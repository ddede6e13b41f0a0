//! 文件上传、下载与列表处理器。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Multipart, Path as UrlPath};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use httpdate::fmt_http_date;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::error::ApiError;
use crate::storage::Storage;

#[derive(Serialize)]
pub(crate) struct UploadResponse {
    pub(crate) filename: String,
    pub(crate) size: u64,
}

#[derive(Serialize)]
pub(crate) struct ListResponse {
    pub(crate) files: Vec<String>,
    pub(crate) count: usize,
}

/// 以 multipart 表单字段 `file` 的文件名存储上传内容。
pub async fn upload_file(
    Extension(storage): Extension<Arc<Storage>>,
    mut multipart: Multipart,
) -> Result<JsonResponse<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(err.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            return Err(ApiError::BadRequest("file field has no filename".into()));
        };
        let content = field
            .bytes()
            .await
            .map_err(|err| ApiError::BadRequest(err.to_string()))?;

        let outcome = storage.put(&filename, &content).await?;
        info!(
            filename,
            size = outcome.size,
            is_new = outcome.is_new,
            "store file"
        );
        return Ok(JsonResponse(UploadResponse {
            filename,
            size: outcome.size,
        }));
    }

    Err(ApiError::BadRequest("multipart field 'file' is required".into()))
}

/// 以原始字节流返回已存储的文件。
pub async fn download_file(
    UrlPath(filename): UrlPath<String>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let (file, metadata) = storage.open_reader(&filename).await?;
    let size = metadata.len();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&size.to_string())
            .map_err(|_| ApiError::Internal("响应头构建失败".into()))?,
    );
    if let Ok(modified) = metadata.modified()
        && let Ok(value) = HeaderValue::from_str(&fmt_http_date(modified))
    {
        headers.insert(header::LAST_MODIFIED, value);
    }

    info!(filename, size, "download file");
    let stream = ReaderStream::new(file);
    Ok((StatusCode::OK, headers, AxumBody::from_stream(stream)).into_response())
}

/// 列出已存储的文件名；`count` 恒等于列表长度。
pub async fn list_files(
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<ListResponse>, ApiError> {
    let files = storage.list_names().await?;
    let count = files.len();
    info!(count, "list files");
    Ok(JsonResponse(ListResponse { files, count }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    async fn make_storage() -> (TempDir, Arc<Storage>) {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::open(temp.path().join("storage"))
            .await
            .expect("open storage");
        (temp, Arc::new(storage))
    }

    #[tokio::test]
    async fn download_rejects_traversal_path() {
        let (_temp, storage) = make_storage().await;
        let result = download_file(
            UrlPath("../secret.txt".to_string()),
            Extension(storage),
        )
        .await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn download_of_absent_name_is_not_found() {
        let (_temp, storage) = make_storage().await;
        let result = download_file(UrlPath("absent.txt".to_string()), Extension(storage)).await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_reports_names_with_matching_count() {
        let (_temp, storage) = make_storage().await;
        storage.put("a.txt", b"a").await.expect("put a");
        storage.put("b.txt", b"b").await.expect("put b");

        let JsonResponse(listing) = list_files(Extension(storage)).await.expect("list");
        assert_eq!(listing.files, ["a.txt", "b.txt"]);
        assert_eq!(listing.count, listing.files.len());
    }
}
