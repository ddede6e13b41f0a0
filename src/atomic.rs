//! 临时写入与原子替换的辅助方法：读取方不会观察到半成品文件。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const TEMP_MARKER: &str = ".tmp.";

/// 判断是否为 [`AtomicWrite`] 生成的临时文件名，列表与清理任务据此过滤。
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(TEMP_MARKER)
}

/// 可用于原子替换的临时文件封装。
pub struct AtomicWrite {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
}

impl AtomicWrite {
    /// 在目标路径同目录创建临时文件。
    pub async fn begin(target: &Path) -> io::Result<Self> {
        let parent = target.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "target has no parent directory")
        })?;
        let leaf = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "file".into());
        let temp_path = parent.join(format!(".{leaf}{TEMP_MARKER}{}", Uuid::new_v4()));
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
        })
    }

    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data).await
    }

    /// 放弃并清理临时文件。
    pub async fn discard(self) {
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// 同步临时文件并原子替换目标文件。
    pub async fn commit(self) -> io::Result<()> {
        self.file.sync_all().await?;
        drop(self.file);

        if let Err(err) = fs::rename(&self.temp_path, &self.target).await {
            #[cfg(windows)]
            {
                // rename does not replace on Windows; drop the target first
                if fs::remove_file(&self.target).await.is_ok()
                    && fs::rename(&self.temp_path, &self.target).await.is_ok()
                {
                    if let Some(parent) = self.target.parent() {
                        let _ = sync_dir(parent).await;
                    }
                    return Ok(());
                }
            }
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }

        if let Some(parent) = self.target.parent() {
            let _ = sync_dir(parent).await;
        }
        Ok(())
    }
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}
