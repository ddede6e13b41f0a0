//! 内存文件名锁：用于串行化同名写操作。

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Manages asynchronous mutexes keyed by stored file name.
#[derive(Debug, Default)]
pub struct NameLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取给定文件名的锁；不同名字的锁相互独立。
    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut inner = self.inner.lock().await;
            inner
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn distinct_names_do_not_contend() {
        let locks = NameLocks::new();
        let _a = locks.acquire("a.txt").await;
        // would deadlock if the locks shared a key
        let _b = locks.acquire("b.txt").await;
    }

    #[tokio::test]
    async fn same_name_is_exclusive() {
        let locks = Arc::new(NameLocks::new());
        let guard = locks.acquire("a.txt").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("a.txt").await;
            })
        };
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.expect("contender finishes");
    }
}
