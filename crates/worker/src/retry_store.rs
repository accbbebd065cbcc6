use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, error, warn};

use scheduler_core::{models::HandleCallbackParam, time::now_millis, SchedulerResult};

const FILE_PREFIX: &str = "callback-";
const FILE_SUFFIX: &str = ".json";

/// 回调失败批次的落盘目录
///
/// 每个文件保存一批 `HandleCallbackParam`，读取失败的文件改名为 `.corrupt` 保留现场。
#[derive(Debug, Clone)]
pub struct CallbackRetryStore {
    dir: PathBuf,
}

impl CallbackRetryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn save(&self, batch: &[HandleCallbackParam]) -> SchedulerResult<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_vec(batch)?;

        let stem = format!("{FILE_PREFIX}{}", now_millis());
        let mut path = self.dir.join(format!("{stem}{FILE_SUFFIX}"));
        let mut i = 1;
        while fs::try_exists(&path).await? {
            path = self.dir.join(format!("{stem}-{i}{FILE_SUFFIX}"));
            i += 1;
        }

        fs::write(&path, content).await?;
        debug!("回调失败批次已落盘: {}", path.display());
        Ok(path)
    }

    /// 待重试的文件，按文件名排序
    pub async fn list(&self) -> SchedulerResult<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_batch = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX));
            if !is_batch {
                continue;
            }
            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => files.push(path),
                Ok(_) => debug!("跳过非文件的回调重试条目: {}", path.display()),
                Err(e) => warn!("读取回调重试条目类型失败: {}, error={}", path.display(), e),
            }
        }
        files.sort();
        Ok(files)
    }

    /// 读取一个批次，文件保持不动
    ///
    /// 读取或解析失败的文件改名为 `.corrupt` 并返回 `None`，不会阻塞后续批次。
    pub async fn load(&self, path: &Path) -> Option<Vec<HandleCallbackParam>> {
        let parsed = match fs::read(path).await {
            Ok(content) => serde_json::from_slice::<Vec<HandleCallbackParam>>(&content)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match parsed {
            Ok(batch) => Some(batch),
            Err(e) => {
                self.set_aside(path, &e).await;
                None
            }
        }
    }

    /// 投递成功后删除批次文件
    pub async fn remove(&self, path: &Path) -> SchedulerResult<()> {
        fs::remove_file(path).await?;
        Ok(())
    }

    async fn set_aside(&self, path: &Path, reason: &str) {
        let corrupt = path.with_extension("corrupt");
        match fs::rename(path, &corrupt).await {
            Ok(()) => warn!(
                "回调重试文件无法读取，已改名保留: {} -> {}, error={}",
                path.display(),
                corrupt.display(),
                reason
            ),
            Err(e) => error!(
                "回调重试文件无法读取且改名失败: {}, error={}, rename_error={}",
                path.display(),
                reason,
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(log_id: i64) -> Vec<HandleCallbackParam> {
        vec![HandleCallbackParam::new(log_id, 0, 200, Some("ok".to_string()))]
    }

    #[tokio::test]
    async fn test_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = CallbackRetryStore::new(dir.path().join("callbacklog"));

        let first = store.save(&batch(1)).await.unwrap();
        let second = store.save(&batch(2)).await.unwrap();
        assert_ne!(first, second);

        let files = store.list().await.unwrap();
        assert_eq!(files.len(), 2);

        let mut log_ids = Vec::new();
        for path in files {
            let loaded = store.load(&path).await.unwrap();
            log_ids.push(loaded[0].log_id);
            // 读取不删除，投递成功后才删除
            assert!(path.exists());
            store.remove(&path).await.unwrap();
            assert!(!path.exists());
        }
        log_ids.sort();
        assert_eq!(log_ids, vec![1, 2]);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_kept_aside() {
        let dir = tempfile::tempdir().unwrap();
        let store = CallbackRetryStore::new(dir.path());
        let path = dir.path().join("callback-1.json");
        std::fs::write(&path, b"not json").unwrap();

        assert!(store.load(&path).await.is_none());
        assert!(!path.exists());
        assert!(dir.path().join("callback-1.corrupt").exists());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = CallbackRetryStore::new(dir.path());
        std::fs::create_dir(dir.path().join("callback-0.json")).unwrap();
        let saved = store.save(&batch(3)).await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec![saved]);
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_set_aside() {
        let dir = tempfile::tempdir().unwrap();
        let store = CallbackRetryStore::new(dir.path());
        let path = dir.path().join("callback-0.json");
        std::fs::create_dir(&path).unwrap();

        assert!(store.load(&path).await.is_none());
        assert!(!path.exists());
        assert!(dir.path().join("callback-0.corrupt").exists());
    }

    #[tokio::test]
    async fn test_list_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = CallbackRetryStore::new(dir.path().join("absent"));
        assert!(store.list().await.unwrap().is_empty());
    }
}
