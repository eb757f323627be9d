use std::path::{Path, PathBuf};

use async_trait::async_trait;

use campus_schedule_core::{Error, Result, store::KeyedStore};

/// 文件存储：每个键一个 JSON 文件
#[derive(Debug, Clone)]
pub struct FileStore {
    store_dir: PathBuf,
}

impl FileStore {
    pub fn new(store_dir: PathBuf) -> Result<Self> {
        if !store_dir.exists() {
            std::fs::create_dir_all(&store_dir).map_err(|e| {
                Error::Store(format!("Failed to create store directory: {}", e))
            })?;
        }

        Ok(Self { store_dir })
    }

    pub fn with_default_dir(app_name: &str) -> Result<Self> {
        let store_dir = Self::get_default_store_dir(app_name)?;
        Self::new(store_dir)
    }

    pub fn dir(&self) -> &Path {
        &self.store_dir
    }

    fn get_default_store_dir(app_name: &str) -> Result<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            if let Some(home) = std::env::var_os("HOME") {
                Ok(PathBuf::from(home)
                    .join("Library")
                    .join("Caches")
                    .join(app_name))
            } else {
                Err(Error::Store("Cannot determine store directory".to_string()))
            }
        }

        #[cfg(target_os = "linux")]
        {
            if let Some(cache_dir) = std::env::var_os("XDG_CACHE_HOME") {
                Ok(PathBuf::from(cache_dir).join(app_name))
            } else if let Some(home) = std::env::var_os("HOME") {
                Ok(PathBuf::from(home).join(".cache").join(app_name))
            } else {
                Err(Error::Store("Cannot determine store directory".to_string()))
            }
        }

        #[cfg(target_os = "windows")]
        {
            if let Some(local_app_data) = std::env::var_os("LOCALAPPDATA") {
                Ok(PathBuf::from(local_app_data).join(app_name))
            } else {
                Err(Error::Store("Cannot determine store directory".to_string()))
            }
        }

        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            Err(Error::Store(
                "Unsupported operating system for store directory detection".to_string(),
            ))
        }
    }

    /// 键中除字母数字、`-` 和 `_` 以外的字符替换为 `_`
    fn store_file_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        self.store_dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl KeyedStore for FileStore {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let file_path = self.store_file_path(key);

        if !file_path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read(file_path)
            .await
            .map_err(|e| Error::Store(format!("Failed to read store file: {}", e)))?;
        Ok(Some(content))
    }

    async fn put_raw(&self, key: &str, value: &[u8]) -> Result<()> {
        let file_path = self.store_file_path(key);
        // 先写临时文件再改名，中途失败不会留下半个文件
        let tmp_path = file_path.with_extension("json.tmp");

        tokio::fs::write(&tmp_path, value)
            .await
            .map_err(|e| Error::Store(format!("Failed to write store file: {}", e)))?;
        tokio::fs::rename(&tmp_path, &file_path)
            .await
            .map_err(|e| Error::Store(format!("Failed to replace store file: {}", e)))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let file_path = self.store_file_path(key);
        if file_path.exists() {
            tokio::fs::remove_file(file_path)
                .await
                .map_err(|e| Error::Store(format!("Failed to delete store file: {}", e)))?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.store_file_path(key).exists())
    }
}
