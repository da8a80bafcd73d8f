//! Object-storage seam for avatar files.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tokio::fs;

use crate::services::ServiceError;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), ServiceError>;
    async fn delete(&self, key: &str) -> Result<(), ServiceError>;
    /// Public URL/path for a stored object.
    fn url(&self, key: &str) -> String;
}

/// Filesystem-backed storage rooted at a configured directory, served under
/// `/uploads`.
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path)
                .await
                .map_err(|e| ServiceError::Storage(format!("create upload dir: {}", e)))?;
        }
        Ok(Self { base_path })
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), ServiceError> {
        let path = self.base_path.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ServiceError::Storage(format!("create dir: {}", e)))?;
        }
        fs::write(path, data)
            .await
            .map_err(|e| ServiceError::Storage(format!("write object: {}", e)))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ServiceError> {
        let path = self.base_path.join(key);
        if path.exists() {
            fs::remove_file(path)
                .await
                .map_err(|e| ServiceError::Storage(format!("delete object: {}", e)))?;
        }
        Ok(())
    }

    fn url(&self, key: &str) -> String {
        format!("/uploads/{}", key)
    }
}

/// In-memory storage for tests.
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .read()
            .expect("storage lock poisoned")
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.read().expect("storage lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), ServiceError> {
        self.objects
            .write()
            .expect("storage lock poisoned")
            .insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ServiceError> {
        self.objects
            .write()
            .expect("storage lock poisoned")
            .remove(key);
        Ok(())
    }

    fn url(&self, key: &str) -> String {
        format!("/uploads/{}", key)
    }
}
