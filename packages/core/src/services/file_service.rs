//! FileService - Study File Registry
//!
//! Creates and lists the study files that variation trees belong to. A tree's
//! root can only be created once its file exists.

use crate::db::FileStore;
use crate::models::ChessFile;
use crate::services::error::TreeError;
use std::sync::Arc;

#[derive(Clone)]
pub struct FileService {
    files: Arc<dyn FileStore>,
}

impl FileService {
    pub fn new(files: Arc<dyn FileStore>) -> Self {
        Self { files }
    }

    /// Create a study file
    ///
    /// # Errors
    ///
    /// - `Validation` if the trimmed name is empty or longer than 200 characters
    pub async fn create_file(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<ChessFile, TreeError> {
        let file = ChessFile::new(name, description)?;
        let file = self.files.insert_file(file).await?;
        tracing::debug!("Created file '{}' ({})", file.id, file.name);
        Ok(file)
    }

    pub async fn get_file(&self, id: &str) -> Result<ChessFile, TreeError> {
        self.files
            .get_file(id)
            .await?
            .ok_or_else(|| TreeError::not_found(format!("file '{}'", id)))
    }

    /// All files, newest first
    pub async fn list_files(&self) -> Result<Vec<ChessFile>, TreeError> {
        Ok(self.files.list_files().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[tokio::test]
    async fn test_create_and_get() {
        let service = FileService::new(Arc::new(MemoryStore::new()));

        let file = service
            .create_file("  King's Indian ", Some("Mar del Plata lines"))
            .await
            .unwrap();
        assert_eq!(file.name, "King's Indian");

        assert_eq!(service.get_file(&file.id).await.unwrap(), file);
        assert!(service.get_file("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_blank_name_is_rejected() {
        let service = FileService::new(Arc::new(MemoryStore::new()));

        let err = service.create_file("  ", None).await.unwrap_err();
        assert!(matches!(err, TreeError::Validation(_)));
        assert!(service.list_files().await.unwrap().is_empty());
    }
}
