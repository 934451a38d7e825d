use std::path::PathBuf;

use anyhow::Result;
use axum::{
    Extension,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use bytes::Bytes;
use glimpse_core::StoryError;
use glimpse_types::models::Viewer;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

/// Flat on-disk store for uploaded story media.
///
/// Each object lives at `{dir}/{uuid}`; the content type is kept on the
/// story item row, not on disk.
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Media directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Ids are UUIDs; anything else never touches the filesystem.
    fn path(&self, media_id: &str) -> Option<PathBuf> {
        let id = media_id.parse::<Uuid>().ok()?;
        Some(self.dir.join(id.to_string()))
    }

    pub async fn save(&self, data: &[u8]) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let path = self.dir.join(&id);
        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(id)
    }

    pub async fn load(&self, media_id: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.path(media_id) else {
            return Ok(None);
        };
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, media_id: &str) -> Result<()> {
        let Some(path) = self.path(media_id) else {
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Media {} already gone", media_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// GET /media/{media_id}
pub async fn get_media(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(media_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = media_id.clone();
    let item = state
        .run(move |engine| engine.media_item(viewer, &id))
        .await?;
    let bytes = state
        .media
        .load(&media_id)
        .await?
        .ok_or(StoryError::NotFound)?;
    Ok(([(header::CONTENT_TYPE, item.mime)], Bytes::from(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().join("media")).await.unwrap();

        let id = store.save(b"png bytes").await.unwrap();
        assert_eq!(store.load(&id).await.unwrap().as_deref(), Some(&b"png bytes"[..]));

        store.delete(&id).await.unwrap();
        assert!(store.load(&id).await.unwrap().is_none());
        store.delete(&id).await.unwrap();
    }

    #[tokio::test]
    async fn non_uuid_ids_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf()).await.unwrap();
        assert!(store.load("../secrets").await.unwrap().is_none());
    }
}
