use std::path::Path;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::error::ChatError;
use crate::models::Attachment;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "aac", "ogg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    /// Multipart field name carrying this kind of file.
    pub fn from_field(name: &str) -> Option<Self> {
        match name {
            "image" => Some(MediaKind::Image),
            "audio" => Some(MediaKind::Audio),
            _ => None,
        }
    }

    fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            MediaKind::Image => IMAGE_EXTENSIONS,
            MediaKind::Audio => AUDIO_EXTENSIONS,
        }
    }

    fn folder(&self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Audio => "audio",
        }
    }

    pub fn attachment(&self, url: String) -> Attachment {
        match self {
            MediaKind::Image => Attachment::Image(url),
            MediaKind::Audio => Attachment::Audio(url),
        }
    }
}

/// A file received from a client, checked for an allowed extension.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub kind: MediaKind,
    pub extension: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl MediaUpload {
    pub fn new(
        kind: MediaKind,
        file_name: &str,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<Self, ChatError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .filter(|ext| kind.allowed_extensions().contains(&ext.as_str()))
            .ok_or_else(|| {
                ChatError::InvalidInput(format!(
                    "invalid file format. supported formats: {}",
                    kind.allowed_extensions().join(", ")
                ))
            })?;

        if bytes.is_empty() {
            return Err(ChatError::InvalidInput("uploaded file is empty".to_string()));
        }

        let content_type = content_type
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Ok(Self { kind, extension, content_type, bytes })
    }

    /// Object key inside the bucket, unique per upload.
    pub fn object_path(&self, room_id: Uuid) -> String {
        format!("{}/{}/{}.{}", room_id, self.kind.folder(), Uuid::new_v4(), self.extension)
    }
}

/// Stores chat attachments and hands back a URL clients can fetch.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, room_id: Uuid, media: MediaUpload) -> Result<String, ChatError>;

    /// Deletes an object previously returned by `upload`.
    async fn remove(&self, url: &str) -> Result<(), ChatError>;
}

pub struct SupabaseMediaUploader {
    supabase: SupabaseClient,
    bucket: String,
}

impl SupabaseMediaUploader {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::service_role(config),
            bucket: config.supabase_storage_bucket.clone(),
        }
    }
}

#[async_trait]
impl MediaUploader for SupabaseMediaUploader {
    async fn upload(&self, room_id: Uuid, media: MediaUpload) -> Result<String, ChatError> {
        let object_path = media.object_path(room_id);
        debug!("Uploading chat attachment {} for room {}", object_path, room_id);

        self.supabase
            .upload_object(&self.bucket, &object_path, &media.content_type, media.bytes, None)
            .await
            .map_err(|e| {
                error!("Failed to upload attachment for room {}: {}", room_id, e);
                ChatError::from(e)
            })
    }

    async fn remove(&self, url: &str) -> Result<(), ChatError> {
        let public_prefix = self.supabase.get_public_url(&self.bucket, "");
        let object_path = url.strip_prefix(&public_prefix).ok_or_else(|| {
            ChatError::InvalidInput(format!("{} is not an object in bucket {}", url, self.bucket))
        })?;

        let delete_path = format!("/storage/v1/object/{}/{}", self.bucket, object_path);
        debug!("Deleting chat attachment {}", object_path);

        let _: Value = self.supabase
            .request(Method::DELETE, &delete_path, None, None)
            .await?;
        Ok(())
    }
}
