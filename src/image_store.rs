use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ImageHostConfig;
use crate::error::{Error, Result};
use crate::note::NoteImage;

/// Incoming transformation applied to every upload: bound the image to a
/// 1200x1200 footprint preserving aspect ratio, let the host pick quality
/// and delivery format.
const TRANSFORMATION: &str = "c_limit,h_1200,w_1200,f_auto,q_auto:good";

/// The `{url, public_id}` pair returned by an image store upload. `url` is
/// publicly retrievable; `public_id` is the handle for a later release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub url: String,
    pub public_id: String,
}

impl From<StoredImage> for NoteImage {
    fn from(stored: StoredImage) -> Self {
        NoteImage {
            url: stored.url,
            public_id: stored.public_id,
        }
    }
}

/// Uploads and deletes binary image content against a hosted image service.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Stores the content and returns its public URL and deletion handle.
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<StoredImage>;

    /// Deletes the stored object. Idempotent: releasing an already-released
    /// or unknown handle is not an error.
    async fn release(&self, public_id: &str) -> Result<()>;
}

// --- Hosted implementation ---

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

/// Image store backed by a Cloudinary-style hosting service. Requests are
/// authenticated with an SHA-256 signature over the sorted request
/// parameters followed by the API secret.
pub struct HostedImageStore {
    client: reqwest::Client,
    upload_url: String,
    destroy_url: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

impl HostedImageStore {
    pub fn new(host: &ImageHostConfig) -> Self {
        let base = format!("https://api.cloudinary.com/v1_1/{}", host.cloud_name);
        Self {
            client: reqwest::Client::new(),
            upload_url: format!("{base}/image/upload"),
            destroy_url: format!("{base}/image/destroy"),
            api_key: host.api_key.clone(),
            api_secret: host.api_secret.clone(),
            folder: host.folder.clone(),
        }
    }

    /// Params must already be `&`-joined in alphabetical key order.
    fn sign(&self, params: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(params.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl ImageStore for HostedImageStore {
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<StoredImage> {
        let timestamp = Utc::now().timestamp();
        let signature = self.sign(&format!(
            "folder={}&timestamp={timestamp}&transformation={TRANSFORMATION}",
            self.folder
        ));

        let file = reqwest::multipart::Part::bytes(bytes)
            .file_name("note-image")
            .mime_str(content_type)
            .map_err(|e| Error::Upload(format!("invalid content type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("folder", self.folder.clone())
            .text("transformation", TRANSFORMATION)
            .text("signature", signature)
            .part("file", file);

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upload(format!("image host returned {status}: {body}")));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| Error::Upload(format!("unexpected image host response: {e}")))?;
        Ok(StoredImage {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }

    async fn release(&self, public_id: &str) -> Result<()> {
        let timestamp = Utc::now().timestamp();
        let signature = self.sign(&format!("public_id={public_id}&timestamp={timestamp}"));
        let params = [
            ("api_key", self.api_key.clone()),
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp.to_string()),
            ("signature", signature),
        ];

        let response = self
            .client
            .post(&self.destroy_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::StoreUnavailable(format!(
                "image host returned {status}: {body}"
            )));
        }

        let destroyed: DestroyResponse = response
            .json()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("unexpected image host response: {e}")))?;
        // "not found" means the handle is already gone, which is the outcome
        // a release asks for.
        match destroyed.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(Error::StoreUnavailable(format!(
                "image host rejected destroy: {other}"
            ))),
        }
    }
}

// --- In-memory implementation ---

/// In-process image store used by tests and by deployments without image
/// host credentials. URLs are synthetic and not retrievable from outside.
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryImageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, public_id: &str) -> bool {
        self.objects
            .lock()
            .map(|objects| objects.contains_key(public_id))
            .unwrap_or(false)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn upload(&self, bytes: Vec<u8>, _content_type: &str) -> Result<StoredImage> {
        let public_id = format!("notes/{}", Uuid::new_v4().simple());
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| Error::StoreUnavailable("image store lock poisoned".to_string()))?;
        objects.insert(public_id.clone(), bytes);
        Ok(StoredImage {
            url: format!("memory://images/{public_id}"),
            public_id,
        })
    }

    async fn release(&self, public_id: &str) -> Result<()> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| Error::StoreUnavailable("image store lock poisoned".to_string()))?;
        objects.remove(public_id);
        Ok(())
    }
}
