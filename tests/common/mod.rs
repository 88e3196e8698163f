use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use jotter::config::DEFAULT_MAX_IMAGE_BYTES;
use jotter::error::Error;
use jotter::image_store::{ImageStore, MemoryImageStore, StoredImage};
use jotter::lifecycle::{ImageUpload, NoteService};
use jotter::note::NoteDraft;
use opendal::services::Memory;
use opendal::Operator;

#[allow(dead_code)]
pub fn setup_operator() -> Result<Operator> {
    let op = Operator::new(Memory::default())?.finish();
    Ok(op)
}

#[allow(dead_code)]
pub fn setup_service() -> Result<(NoteService, Arc<MemoryImageStore>, Operator)> {
    let op = setup_operator()?;
    let images = Arc::new(MemoryImageStore::new());
    let service = NoteService::new(op.clone(), images.clone(), DEFAULT_MAX_IMAGE_BYTES);
    Ok((service, images, op))
}

#[allow(dead_code)]
pub fn draft(title: &str, content: &str) -> NoteDraft {
    NoteDraft {
        title: title.to_string(),
        content: content.to_string(),
        subtitle: None,
    }
}

#[allow(dead_code)]
pub fn png_upload(len: usize) -> ImageUpload {
    ImageUpload {
        bytes: vec![0x89; len],
        content_type: "image/png".to_string(),
    }
}

/// Image store whose uploads always fail, recording every release it sees.
#[allow(dead_code)]
#[derive(Default)]
pub struct RejectingImageStore {
    pub released: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl ImageStore for RejectingImageStore {
    async fn upload(&self, _bytes: Vec<u8>, _content_type: &str) -> jotter::error::Result<StoredImage> {
        Err(Error::Upload("simulated image host outage".to_string()))
    }

    async fn release(&self, public_id: &str) -> jotter::error::Result<()> {
        self.released.lock().unwrap().push(public_id.to_string());
        Ok(())
    }
}

/// Image store that uploads normally but can never release.
#[allow(dead_code)]
#[derive(Default)]
pub struct UnreleasableImageStore {
    pub inner: MemoryImageStore,
}

#[async_trait]
impl ImageStore for UnreleasableImageStore {
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> jotter::error::Result<StoredImage> {
        self.inner.upload(bytes, content_type).await
    }

    async fn release(&self, _public_id: &str) -> jotter::error::Result<()> {
        Err(Error::StoreUnavailable("simulated image host outage".to_string()))
    }
}
