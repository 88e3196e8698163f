use std::collections::HashMap;
use std::sync::Arc;

use opendal::Operator;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{Error, Result};
use crate::image_store::ImageStore;
use crate::note::{self, ImageChange, Note, NoteDraft};

/// An image file taken from a request, before validation and upload.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

const ACCEPTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png"];

/// Orchestrates the note repository and the image store so a note's image
/// field and the hosted asset never diverge.
///
/// Per note id the image association moves between two states, no image and
/// one owned image. Replacing releases the old object before uploading the
/// new one; deleting releases before removing the record. Upload-then-persist
/// is not atomic: if the record write fails after an upload, the uploaded
/// object is orphaned and logged, not rolled back.
pub struct NoteService {
    op: Operator,
    images: Arc<dyn ImageStore>,
    max_image_bytes: usize,
    /// Serializes update/delete per note id. In-process only: with several
    /// service instances, concurrent mutations of one id fall back to
    /// last-write-wins.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NoteService {
    pub fn new(op: Operator, images: Arc<dyn ImageStore>, max_image_bytes: usize) -> Self {
        Self {
            op,
            images,
            max_image_bytes,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn list(&self) -> Result<Vec<Note>> {
        note::list_notes(&self.op).await
    }

    pub async fn get(&self, id: &str) -> Result<Note> {
        note::get_note(&self.op, id).await
    }

    pub async fn create(&self, draft: NoteDraft, upload: Option<ImageUpload>) -> Result<Note> {
        validate_draft(&draft)?;
        let image = match upload {
            Some(upload) => {
                self.validate_upload(&upload)?;
                Some(self.images.upload(upload.bytes, &upload.content_type).await?)
            }
            None => None,
        };

        match note::insert_note(&self.op, draft, image.clone().map(Into::into)).await {
            Ok(note) => Ok(note),
            Err(err) => {
                if let Some(image) = image {
                    warn!(
                        public_id = %image.public_id,
                        "orphaned image: note insert failed after upload"
                    );
                }
                Err(err)
            }
        }
    }

    pub async fn update(
        &self,
        id: &str,
        draft: NoteDraft,
        upload: Option<ImageUpload>,
    ) -> Result<Note> {
        validate_draft(&draft)?;
        if let Some(upload) = &upload {
            self.validate_upload(upload)?;
        }

        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let current = note::get_note(&self.op, id).await?;
        let change = match upload {
            Some(upload) => {
                // Release the old object before uploading the replacement so
                // the note never owns more than one stored image, even if
                // the upload then fails. The failure case leaves a window
                // where the record still names the released handle.
                if let Some(old) = &current.image {
                    self.release_or_log(&old.public_id).await;
                }
                let stored = self.images.upload(upload.bytes, &upload.content_type).await?;
                ImageChange::Replace(stored.into())
            }
            None => ImageChange::Keep,
        };

        note::update_note(&self.op, id, draft, change).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let current = note::get_note(&self.op, id).await?;
        // Release first: if the record delete then fails, the row dangles
        // without an image but storage cost is already reclaimed.
        if let Some(image) = &current.image {
            self.release_or_log(&image.public_id).await;
        }
        note::delete_note(&self.op, id).await
    }

    /// A failed release is an orphaned resource, never a failed operation.
    async fn release_or_log(&self, public_id: &str) {
        if let Err(err) = self.images.release(public_id).await {
            warn!(public_id, error = %err, "orphaned image: release failed");
        }
    }

    async fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        // Entries are never evicted; the map is bounded by the number of
        // distinct ids ever mutated, small at this service's scale.
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn validate_upload(&self, upload: &ImageUpload) -> Result<()> {
        if upload.bytes.len() > self.max_image_bytes {
            return Err(Error::validation(format!(
                "image is too large, the limit is {} MiB",
                self.max_image_bytes / (1024 * 1024)
            )));
        }
        if !ACCEPTED_IMAGE_TYPES.contains(&upload.content_type.as_str()) {
            return Err(Error::validation(format!(
                "unsupported image type {}, expected JPEG or PNG",
                upload.content_type
            )));
        }
        Ok(())
    }
}

fn validate_draft(draft: &NoteDraft) -> Result<()> {
    if draft.title.trim().is_empty() {
        return Err(Error::validation("title is required"));
    }
    if draft.content.trim().is_empty() {
        return Err(Error::validation("content is required"));
    }
    Ok(())
}
