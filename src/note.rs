use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use opendal::{EntryMode, Operator};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

const COLLECTION: &str = "notes/";

/// The `{url, public_id}` pair linking a note to its hosted image. Both
/// fields are always present together; a note without an image has no
/// association at all.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NoteImage {
    pub url: String,
    pub public_id: String,
}

/// The persisted note document. Serialized shape matches the wire shape,
/// with optional fields omitted entirely when absent.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<NoteImage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Text fields of a create or update request, before the repository attaches
/// an id and timestamps.
#[derive(Debug, Clone)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub subtitle: Option<String>,
}

/// What an update does to the note's image association. There is no clear
/// operation: an owned image is only ever replaced, never detached.
#[derive(Debug, Clone)]
pub enum ImageChange {
    Keep,
    Replace(NoteImage),
}

fn note_path(id: &str) -> String {
    format!("{COLLECTION}{id}.json")
}

/// Ids are opaque tokens assigned by [`insert_note`]. Anything that could
/// escape the collection prefix is treated as an absent id rather than a
/// storage error.
fn checked_id(id: &str) -> Result<&str> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        Ok(id)
    } else {
        Err(Error::not_found(id))
    }
}

/// Returns every note, newest `createdAt` first.
///
/// The result set is unbounded; fine at the scale this service targets, and
/// the first thing to revisit if the collection grows.
pub async fn list_notes(op: &Operator) -> Result<Vec<Note>> {
    if !op.exists(COLLECTION).await? {
        return Ok(vec![]);
    }

    let mut lister = op.lister(COLLECTION).await?;
    let mut notes = Vec::new();

    while let Some(entry) = lister.try_next().await? {
        if entry.metadata().mode() != EntryMode::FILE {
            continue;
        }
        let bytes = op.read(entry.path()).await?;
        let note: Note = serde_json::from_slice(&bytes.to_vec())?;
        notes.push(note);
    }

    notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(notes)
}

pub async fn get_note(op: &Operator, id: &str) -> Result<Note> {
    let path = note_path(checked_id(id)?);
    if !op.exists(&path).await? {
        return Err(Error::not_found(id));
    }
    let bytes = op.read(&path).await?;
    let note: Note = serde_json::from_slice(&bytes.to_vec())?;
    Ok(note)
}

/// Assigns an id and timestamps, persists the document and returns it.
pub async fn insert_note(op: &Operator, draft: NoteDraft, image: Option<NoteImage>) -> Result<Note> {
    op.create_dir(COLLECTION).await?;

    let now = Utc::now();
    let note = Note {
        id: Uuid::new_v4().simple().to_string(),
        title: draft.title,
        content: draft.content,
        subtitle: draft.subtitle,
        image,
        created_at: now,
        updated_at: now,
    };

    op.write(&note_path(&note.id), serde_json::to_vec_pretty(&note)?)
        .await?;
    Ok(note)
}

/// Loads the existing note, applies the draft and image change, refreshes
/// `updatedAt` and persists. `createdAt` and `id` never change.
pub async fn update_note(
    op: &Operator,
    id: &str,
    draft: NoteDraft,
    change: ImageChange,
) -> Result<Note> {
    let mut note = get_note(op, id).await?;

    note.title = draft.title;
    note.content = draft.content;
    note.subtitle = draft.subtitle;
    if let ImageChange::Replace(image) = change {
        note.image = Some(image);
    }
    note.updated_at = Utc::now();

    op.write(&note_path(&note.id), serde_json::to_vec_pretty(&note)?)
        .await?;
    Ok(note)
}

pub async fn delete_note(op: &Operator, id: &str) -> Result<()> {
    let path = note_path(checked_id(id)?);
    if !op.exists(&path).await? {
        return Err(Error::not_found(id));
    }
    op.delete(&path).await?;
    Ok(())
}
