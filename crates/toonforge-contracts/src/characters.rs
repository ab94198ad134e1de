use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{JsonFile, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub created_at: String,
}

/// Editable fields of a character.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterDraft {
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
}

/// Lookup side of the character registry, as used by generation.
pub trait CharacterRegistry: Send + Sync {
    fn resolve(&self, id: &str) -> Result<Option<Character>, StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CharacterBook {
    #[serde(default)]
    characters: Vec<Character>,
}

/// `characters.json` backed registry with plain create/read/update/delete.
#[derive(Debug)]
pub struct CharacterStore {
    file: JsonFile<CharacterBook>,
}

impl CharacterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn create(&self, draft: CharacterDraft) -> Result<Character, StoreError> {
        let draft = validated(draft)?;
        let character = Character {
            id: Uuid::new_v4().to_string(),
            name: draft.name,
            description: draft.description,
            image_url: draft.image_url,
            created_at: now_utc_iso(),
        };
        self.file.update(|book| {
            book.characters.push(character.clone());
            Ok(())
        })?;
        Ok(character)
    }

    /// Newest first.
    pub fn list(&self) -> Result<Vec<Character>, StoreError> {
        let mut rows = self.file.read()?.characters;
        rows.reverse();
        Ok(rows)
    }

    pub fn get(&self, id: &str) -> Result<Option<Character>, StoreError> {
        Ok(self
            .file
            .read()?
            .characters
            .into_iter()
            .find(|row| row.id == id))
    }

    pub fn update(&self, id: &str, draft: CharacterDraft) -> Result<Character, StoreError> {
        let draft = validated(draft)?;
        self.file.update(|book| {
            let row = book
                .characters
                .iter_mut()
                .find(|row| row.id == id)
                .ok_or_else(|| StoreError::NotFound(format!("character {id}")))?;
            row.name = draft.name;
            row.description = draft.description;
            row.image_url = draft.image_url;
            Ok(row.clone())
        })
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.file.update(|book| {
            let before = book.characters.len();
            book.characters.retain(|row| row.id != id);
            if book.characters.len() == before {
                return Err(StoreError::NotFound(format!("character {id}")));
            }
            Ok(())
        })
    }
}

impl CharacterRegistry for CharacterStore {
    fn resolve(&self, id: &str) -> Result<Option<Character>, StoreError> {
        self.get(id)
    }
}

fn validated(mut draft: CharacterDraft) -> Result<CharacterDraft, StoreError> {
    draft.name = draft.name.trim().to_string();
    if draft.name.is_empty() {
        return Err(StoreError::Rejected("character name is required".to_string()));
    }
    draft.image_url = draft
        .image_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    Ok(draft)
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
