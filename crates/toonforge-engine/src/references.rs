use std::fs;
use std::path::{Path, PathBuf};

use toonforge_contracts::characters::{Character, CharacterRegistry};
use toonforge_contracts::records::CharacterSnapshot;
use toonforge_contracts::store::StoreError;
use tracing::{debug, warn};

use crate::artifacts::mime_for_path;
use crate::error::ReferenceError;

/// Binary image payload bound for the outgoing provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Everything the loader resolved, in input order.
#[derive(Debug, Default)]
pub struct CharacterReferences {
    pub characters: Vec<CharacterSnapshot>,
    pub images: Vec<ImagePart>,
    /// Ids with no matching character.
    pub unresolved: Vec<String>,
    /// Reference images that were skipped.
    pub issues: Vec<ReferenceError>,
}

pub struct ReferenceLoader<'a> {
    registry: &'a dyn CharacterRegistry,
    public_dir: &'a Path,
}

impl<'a> ReferenceLoader<'a> {
    pub fn new(registry: &'a dyn CharacterRegistry, public_dir: &'a Path) -> Self {
        Self {
            registry,
            public_dir,
        }
    }

    /// Resolves each id independently; duplicates are resolved twice.
    ///
    /// Unknown ids and unreadable images are skipped. Only a failing registry
    /// lookup is an error.
    pub fn load(&self, ids: &[String]) -> Result<CharacterReferences, StoreError> {
        let mut out = CharacterReferences::default();
        for id in ids {
            let Some(character) = self.registry.resolve(id)? else {
                debug!(character_id = %id, "character not found; skipping");
                out.unresolved.push(id.clone());
                continue;
            };
            if let Some(pointer) = character.image_url.as_deref() {
                match self.read_image(&character.id, pointer) {
                    Ok(part) => out.images.push(part),
                    Err(issue) => {
                        warn!(error = %issue, "skipping character reference image");
                        out.issues.push(issue);
                    }
                }
            }
            out.characters.push(snapshot(character));
        }
        Ok(out)
    }

    fn read_image(&self, character_id: &str, pointer: &str) -> Result<ImagePart, ReferenceError> {
        let lowered = pointer.to_ascii_lowercase();
        if lowered.starts_with("http://")
            || lowered.starts_with("https://")
            || lowered.starts_with("data:")
        {
            return Err(ReferenceError::NotLocal {
                character_id: character_id.to_string(),
                pointer: pointer.to_string(),
            });
        }

        let candidates = self.candidate_paths(pointer);
        let mut first_error = None;
        for path in candidates {
            match fs::read(&path) {
                Ok(bytes) => {
                    let media_type = mime_for_path(&path).unwrap_or("image/png").to_string();
                    return Ok(ImagePart { media_type, bytes });
                }
                Err(source) => {
                    if first_error.is_none() {
                        first_error = Some((path, source));
                    }
                }
            }
        }
        let (path, source) = first_error.unwrap_or_else(|| {
            (
                PathBuf::from(pointer),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )
        });
        Err(ReferenceError::Unreadable {
            character_id: character_id.to_string(),
            path,
            source,
        })
    }

    /// `/uploads/a.png` is tried under the public directory first; absolute
    /// filesystem paths are tried as-is afterwards.
    fn candidate_paths(&self, pointer: &str) -> Vec<PathBuf> {
        let mut out = vec![self.public_dir.join(pointer.trim_start_matches('/'))];
        let literal = PathBuf::from(pointer);
        if literal.is_absolute() && !out.contains(&literal) {
            out.push(literal);
        }
        out
    }
}

fn snapshot(character: Character) -> CharacterSnapshot {
    CharacterSnapshot {
        id: character.id,
        name: character.name,
        description: character.description,
    }
}

#[cfg(test)]
mod tests {
    use toonforge_contracts::characters::{CharacterDraft, CharacterStore};

    use super::*;

    fn add(store: &CharacterStore, name: &str, description: &str, image: Option<&str>) -> String {
        store
            .create(CharacterDraft {
                name: name.to_string(),
                description: description.to_string(),
                image_url: image.map(str::to_string),
            })
            .map(|row| row.id)
            .unwrap_or_default()
    }

    #[test]
    fn empty_input_yields_empty_context() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = CharacterStore::new(temp.path().join("characters.json"));
        let loaded = ReferenceLoader::new(&store, temp.path()).load(&[])?;
        assert!(loaded.characters.is_empty());
        assert!(loaded.images.is_empty());
        assert!(loaded.issues.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_ids_are_skipped_and_order_is_kept() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let public = temp.path().join("public");
        std::fs::create_dir_all(public.join("uploads"))?;
        std::fs::write(public.join("uploads").join("aria.png"), b"aria-bytes")?;
        std::fs::write(public.join("uploads").join("bram.jpg"), b"bram-bytes")?;

        let store = CharacterStore::new(temp.path().join("characters.json"));
        let aria = add(&store, "Aria", "silver hair, red coat", Some("/uploads/aria.png"));
        let bram = add(&store, "Bram", "scarred knight", Some("/uploads/bram.jpg"));

        let ids = vec![bram.clone(), "ghost-1".to_string(), aria.clone()];
        let loaded = ReferenceLoader::new(&store, &public).load(&ids)?;

        let names: Vec<&str> = loaded.characters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Bram", "Aria"]);
        assert_eq!(loaded.unresolved, vec!["ghost-1".to_string()]);
        assert_eq!(loaded.images.len(), 2);
        assert_eq!(loaded.images[0].bytes, b"bram-bytes");
        assert_eq!(loaded.images[0].media_type, "image/jpeg");
        assert_eq!(loaded.images[1].bytes, b"aria-bytes");
        assert_eq!(loaded.images[1].media_type, "image/png");
        Ok(())
    }

    #[test]
    fn duplicates_are_processed_independently() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = CharacterStore::new(temp.path().join("characters.json"));
        let aria = add(&store, "Aria", "silver hair", None);

        let loaded = ReferenceLoader::new(&store, temp.path()).load(&[aria.clone(), aria])?;
        assert_eq!(loaded.characters.len(), 2);
        assert!(loaded.images.is_empty());
        Ok(())
    }

    #[test]
    fn missing_image_file_keeps_character_text() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = CharacterStore::new(temp.path().join("characters.json"));
        let aria = add(&store, "Aria", "silver hair", Some("/uploads/gone.png"));
        let remote = add(&store, "Cyd", "android", Some("https://cdn.example/cyd.png"));

        let loaded = ReferenceLoader::new(&store, temp.path()).load(&[aria, remote])?;
        assert_eq!(loaded.characters.len(), 2);
        assert!(loaded.images.is_empty());
        assert_eq!(loaded.issues.len(), 2);
        assert!(matches!(loaded.issues[0], ReferenceError::Unreadable { .. }));
        assert!(matches!(loaded.issues[1], ReferenceError::NotLocal { .. }));
        Ok(())
    }

    #[test]
    fn absolute_paths_outside_public_dir_are_read() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let outside = temp.path().join("elsewhere.webp");
        std::fs::write(&outside, b"webp-bytes")?;
        let store = CharacterStore::new(temp.path().join("characters.json"));
        let pointer = outside.to_string_lossy().to_string();
        let id = add(&store, "Dee", "courier", Some(&pointer));

        let loaded = ReferenceLoader::new(&store, &temp.path().join("public")).load(&[id])?;
        assert_eq!(loaded.images.len(), 1);
        assert_eq!(loaded.images[0].media_type, "image/webp");
        Ok(())
    }
}
