//! Character store: read access to character records and the one write
//! this subsystem performs on them, the interaction counter.

use std::path::Path;

use chrono::{DateTime, Utc};

use cr_domain::character::CharacterRecord;
use cr_domain::error::{Error, Result};

use crate::json_file::JsonMapFile;

#[async_trait::async_trait]
pub trait CharacterStore: Send + Sync {
    async fn get(&self, character_id: &str) -> Result<Option<CharacterRecord>>;

    /// Set the interaction counter and timestamp of an existing character.
    async fn update_interactions(
        &self,
        character_id: &str,
        interaction_count: u64,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Character records persisted to `characters/characters.json`.
pub struct JsonCharacterStore {
    file: JsonMapFile<CharacterRecord>,
}

impl JsonCharacterStore {
    pub fn open(state_path: &Path) -> Result<Self> {
        let file = JsonMapFile::open(state_path.join("characters").join("characters.json"))?;
        tracing::info!(characters = file.len(), "character store loaded");
        Ok(Self { file })
    }

    pub fn in_memory() -> Self {
        Self {
            file: JsonMapFile::in_memory(),
        }
    }

    /// Insert or replace a record.  Character editing lives elsewhere; this
    /// exists for seeding and tests.
    pub async fn upsert(&self, record: CharacterRecord) -> Result<()> {
        self.file
            .write(move |map| {
                map.insert(record.id.clone(), record);
                Ok(())
            })
            .await
    }
}

#[async_trait::async_trait]
impl CharacterStore for JsonCharacterStore {
    async fn get(&self, character_id: &str) -> Result<Option<CharacterRecord>> {
        Ok(self.file.get(character_id))
    }

    async fn update_interactions(
        &self,
        character_id: &str,
        interaction_count: u64,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let id = character_id.to_owned();
        self.file
            .write(move |map| match map.get_mut(&id) {
                Some(record) => {
                    record.interaction_count = interaction_count;
                    record.updated_at = updated_at;
                    Ok(())
                }
                None => Err(Error::NotFound(format!("character {id}"))),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cr_domain::character::CharacterParams;

    fn record(id: &str, count: u64) -> CharacterRecord {
        CharacterRecord {
            id: id.into(),
            name: "Ada".into(),
            params: CharacterParams::default(),
            interaction_count: count,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn update_interactions_writes_count_and_time() {
        let store = JsonCharacterStore::in_memory();
        store.upsert(record("c1", 3)).await.unwrap();
        let t = Utc::now();
        store.update_interactions("c1", 4, t).await.unwrap();
        let r = store.get("c1").await.unwrap().unwrap();
        assert_eq!(r.interaction_count, 4);
        assert_eq!(r.updated_at, t);
    }

    #[tokio::test]
    async fn missing_character_is_not_found() {
        let store = JsonCharacterStore::in_memory();
        let err = store
            .update_interactions("ghost", 1, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
