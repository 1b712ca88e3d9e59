//! Character interaction counter.

use std::sync::Arc;

use chrono::Utc;

use cr_domain::error::{Error, Result};
use cr_domain::trace::TraceEvent;

use crate::characters::CharacterStore;

pub struct InteractionCounter {
    characters: Arc<dyn CharacterStore>,
}

impl InteractionCounter {
    pub fn new(characters: Arc<dyn CharacterStore>) -> Self {
        Self { characters }
    }

    /// Increment the character's interaction count and touch its
    /// `updated_at`.  Returns the new count.
    ///
    /// The read and the write are separate store calls, so two concurrent
    /// bumps of one character can lose an increment.  Callers that run turns
    /// in parallel must hold a per-character lock around this call.
    pub async fn bump(&self, character_id: &str) -> Result<u64> {
        let record = self
            .characters
            .get(character_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("character {character_id}")))?;

        let count = record.interaction_count + 1;
        self.characters
            .update_interactions(character_id, count, Utc::now())
            .await?;

        TraceEvent::InteractionCounted {
            character_id: character_id.to_owned(),
            interaction_count: count,
        }
        .emit();
        Ok(count)
    }
}
