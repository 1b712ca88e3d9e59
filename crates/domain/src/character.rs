//! Character data consumed by the completion pipeline.
//!
//! Generation parameters are owned by the character-editing side of the
//! product.  This crate passes them through unchanged and only fills in
//! defaults for values the character never set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sampling parameters as stored on a character.  Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterParams {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Fully resolved sampling parameters sent upstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 1.0,
            top_k: 0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            max_tokens: 200,
        }
    }
}

impl CharacterParams {
    /// Substitute defaults for absent values.  Ranges are not checked.
    pub fn resolve(&self) -> GenerationParams {
        let d = GenerationParams::default();
        GenerationParams {
            temperature: self.temperature.unwrap_or(d.temperature),
            top_p: self.top_p.unwrap_or(d.top_p),
            top_k: self.top_k.unwrap_or(d.top_k),
            frequency_penalty: self.frequency_penalty.unwrap_or(d.frequency_penalty),
            presence_penalty: self.presence_penalty.unwrap_or(d.presence_penalty),
            max_tokens: self.max_tokens.unwrap_or(d.max_tokens),
        }
    }
}

/// A character as seen by this subsystem.  Only the counter fields are
/// ever written here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub params: CharacterParams,
    #[serde(default)]
    pub interaction_count: u64,
    pub updated_at: DateTime<Utc>,
}
