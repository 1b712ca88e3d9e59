//! Conversation persistence for chatrelay.
//!
//! Stores for sessions and characters, the upsert resolver that attaches a
//! completed turn to the right session, and the character interaction
//! counter.  Everything here runs only after a turn has finished
//! successfully.

mod json_file;

pub mod characters;
pub mod counter;
pub mod resolver;
pub mod store;

pub use characters::{CharacterStore, JsonCharacterStore};
pub use counter::InteractionCounter;
pub use resolver::{SessionUpsertResolver, TurnRecord, Upserted};
pub use store::{JsonSessionStore, SessionStore};
