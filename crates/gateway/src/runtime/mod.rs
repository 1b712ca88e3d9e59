//! Core runtime: the completion relay and the turn orchestrator built on
//! it, plus the cancellation and locking they share.

pub mod cancel;
pub mod relay;
pub mod session_lock;
pub mod turn;

pub use cancel::{CancelMap, CancelToken};
pub use relay::{Completion, CompletionRelay, RelayConfig};
pub use session_lock::{CharacterLocks, ConversationLocks, KeyedLocks};
pub use turn::{ContinueRequest, ConversationService, TurnEvent, TurnHandle, TurnOutcome};
