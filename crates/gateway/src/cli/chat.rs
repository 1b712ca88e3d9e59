//! `chatrelay chat`: run one turn against a character and save it.
//!
//! The reply streams to stdout as it arrives.  Ctrl-C cancels the turn, in
//! which case nothing is written.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use cr_domain::message::Message;
use cr_sessions::CharacterStore;

use crate::runtime::{ContinueRequest, TurnEvent};
use crate::state::AppState;

pub struct ChatArgs {
    pub message: String,
    pub user: String,
    pub character: String,
    pub session: Option<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub history: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub json: bool,
}

/// Returns false when the turn did not finish.
pub async fn run(state: AppState, args: ChatArgs) -> anyhow::Result<bool> {
    let mut messages = match &args.history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };
    messages.push(Message::user(args.message));

    let params = match state.characters.get(&args.character).await? {
        Some(record) => record.params,
        None => {
            tracing::warn!(
                character_id = %args.character,
                "character not in store, using default generation params"
            );
            Default::default()
        }
    };

    let mut req = ContinueRequest::new(args.user, args.character, messages);
    req.params = params;
    req.session_id = args.session;
    req.model = args.model;
    req.provider = args.provider;
    req.timeout = args.timeout_secs.map(Duration::from_secs);

    let mut handle = state.service.continue_conversation(req);

    let mut printed = 0usize;
    let mut collected: Vec<TurnEvent> = Vec::new();
    let mut finished = false;

    loop {
        let event = tokio::select! {
            ev = handle.events.recv() => ev,
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                continue;
            }
        };
        let Some(event) = event else { break };

        if args.json {
            finished |= matches!(event, TurnEvent::Final { .. });
            collected.push(event);
            continue;
        }

        match &event {
            TurnEvent::Delta { text } => {
                // Deltas carry the whole reply so far.
                if let Some(fresh) = text.get(printed..) {
                    print!("{fresh}");
                    std::io::stdout().flush().ok();
                }
                printed = text.len();
            }
            TurnEvent::Final { content } => {
                if let Some(fresh) = content.get(printed..) {
                    print!("{fresh}");
                }
                println!();
                finished = true;
            }
            TurnEvent::Saved { session_id, .. } => match session_id {
                Some(id) => eprintln!("session: {id}"),
                None => eprintln!("warning: reply not saved"),
            },
            TurnEvent::Error { message } => eprintln!("error: {message}"),
            TurnEvent::Stopped => eprintln!("turn stopped"),
        }
    }

    if args.json {
        let json = serde_json::to_string_pretty(&collected).context("serializing events")?;
        println!("{json}");
    }

    handle.join().await?;
    Ok(finished)
}

fn load_history(path: &Path) -> anyhow::Result<Vec<Message>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading history {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing history {}", path.display()))
}
