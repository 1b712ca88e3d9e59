//! `chatrelay sessions`: list what is stored for a user and character.

use cr_sessions::SessionStore;

use crate::state::AppState;

pub async fn list(state: AppState, user: &str, character: &str, json: bool) -> anyhow::Result<()> {
    let sessions = state.sessions.list_for(user, character).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("no sessions for {user} / {character}");
        return Ok(());
    }

    for s in &sessions {
        println!(
            "{}  turns={:<4} messages={:<4} updated={}",
            s.id,
            s.interaction_count,
            s.messages.len(),
            s.updated_at.to_rfc3339(),
        );
    }
    Ok(())
}
