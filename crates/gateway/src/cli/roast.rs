//! `chatrelay roast`: a one-off streamed completion with no session,
//! character, or counter writes.

use std::io::Write;

use cr_domain::character::GenerationParams;
use cr_domain::message::Message;
use cr_providers::CompletionRequest;

use crate::runtime::{CancelToken, Completion};
use crate::state::AppState;

/// Returns false when the completion did not finish.
pub async fn run(
    state: AppState,
    message: String,
    model: Option<String>,
    provider: Option<String>,
) -> anyhow::Result<bool> {
    let request = CompletionRequest {
        messages: vec![Message::user(message)],
        model,
        params: GenerationParams::default(),
    };

    let cancel = CancelToken::new();
    let watcher = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watcher.cancel();
        }
    });

    let mut printed = 0usize;
    let completion = state
        .service
        .complete_once(
            provider.as_deref(),
            request,
            |text| {
                if let Some(fresh) = text.get(printed..) {
                    print!("{fresh}");
                    std::io::stdout().flush().ok();
                }
                printed = text.len();
            },
            &cancel,
        )
        .await;
    ctrl_c.abort();

    match completion? {
        Completion::Finished { .. } => {
            println!();
            Ok(true)
        }
        Completion::Failed { error, .. } => {
            eprintln!("\nerror: {error}");
            Ok(false)
        }
        Completion::Cancelled => {
            eprintln!("\nstopped");
            Ok(false)
        }
    }
}
