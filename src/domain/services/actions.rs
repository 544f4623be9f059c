#[cfg(test)]
#[path = "actions_test.rs"]
mod tests;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use super::Conversation;
use super::SendOutcome;
use crate::domain::models::Action;
use crate::domain::models::Event;

pub fn help_text() -> String {
    let text = r#"
COMMANDS:
- /image (/i) [PATH] [PROMPT?] - Sends an image file along with an optional prompt. Without a prompt the model describes the image.
- /retry (/r) - Resends your last message, replacing the previous answer.
- /stop (/s) - Stops the answer currently streaming in. Whatever arrived so far is kept.
- /search - Toggles grounding answers with web search. The setting is remembered.
- /clear (/c) - Clears the chat history.
- /logout - Forgets the stored credential on this device.
- /quit /exit (/q) - Exit Tyren.
- /help (/h) - Provides this help menu.

HOTKEYS:
- CTRL+C - Stop the answer currently streaming in, otherwise exit.
        "#;

    return text.trim().to_string();
}

fn notice(tx: &mpsc::UnboundedSender<Event>, text: &str) -> Result<()> {
    tx.send(Event::Notice(text.to_string()))?;
    return Ok(());
}

fn report_outcome(tx: &mpsc::UnboundedSender<Event>, outcome: SendOutcome) -> Result<()> {
    match outcome {
        SendOutcome::Rejected => {
            notice(tx, "Still answering, use /stop to cancel the current response.")?;
        }
        SendOutcome::Ignored | SendOutcome::Finished(_) => {}
    }

    return Ok(());
}

/// Runs actions coming from the presentation layer against the
/// conversation. Generations run on their own task so the loop stays free to
/// receive a cancel while one is streaming.
pub struct ActionsService {}

impl ActionsService {
    pub async fn start(
        conversation: Arc<Conversation>,
        tx: mpsc::UnboundedSender<Event>,
        rx: &mut mpsc::UnboundedReceiver<Action>,
    ) -> Result<()> {
        while let Some(action) = rx.recv().await {
            let worker_tx = tx.clone();
            let worker_conversation = conversation.clone();

            match action {
                Action::Send(content, images) => {
                    tokio::spawn(async move {
                        let outcome = worker_conversation.send(&content, images).await;
                        return report_outcome(&worker_tx, outcome);
                    });
                }
                Action::Retry() => {
                    tokio::spawn(async move {
                        let outcome = worker_conversation.retry().await;
                        if outcome == SendOutcome::Ignored {
                            return notice(&worker_tx, "There is no message to retry.");
                        }
                        return report_outcome(&worker_tx, outcome);
                    });
                }
                Action::Cancel() => {
                    if !conversation.cancel() {
                        notice(&tx, "Nothing to stop.")?;
                    }
                }
                Action::Clear() => {
                    if conversation.clear() {
                        notice(&tx, "Chat history cleared.")?;
                    } else {
                        notice(&tx, "Stop the current response before clearing.")?;
                    }
                }
                Action::ToggleSearch() => {
                    if conversation.toggle_search().await {
                        notice(&tx, "Web search enabled.")?;
                    } else {
                        notice(&tx, "Web search disabled.")?;
                    }
                }
                Action::Logout() => {
                    conversation.logout().await;
                }
            }
        }

        conversation.flush().await;
        return Ok(());
    }
}
