#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;

use std::io;
use std::io::Write;
use std::path;
use std::sync::Arc;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Result;
use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use dialoguer::Password;
use tokio::fs;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use yansi::Paint;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Action;
use crate::domain::models::Event;
use crate::domain::models::Role;
use crate::domain::models::Scope;
use crate::domain::models::SessionState;
use crate::domain::models::SlashCommand;
use crate::domain::models::Store;
use crate::domain::models::StoreKey;
use crate::domain::models::Transcript;
use crate::domain::services::actions::help_text;
use crate::domain::services::actions::ActionsService;
use crate::domain::services::AppContext;
use crate::domain::services::Conversation;
use crate::domain::services::ConversationSettings;
use crate::infrastructure::store::LocalStore;
use crate::infrastructure::transport::RelayClient;

const LOGIN_ATTEMPTS: usize = 3;

/// Writes streamed answers to a terminal. Published text only grows within a
/// message, so only the new suffix is printed.
pub struct TerminalRenderer<W: Write> {
    out: W,
    colored: bool,
    message_id: Option<String>,
    printed: String,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, colored: bool) -> TerminalRenderer<W> {
        return TerminalRenderer {
            out,
            colored,
            message_id: None,
            printed: "".to_string(),
        };
    }

    fn label(&self, role: Role) -> String {
        let label = match role {
            Role::User => "you: ",
            Role::Assistant => "tyren: ",
        };

        if !self.colored {
            return label.to_string();
        }
        if role == Role::User {
            return Paint::green(label).bold().to_string();
        }
        return Paint::cyan(label).bold().to_string();
    }

    pub fn history(&mut self, transcript: &Transcript) -> io::Result<()> {
        for message in transcript.messages.iter() {
            // Left behind when the app exited before any text arrived.
            if message.is_placeholder() {
                continue;
            }

            let mut content = message.content.to_string();
            if !message.images.is_empty() {
                content = format!("[{} image(s)] {content}", message.images.len());
            }
            let label = self.label(message.role);
            writeln!(self.out, "{label}{}", content.trim_end())?;
        }

        return self.out.flush();
    }

    pub fn render(&mut self, message_id: &str, text: &str) -> io::Result<()> {
        if self.message_id.as_deref() != Some(message_id) {
            self.message_id = Some(message_id.to_string());
            self.printed = "".to_string();
            let label = self.label(Role::Assistant);
            write!(self.out, "{label}")?;
        }

        match text.strip_prefix(self.printed.as_str()) {
            Some(delta) => write!(self.out, "{delta}")?,
            // Only the final error notice may rewrite what was shown.
            None => write!(self.out, "\n{text}")?,
        }
        self.printed = text.to_string();

        return self.out.flush();
    }

    pub fn finish(&mut self, message_id: &str, state: SessionState) -> io::Result<()> {
        if self.message_id.as_deref() != Some(message_id) {
            // Nothing streamed in before the session ended.
            let label = self.label(Role::Assistant);
            write!(self.out, "{label}")?;
        }
        if state == SessionState::Canceled {
            write!(self.out, " [stopped]")?;
        }

        writeln!(self.out)?;
        self.message_id = None;
        self.printed = "".to_string();
        return self.out.flush();
    }

    pub fn notice(&mut self, text: &str) -> io::Result<()> {
        if self.colored {
            writeln!(self.out, "{}", Paint::yellow(text))?;
        } else {
            writeln!(self.out, "{text}")?;
        }

        return self.out.flush();
    }
}

/// A line typed by the user, resolved to what the chat should do with it.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Nothing,
    Quit,
    Help,
    Act(Action),
}

pub fn image_mime_type(file_path: &path::Path) -> Option<&'static str> {
    let extension = file_path.extension()?.to_str()?.to_lowercase();
    match extension.as_str() {
        "png" => return Some("image/png"),
        "jpg" | "jpeg" => return Some("image/jpeg"),
        "gif" => return Some("image/gif"),
        "webp" => return Some("image/webp"),
        "heic" => return Some("image/heic"),
        "heif" => return Some("image/heif"),
        _ => return None,
    }
}

/// Reads a local image into a `data:<mime>;base64,<data>` URI.
pub async fn image_data_uri(file_path: &path::Path) -> Result<String> {
    let mime_type = image_mime_type(file_path).ok_or_else(|| {
        return anyhow!(
            "Unsupported image type for {}, use png, jpeg, gif, webp or heic.",
            file_path.display()
        );
    })?;

    let bytes = fs::read(file_path)
        .await
        .map_err(|err| return anyhow!("Failed to read {}: {err}", file_path.display()))?;

    return Ok(format!("data:{mime_type};base64,{}", b64.encode(bytes)));
}

pub async fn read_input(line: &str) -> Result<Input> {
    let text = line.trim();
    if text.is_empty() {
        return Ok(Input::Nothing);
    }

    let cmd = match SlashCommand::parse(text) {
        Some(cmd) => cmd,
        None => return Ok(Input::Act(Action::Send(text.to_string(), vec![]))),
    };

    if cmd.is_quit() {
        return Ok(Input::Quit);
    }
    if cmd.is_help() {
        return Ok(Input::Help);
    }
    if cmd.is_retry() {
        return Ok(Input::Act(Action::Retry()));
    }
    if cmd.is_stop() {
        return Ok(Input::Act(Action::Cancel()));
    }
    if cmd.is_clear() {
        return Ok(Input::Act(Action::Clear()));
    }
    if cmd.is_search() {
        return Ok(Input::Act(Action::ToggleSearch()));
    }
    if cmd.is_logout() {
        return Ok(Input::Act(Action::Logout()));
    }

    let image = image_data_uri(path::Path::new(&cmd.args[0])).await?;
    let prompt = cmd.args[1..].join(" ");
    return Ok(Input::Act(Action::Send(prompt, vec![image])));
}

fn prompt_password() -> Result<(String, bool)> {
    let theme = ColorfulTheme::default();
    let password = Password::with_theme(&theme)
        .with_prompt("Password")
        .interact()?;
    let remember = Confirm::with_theme(&theme)
        .with_prompt("Stay logged in on this device?")
        .default(true)
        .interact()?;

    return Ok((password, remember));
}

/// Asks for the shared password until the relay hands out a credential.
async fn login(client: &RelayClient, store: &dyn Store) -> Result<String> {
    for attempt in 1..=LOGIN_ATTEMPTS {
        let (password, remember) = tokio::task::spawn_blocking(prompt_password).await??;

        match client.login(&password).await {
            Ok(token) => {
                let scope = if remember {
                    Scope::Persistent
                } else {
                    Scope::Session
                };
                store.set(StoreKey::AuthToken, &token, scope).await?;

                tracing::info!(attempt, remember, "Logged in");
                return Ok(token);
            }
            Err(err) => {
                tracing::warn!(attempt, error = ?err, "Login failed");
                eprintln!("{}", Paint::red(err.to_string()));
            }
        }
    }

    bail!("Login failed {LOGIN_ATTEMPTS} times, giving up.");
}

pub async fn logout() -> Result<()> {
    LocalStore::default().remove(StoreKey::AuthToken).await?;
    println!("Logged out.");
    return Ok(());
}

fn settings() -> Result<ConversationSettings> {
    return Ok(ConversationSettings {
        history_window: Config::parse::<usize>(ConfigKey::HistoryWindow)?,
        render_interval: Config::millis(ConfigKey::RenderInterval)?,
        save_debounce: Config::millis(ConfigKey::SaveDebounce)?,
    });
}

pub async fn start() -> Result<()> {
    let store: Arc<dyn Store> = Arc::new(LocalStore::default());
    let client = Arc::new(RelayClient::default());

    let mut context = AppContext::load(store.clone()).await;
    if context.credential.is_none() {
        context.credential = Some(login(&client, store.as_ref()).await?);
    }

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
    let conversation = Arc::new(Conversation::new(
        context,
        client,
        event_tx.clone(),
        settings()?,
    ));

    let mut renderer = TerminalRenderer::new(io::stdout(), true);
    renderer.history(&conversation.transcript())?;
    renderer.notice("Type a message, or /help for commands.")?;

    let worker_conversation = conversation.clone();
    let actions = tokio::spawn(async move {
        return ActionsService::start(worker_conversation, event_tx, &mut action_rx).await;
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if conversation.is_busy() {
                    action_tx.send(Action::Cancel())?;
                    continue;
                }
                break;
            }
            event = event_rx.recv() => {
                match event {
                    Some(Event::Render { message_id, text }) => renderer.render(&message_id, &text)?,
                    Some(Event::GenerationFinished { message_id, state }) => {
                        renderer.finish(&message_id, state)?;
                    }
                    Some(Event::Notice(text)) => renderer.notice(&text)?,
                    Some(Event::LoggedOut()) => {
                        renderer.notice("Logged out. Run `tyren chat` to log in again.")?;
                        break;
                    }
                    None => break,
                }
            }
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };

                match read_input(&line).await {
                    Ok(Input::Nothing) => {}
                    Ok(Input::Quit) => break,
                    Ok(Input::Help) => renderer.notice(&help_text())?,
                    Ok(Input::Act(action)) => action_tx.send(action)?,
                    Err(err) => renderer.notice(&err.to_string())?,
                }
            }
        }
    }

    conversation.cancel();
    drop(action_tx);
    actions.await??;

    return Ok(());
}
