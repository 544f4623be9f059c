use super::SessionState;

/// Updates flowing from the conversation to the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Full accumulated text of an assistant message. Within one session the
    /// text only ever grows, except for the final error notice.
    Render { message_id: String, text: String },
    GenerationFinished { message_id: String, state: SessionState },
    Notice(String),
    LoggedOut(),
}
