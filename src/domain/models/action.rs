/// Requests flowing from the presentation layer to the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Send(String, Vec<String>),
    Retry(),
    Cancel(),
    Clear(),
    ToggleSearch(),
    Logout(),
}
