use serde_derive::Deserialize;
use serde_derive::Serialize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SessionState {
    Idle,
    Opening,
    Streaming,
    Completed,
    Errored,
    Canceled,
}

