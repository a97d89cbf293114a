pub mod chat;
pub mod client;

pub use chat::{Chat, ChatHistory, ChatSession};
pub use client::{
    CerebrasClient, CerebrasClientError, CerebrasClientErrorKind, CerebrasClientOption,
    CerebrasKey, CerebrasModel, FailureCategory, Message, Role, SamplingParams,
};
