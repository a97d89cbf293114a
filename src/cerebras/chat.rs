use super::client::{Message, Result, Role};

/// Anything that can turn a transcript into the next assistant message.
pub trait Chat {
    fn chat(&mut self, messages: &[Message]) -> Result<String>;
}

/// Ordered transcript of the current session. Turns are only ever appended;
/// the single exception is dropping the user turn of a request that failed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatHistory {
    inner: Vec<Message>,
}
impl ChatHistory {
    pub fn new() -> Self {
        Self { inner: Vec::new() }
    }
    pub fn all(&self) -> &[Message] {
        &self.inner
    }
    pub fn len(&self) -> usize {
        self.inner.len()
    }
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
    pub fn last_response(&self) -> Option<&str> {
        self.inner
            .last()
            .filter(|m| m.role() == Role::Assistant)
            .map(|m| m.content())
    }
    fn push_response(&mut self, message: impl Into<String>) {
        self.inner.push(Message::assistant(message));
    }
    fn push_request(&mut self, message: impl Into<String>) {
        self.inner.push(Message::user(message));
    }
    fn rollback(&mut self, len: usize) {
        self.inner.truncate(len);
    }
}

/// Couples a transcript with the service that answers it.
pub struct ChatSession<C: Chat> {
    chat: C,
    history: ChatHistory,
}
impl<C: Chat> ChatSession<C> {
    pub fn new(chat: C) -> Self {
        Self {
            chat,
            history: ChatHistory::new(),
        }
    }
    /// Sends `message` with every earlier turn and records the reply.
    ///
    /// On error the transcript is left exactly as it was before the call.
    pub fn send(&mut self, message: impl Into<String>) -> Result<&str> {
        let checkpoint = self.history.len();
        self.history.push_request(message);
        match self.chat.chat(self.history.all()) {
            Ok(response) => {
                self.history.push_response(response);
                Ok(self.history.last_response().unwrap_or(""))
            }
            Err(e) => {
                self.history.rollback(checkpoint);
                Err(e)
            }
        }
    }
    pub fn history(&self) -> &ChatHistory {
        &self.history
    }
    pub fn chat(&self) -> &C {
        &self.chat
    }
}
