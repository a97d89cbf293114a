use std::io::{self, BufRead, Write};

use tracing::debug;

use crate::cerebras::{
    chat::{Chat, ChatSession},
    client::CerebrasClientError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInput,
    AwaitingCompletion,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("terminal i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Client(#[from] CerebrasClientError),
}

/// Line-oriented chat loop: one user line in, one assistant reply out.
pub struct ChatRepl<C: Chat, R, W> {
    session: ChatSession<C>,
    input: R,
    output: W,
    state: SessionState,
}

impl<C: Chat> ChatRepl<C, io::StdinLock<'static>, io::Stdout> {
    pub fn stdio(chat: C) -> Self {
        Self::new(chat, io::stdin().lock(), io::stdout())
    }
}

impl<C: Chat, R: BufRead, W: Write> ChatRepl<C, R, W> {
    const WELCOME: &'static str = "Welcome to the Interactive Cerebras Chat!";
    const EXIT_HINT: &'static str = "Type 'exit' to end the conversation.";
    const GOODBYE: &'static str = "Thank you for chatting. Goodbye!";
    const EXIT_COMMAND: &'static str = "exit";

    pub fn new(chat: C, input: R, output: W) -> Self {
        Self {
            session: ChatSession::new(chat),
            input,
            output,
            state: SessionState::AwaitingInput,
        }
    }
    pub fn repl(&mut self) -> Result<(), SessionError> {
        self.print_welcome()?;
        while self.state != SessionState::Closed {
            self.turn()?;
        }
        Ok(())
    }
    /// Runs a single read/complete/print cycle.
    ///
    /// Failures the operator can recover from are printed and the loop goes
    /// back to waiting for input. Configuration failures close the session.
    pub fn turn(&mut self) -> Result<SessionState, SessionError> {
        if self.state == SessionState::Closed {
            return Ok(self.state);
        }
        self.user_first()?;
        let message = match self.user_input()? {
            Some(message) => message,
            None => {
                debug!("input closed");
                self.close()?;
                return Ok(self.state);
            }
        };
        if Self::is_exit(&message) {
            self.close()?;
            return Ok(self.state);
        }

        self.state = SessionState::AwaitingCompletion;
        let result = self.session.send(message);
        self.state = SessionState::AwaitingInput;
        match result {
            Ok(response) => writeln!(self.output, "\nAssistant: {}", response)?,
            Err(e) if e.is_fatal() => {
                self.state = SessionState::Closed;
                return Err(e.into());
            }
            Err(e) => {
                debug!(category = %e.category(), "turn discarded");
                writeln!(
                    self.output,
                    "\nFailed to get a response ({}): {}",
                    e.category(),
                    e
                )?;
            }
        }
        self.output.flush()?;
        Ok(self.state)
    }
    pub fn state(&self) -> SessionState {
        self.state
    }
    pub fn session(&self) -> &ChatSession<C> {
        &self.session
    }
    pub fn output(&self) -> &W {
        &self.output
    }
    fn print_welcome(&mut self) -> io::Result<()> {
        writeln!(self.output, "{}", Self::WELCOME)?;
        writeln!(self.output, "{}", Self::EXIT_HINT)
    }
    fn close(&mut self) -> io::Result<()> {
        self.state = SessionState::Closed;
        writeln!(self.output, "{}", Self::GOODBYE)?;
        self.output.flush()
    }
    fn user_first(&mut self) -> io::Result<()> {
        write!(self.output, "\nYou: ")?;
        self.output.flush()
    }
    fn user_input(&mut self) -> io::Result<Option<String>> {
        let mut message = String::new();
        if self.input.read_line(&mut message)? == 0 {
            return Ok(None);
        }
        if message.ends_with('\n') {
            message.pop();
            if message.ends_with('\r') {
                message.pop();
            }
        }
        Ok(Some(message))
    }
    fn is_exit(message: &str) -> bool {
        message.trim().to_lowercase() == Self::EXIT_COMMAND
    }
}
