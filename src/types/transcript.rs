//! Conversation transcript
//!
//! The message list the chat view owns. A turn appends the user's message and
//! an empty assistant placeholder; streamed text then rewrites the placeholder
//! in place.

use crate::types::message::{Message, Role};

/// Opening assistant message of every new chat
pub const GREETING: &str =
    "Hello! I am a local AI running entirely on your device. How can I help you today?";

/// Shown in place of a reply whose generation failed
pub const FAILURE_NOTICE: &str = "Sorry, something went wrong. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    /// A fresh chat holding only the greeting
    pub fn new() -> Self {
        Self {
            messages: vec![Message::assistant(GREETING)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Starts a turn for `text`.
    ///
    /// Returns the history to generate from: the optional system prompt, then
    /// every message up to and including the new user turn. The placeholder is
    /// appended after the history is taken.
    pub fn begin_turn(&mut self, text: &str, system_prompt: &str) -> Vec<Message> {
        self.messages.push(Message::user(text.trim()));

        let mut history = Vec::with_capacity(self.messages.len() + 1);
        if !system_prompt.is_empty() {
            history.push(Message::system(system_prompt));
        }
        history.extend(self.messages.iter().cloned());

        self.messages.push(Message::assistant(""));
        history
    }

    /// Replaces the placeholder's text with the latest accumulated reply
    pub fn update_reply(&mut self, text: &str) {
        if let Some(last) = self.messages.last_mut() {
            if last.role == Role::Assistant {
                last.content.clear();
                last.content.push_str(text);
            }
        }
    }

    /// Replaces the in-progress reply with the failure notice
    pub fn fail_reply(&mut self) {
        if matches!(self.messages.last(), Some(m) if m.role == Role::Assistant) {
            self.messages.pop();
        }
        self.messages.push(Message::assistant(FAILURE_NOTICE));
    }
}
