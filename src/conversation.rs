//! Bounded conversation memory.
//!
//! A [`ConversationBuffer`] keeps the most recent `2 × max_turns` turns
//! (one user and one assistant message per exchange) and renders them as
//! the "previous conversation" section of the prompt.

use std::collections::VecDeque;

use crate::models::{Role, Turn};

/// Default number of user/assistant exchanges remembered.
pub const DEFAULT_MAX_TURNS: usize = 5;

/// Fixed-capacity FIFO of recent turns for one chat session.
#[derive(Debug, Clone)]
pub struct ConversationBuffer {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl Default for ConversationBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl ConversationBuffer {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_turns * 2 + 1),
            max_turns,
        }
    }

    /// Builds a buffer by replaying prior turns, so only the newest
    /// `2 × max_turns` survive.
    pub fn from_history<I>(max_turns: usize, history: I) -> Self
    where
        I: IntoIterator<Item = Turn>,
    {
        let mut buffer = Self::new(max_turns);
        for turn in history {
            buffer.push(turn);
        }
        buffer
    }

    /// Maximum number of turns held.
    pub fn capacity(&self) -> usize {
        self.max_turns * 2
    }

    pub fn add(&mut self, role: Role, content: impl Into<String>) {
        self.push(Turn::new(role, content));
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity() {
            self.turns.pop_front();
        }
    }

    /// Renders `role: content` lines, oldest first.
    pub fn get_context(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role(), t.content()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
