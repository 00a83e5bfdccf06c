//! Bounded conversation history for one chat session.

use std::collections::VecDeque;

use crate::models::ConversationTurn;

/// Ring buffer of user/assistant turns holding at most `max_history`
/// exchanges. Turns are only ever added in pairs, so the length is always
/// even; the oldest pair is evicted first.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<ConversationTurn>,
    max_history: usize,
}

impl ConversationHistory {
    pub fn new(max_history: usize) -> Self {
        let max_history = max_history.max(1);
        Self {
            turns: VecDeque::with_capacity(2 * max_history + 2),
            max_history,
        }
    }

    /// Record one exchange and evict the oldest exchanges beyond the cap.
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.push_back(ConversationTurn::user(user));
        self.turns.push_back(ConversationTurn::assistant(assistant));
        while self.turns.len() > 2 * self.max_history {
            self.turns.pop_front();
            self.turns.pop_front();
        }
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
