//! Session - Per-connection conversation state
//!
//! Holds the bounded history sent to the model and the last failed shell
//! command. A failure is offered back to the interpreter for at most
//! `max_error_feedback_attempts` consecutive turns, and is dropped as soon as
//! a turn resolves to anything other than a failing shell command.

use crate::types::*;
use std::collections::VecDeque;

/// Fixed-capacity history; the oldest entry is evicted first
#[derive(Debug, Clone)]
pub struct History {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        if self.capacity == 0 {
            return;
        }
        while self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }
}

/// State owned by one client connection
#[derive(Debug)]
pub struct Session {
    history: History,
    pending_error: Option<PendingError>,
    feedback_attempts: u32,
    max_feedback_attempts: u32,
}

impl Session {
    pub fn new(config: &IntentConfig) -> Self {
        Self {
            history: History::new(config.history_depth),
            pending_error: None,
            feedback_attempts: 0,
            max_feedback_attempts: config.max_error_feedback_attempts,
        }
    }

    /// History for this turn only, with the error note injected when due
    pub fn on_turn_start(&mut self, message: &str) -> Vec<Turn> {
        let mut context = self.history.snapshot();

        let due = self.pending_error.is_some() && self.feedback_attempts < self.max_feedback_attempts;
        if !due {
            self.clear_pending_error();
            return context;
        }

        self.feedback_attempts += 1;
        if let Some(pending) = &self.pending_error {
            log::info!(
                "Providing error context for '{}' (attempt {}/{})",
                pending.command,
                self.feedback_attempts,
                self.max_feedback_attempts
            );
            context.push(Turn::system(pending.note(message)));
        }

        context
    }

    /// Record the exchange and update the pending error from the outcome
    pub fn on_turn_end(&mut self, message: &str, outcome: &Outcome) {
        match &outcome.structured {
            Some(report) if !report.success => {
                self.pending_error = Some(PendingError::from_report(report));
            }
            _ => self.clear_pending_error(),
        }

        self.history.push(Turn::user(message));
        self.history.push(Turn::assistant(outcome.history_entry()));
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn pending_error(&self) -> Option<&PendingError> {
        self.pending_error.as_ref()
    }

    fn clear_pending_error(&mut self) {
        self.pending_error = None;
        self.feedback_attempts = 0;
    }
}
