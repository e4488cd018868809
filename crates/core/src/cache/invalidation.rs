//! Cache mutations deferred until a storage transaction commits.

use std::time::Duration;

/// A cache mutation recorded during a transaction and executed after commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingInvalidation {
    /// Remove one key.
    Delete(String),
    /// Remove every key matching a glob pattern.
    DeletePattern(String),
    /// Write a freshly committed value.
    Populate {
        key: String,
        value: Vec<u8>,
        ttl: Option<Duration>,
    },
}

impl PendingInvalidation {
    /// The exact key this command targets, if it targets a single key.
    pub fn key(&self) -> Option<&str> {
        match self {
            PendingInvalidation::Delete(key) | PendingInvalidation::Populate { key, .. } => {
                Some(key)
            }
            PendingInvalidation::DeletePattern(_) => None,
        }
    }
}

/// An ordered list of deferred cache mutations.
///
/// Later commands on the same key supersede earlier ones, and repeated
/// pattern deletes collapse into one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationQueue {
    commands: Vec<PendingInvalidation>,
}

impl InvalidationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: PendingInvalidation) {
        match &command {
            PendingInvalidation::DeletePattern(pattern) => {
                let duplicate = self
                    .commands
                    .iter()
                    .any(|c| matches!(c, PendingInvalidation::DeletePattern(p) if p == pattern));
                if duplicate {
                    return;
                }
            }
            _ => {
                let key = command.key().map(str::to_owned);
                self.commands.retain(|c| c.key() != key.as_deref());
            }
        }
        self.commands.push(command);
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.push(PendingInvalidation::Delete(key.into()));
    }

    pub fn delete_pattern(&mut self, pattern: impl Into<String>) {
        self.push(PendingInvalidation::DeletePattern(pattern.into()));
    }

    pub fn populate(&mut self, key: impl Into<String>, value: Vec<u8>, ttl: Option<Duration>) {
        self.push(PendingInvalidation::Populate {
            key: key.into(),
            value,
            ttl,
        });
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingInvalidation> {
        self.commands.iter()
    }

    /// Discards every queued command.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Takes the commands in the order they were queued.
    pub fn drain(&mut self) -> Vec<PendingInvalidation> {
        std::mem::take(&mut self.commands)
    }
}
