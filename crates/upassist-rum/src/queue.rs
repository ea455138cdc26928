//! Buffer for commands issued before initialization.

use crate::command::Command;

/// FIFO buffer of commands waiting for the interpreter to be installed.
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: Vec<Command>,
}

impl CommandQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Get the number of buffered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Take every buffered command in submission order.
    pub fn drain(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}

impl FromIterator<Command> for CommandQueue {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}
