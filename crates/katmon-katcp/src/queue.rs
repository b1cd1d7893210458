//! FIFO of requests awaiting transmission on one channel.

use std::collections::VecDeque;

use crate::message::Message;

/// Plain ordered queue: no priority, no de-duplication.
#[derive(Debug, Default, Clone)]
pub struct MessageQueue {
    messages: VecDeque<Message>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push_back(message);
    }

    /// Remove the front message, handing ownership to the caller.
    pub fn pop(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    pub fn front(&self) -> Option<&Message> {
        self.messages.front()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = MessageQueue::new();
        queue.push(Message::request("log-local", &["off"]));
        queue.push(Message::request("client-config", &["info-all"]));
        queue.push(Message::request("array-list", &[]));

        let names: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|m| m.name().unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, ["log-local", "client-config", "array-list"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_is_independent_of_queue() {
        let mut queue = MessageQueue::new();
        queue.push(Message::request("array-list", &[]));
        let mut popped = queue.pop().unwrap();
        popped.add_word("extra");
        queue.push(Message::request("array-list", &[]));
        assert_eq!(queue.front().unwrap().arg_count(), 0);
    }

    #[test]
    fn test_pop_empty() {
        let mut queue = MessageQueue::new();
        assert!(queue.pop().is_none());
    }
}
