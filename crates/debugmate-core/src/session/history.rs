use std::collections::VecDeque;

use super::message::Message;

/// Bounded conversation ring.
///
/// Appending beyond `capacity` drops the oldest messages first.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl ConversationHistory {
    /// Creates an empty history holding at most `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends a message, trimming the oldest entries past capacity.
    pub fn push(&mut self, message: Message) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
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

    /// Returns the last `n` messages, oldest first.
    pub fn tail(&self, n: usize) -> Vec<&Message> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).collect()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.back()
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_trims_oldest() {
        let mut history = ConversationHistory::new(2);
        history.push(Message::user("one"));
        history.push(Message::assistant("two"));
        history.push(Message::user("three"));

        assert_eq!(history.len(), 2);
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "three"]);
    }

    #[test]
    fn test_tail_returns_most_recent_in_order() {
        let mut history = ConversationHistory::new(10);
        for i in 0..5 {
            history.push(Message::user(format!("m{i}")));
        }

        let tail: Vec<_> = history.tail(2).into_iter().map(|m| m.content.clone()).collect();
        assert_eq!(tail, vec!["m3", "m4"]);
        assert_eq!(history.tail(50).len(), 5);
    }
}
