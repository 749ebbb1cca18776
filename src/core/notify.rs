//! Follow-up queue fed by `Session::notify`.
//!
//! Dedup is by session name for the whole run: once a name has been queued it
//! is never queued again, so the drain always terminates. A name whose
//! instances are still pending (or running) in the initial pass is not queued;
//! it is about to run anyway.

use std::collections::{HashSet, VecDeque};

use crate::session::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyDecision {
    Queued,
    AlreadyQueued,
    PendingInInitialPass,
}

#[derive(Debug, Default)]
pub struct NotifyQueue {
    queue: VecDeque<Notification>,
    seen: HashSet<String>,
}

impl NotifyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a notification. `pending` holds the names not yet finished in the
    /// initial pass, including the one currently running.
    pub fn offer(&mut self, notification: Notification, pending: &HashSet<String>) -> NotifyDecision {
        if self.seen.contains(&notification.name) {
            return NotifyDecision::AlreadyQueued;
        }
        if pending.contains(&notification.name) {
            return NotifyDecision::PendingInInitialPass;
        }
        self.seen.insert(notification.name.clone());
        self.queue.push_back(notification);
        NotifyDecision::Queued
    }

    pub fn pop(&mut self) -> Option<Notification> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(name: &str) -> Notification {
        Notification {
            name: name.to_string(),
            posargs: None,
        }
    }

    #[test]
    fn dedups_by_name_for_the_whole_run() {
        let mut queue = NotifyQueue::new();
        let pending = HashSet::new();

        assert_eq!(queue.offer(note("cover"), &pending), NotifyDecision::Queued);
        assert_eq!(queue.offer(note("cover"), &pending), NotifyDecision::AlreadyQueued);
        assert_eq!(queue.pop(), Some(note("cover")));
        assert_eq!(queue.offer(note("cover"), &pending), NotifyDecision::AlreadyQueued);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn pending_names_are_not_queued() {
        let mut queue = NotifyQueue::new();
        let pending: HashSet<String> = ["lint".to_string()].into_iter().collect();

        assert_eq!(
            queue.offer(note("lint"), &pending),
            NotifyDecision::PendingInInitialPass
        );
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.offer(note("lint"), &HashSet::new()), NotifyDecision::Queued);
    }

    #[test]
    fn drains_in_fifo_order() {
        let mut queue = NotifyQueue::new();
        let pending = HashSet::new();
        queue.offer(note("a"), &pending);
        queue.offer(note("b"), &pending);

        assert_eq!(queue.pop().map(|n| n.name), Some("a".to_string()));
        assert_eq!(queue.pop().map(|n| n.name), Some("b".to_string()));
        assert_eq!(queue.pop(), None);
    }
}
