//! The executor's callback mailbox (§5, §9 design notes): "callbacks from
//! the HTTP client must post onto the owning executor... use a lock-free
//! MPSC into the executor's task queue." A transport running on its own
//! thread(s) holds a cloned [`ExecutorMailbox::sender`] and posts the id of
//! a session whose response arrived; the executor drains the queue at the
//! start of every tick and re-ticks those sessions regardless of their own
//! wake condition, without the executor ever blocking to receive.

use crate::session::SessionId;

#[derive(Clone)]
pub struct ExecutorMailbox {
    sender: flume::Sender<SessionId>,
    receiver: flume::Receiver<SessionId>,
}

impl ExecutorMailbox {
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    /// A handle an external thread (the HTTP transport) can clone and post
    /// to. Never blocks.
    pub fn sender(&self) -> flume::Sender<SessionId> {
        self.sender.clone()
    }

    /// Drain every pending wake-up posted since the last call. Non-blocking.
    pub fn drain(&self) -> Vec<SessionId> {
        self.receiver.try_iter().collect()
    }
}

impl Default for ExecutorMailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posted_ids_are_drained_in_order() {
        let mailbox = ExecutorMailbox::new();
        let sender = mailbox.sender();
        sender.send(3).unwrap();
        sender.send(7).unwrap();
        assert_eq!(mailbox.drain(), vec![3, 7]);
        assert!(mailbox.drain().is_empty());
    }

    #[test]
    fn a_cloned_sender_posts_to_the_same_mailbox() {
        let mailbox = ExecutorMailbox::new();
        let sender = mailbox.sender();
        std::thread::spawn(move || {
            sender.send(1).unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(mailbox.drain(), vec![1]);
    }
}
