//! Message queues sitting between the application and the I/O pumps

use crate::message::{Message, MessageType};
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Messages waiting to go out on one connection.
///
/// Owned by exactly one write pump; nothing else touches it, so it needs
/// no locking. Messages leave in the order they were pushed.
#[derive(Debug, Default)]
pub struct OutgoingQueue {
    messages: VecDeque<Message>,
}

impl OutgoingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message. Returns true if the queue was empty beforehand,
    /// which is the only case where the caller must start a write.
    pub fn push(&mut self, message: Message) -> bool {
        let was_empty = self.messages.is_empty();
        self.messages.push_back(message);
        was_empty
    }

    pub fn front(&self) -> Option<&Message> {
        self.messages.front()
    }

    pub fn pop_front(&mut self) -> Option<Message> {
        self.messages.pop_front()
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
}

#[derive(Debug, Default)]
struct IncomingInner {
    messages: VecDeque<Message>,
    /// Bumped by every clear so waiters can tell their connection is gone
    generation: u64,
    /// Responses whose requester gave up waiting, keyed by expected type
    abandoned: HashMap<Option<MessageType>, usize>,
}

impl IncomingInner {
    fn position_of_response(&self, expected: Option<MessageType>) -> Option<usize> {
        self.messages.iter().position(|m| {
            m.is_synchronous_response() && expected.map_or(true, |t| m.message_type == t)
        })
    }

    /// Consumes one abandoned slot matching `message`, if any.
    fn claim_abandoned(&mut self, message: &Message) -> bool {
        for key in [Some(message.message_type), None] {
            if let Some(count) = self.abandoned.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    self.abandoned.remove(&key);
                }
                return true;
            }
        }
        false
    }
}

/// Fully received messages awaiting the application.
///
/// The read pump pushes from the networking task while the application
/// pops from its own; synchronous responses are held back from ordinary
/// pops and only leave through [`IncomingQueue::take_synchronous_response`].
#[derive(Debug, Default)]
pub struct IncomingQueue {
    inner: Mutex<IncomingInner>,
    notify: Notify,
}

impl IncomingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IncomingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a message, unless it is a late answer to an abandoned
    /// synchronous request.
    pub fn push(&self, message: Message) {
        {
            let mut inner = self.lock();
            if message.is_synchronous_response() && inner.claim_abandoned(&message) {
                debug!(
                    "Discarding late {:?} response to an abandoned request",
                    message.message_type
                );
                return;
            }
            inner.messages.push_back(message);
        }
        self.notify.notify_waiters();
    }

    /// Removes the oldest message that is not a synchronous response.
    pub fn pop_front(&self) -> Option<Message> {
        let mut inner = self.lock();
        let position = inner
            .messages
            .iter()
            .position(|m| !m.is_synchronous_response())?;
        inner.messages.remove(position)
    }

    /// Number of ordinary (non synchronous response) messages queued
    pub fn len(&self) -> usize {
        self.lock()
            .messages
            .iter()
            .filter(|m| !m.is_synchronous_response())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops everything queued and releases anyone waiting for a response.
    pub fn clear(&self) {
        {
            let mut inner = self.lock();
            inner.messages.clear();
            inner.abandoned.clear();
            inner.generation += 1;
        }
        self.notify.notify_waiters();
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Waits for the first synchronous response (of type `expected`, when
    /// given) and removes it from the queue.
    ///
    /// Returns `None` once the queue has been cleared past `generation`,
    /// i.e. the connection the response would have arrived on is gone.
    pub async fn take_synchronous_response(
        &self,
        expected: Option<MessageType>,
        generation: u64,
    ) -> Option<Message> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if inner.generation != generation {
                    return None;
                }
                if let Some(position) = inner.position_of_response(expected) {
                    return inner.messages.remove(position);
                }
            }

            notified.await;
        }
    }

    /// Gives up on a synchronous response that has not been taken.
    ///
    /// A matching response already queued is dropped now; otherwise the next
    /// one to arrive is dropped on push, so it cannot answer a later request.
    /// Ignored once the queue has been cleared past `generation`.
    pub fn abandon_synchronous_response(&self, expected: Option<MessageType>, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        if let Some(position) = inner.position_of_response(expected) {
            inner.messages.remove(position);
            return;
        }
        *inner.abandoned.entry(expected).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networking::SERVER_PLAYER_ID;
    use std::sync::Arc;
    use std::time::Duration;

    fn chat(text: &str) -> Message {
        Message::lobby_chat(1, SERVER_PLAYER_ID, text)
    }

    #[test]
    fn test_outgoing_push_reports_pump_start() {
        let mut queue = OutgoingQueue::new();
        assert!(queue.push(chat("a")));
        assert!(!queue.push(chat("b")));
        assert!(!queue.push(chat("c")));
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop_front().unwrap().text(), "a");
        assert_eq!(queue.front().unwrap().text(), "b");
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.push(chat("d")));
    }

    #[test]
    fn test_incoming_is_fifo() {
        let queue = IncomingQueue::new();
        for text in ["one", "two", "three"] {
            queue.push(chat(text));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop_front().unwrap().text(), "one");
        assert_eq!(queue.pop_front().unwrap().text(), "two");
        assert_eq!(queue.pop_front().unwrap().text(), "three");
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_incoming_pop_skips_synchronous_responses() {
        let queue = IncomingQueue::new();
        queue.push(Message::dispatch_new_object_id(1, 10).unwrap());
        queue.push(chat("after"));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_front().unwrap().text(), "after");
        assert!(queue.is_empty());
        assert!(queue.pop_front().is_none());
    }

    #[tokio::test]
    async fn test_take_synchronous_response_removes_from_middle() {
        let queue = IncomingQueue::new();
        queue.push(chat("before"));
        queue.push(Message::dispatch_new_object_id(1, 10).unwrap());
        queue.push(chat("after"));

        let generation = queue.generation();
        let response = queue
            .take_synchronous_response(Some(MessageType::DispatchNewObjectId), generation)
            .await
            .unwrap();
        assert_eq!(response.body_as::<i32>().unwrap(), 10);

        assert_eq!(queue.pop_front().unwrap().text(), "before");
        assert_eq!(queue.pop_front().unwrap().text(), "after");
    }

    #[tokio::test]
    async fn test_take_synchronous_response_waits_for_push() {
        let queue = Arc::new(IncomingQueue::new());
        let generation = queue.generation();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .take_synchronous_response(Some(MessageType::DispatchNewDesignId), generation)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(chat("noise"));
        queue.push(Message::dispatch_new_object_id(1, 1).unwrap());
        queue.push(Message::dispatch_new_design_id(1, 2).unwrap());

        let response = waiter.await.unwrap().unwrap();
        assert_eq!(response.message_type, MessageType::DispatchNewDesignId);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_releases_waiters() {
        let queue = Arc::new(IncomingQueue::new());
        let generation = queue.generation();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.take_synchronous_response(None, generation).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.clear();

        assert!(waiter.await.unwrap().is_none());
        assert_ne!(queue.generation(), generation);
    }

    #[tokio::test]
    async fn test_abandoned_response_does_not_answer_next_request() {
        let queue = IncomingQueue::new();
        queue.abandon_synchronous_response(
            Some(MessageType::DispatchNewObjectId),
            queue.generation(),
        );

        // late answer to the abandoned request, then an unrelated type
        queue.push(Message::dispatch_new_object_id(1, 111).unwrap());
        queue.push(Message::dispatch_new_design_id(1, 5).unwrap());
        queue.push(Message::dispatch_new_object_id(1, 222).unwrap());

        let generation = queue.generation();
        let response = queue
            .take_synchronous_response(Some(MessageType::DispatchNewObjectId), generation)
            .await
            .unwrap();
        assert_eq!(response.body_as::<i32>().unwrap(), 222);

        let design = queue
            .take_synchronous_response(Some(MessageType::DispatchNewDesignId), generation)
            .await
            .unwrap();
        assert_eq!(design.body_as::<i32>().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_abandon_drops_already_queued_response() {
        let queue = IncomingQueue::new();
        queue.push(Message::dispatch_new_object_id(1, 111).unwrap());
        queue.abandon_synchronous_response(None, queue.generation());

        queue.push(Message::dispatch_new_object_id(1, 222).unwrap());
        let response = queue
            .take_synchronous_response(None, queue.generation())
            .await
            .unwrap();
        assert_eq!(response.body_as::<i32>().unwrap(), 222);
    }

    #[test]
    fn test_clear_forgets_abandoned_requests() {
        let queue = IncomingQueue::new();
        let stale = queue.generation();
        queue.abandon_synchronous_response(None, stale);
        queue.clear();
        // a waiter that times out after the clear must not poison the new connection
        queue.abandon_synchronous_response(None, stale);

        queue.push(Message::dispatch_new_object_id(1, 7).unwrap());
        assert_eq!(queue.lock().messages.len(), 1);
    }
}
