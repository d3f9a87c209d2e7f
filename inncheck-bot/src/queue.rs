//! Bounded FIFO request queue
//!
//! Many producers (one admission task per inbound message), one consumer (the
//! sequential worker). Admission never waits: a full queue is reported
//! immediately so the requester can be told right away.
//!
//! Admission may split insertion in two: [`RequestQueue::try_reserve`] claims a
//! slot at the tail, and [`Reservation::commit`] fills it with the request. The
//! acknowledgment is sent in between, so the worker always knows which message to
//! clean up. Order is fixed when the slot is claimed: the consumer waits on an
//! unfilled head slot rather than skipping past it.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use inncheck_common::Inn;
use tokio::sync::Notify;

use crate::channel::{MessageRef, RequesterRef};

/// One unit of work: look up `inn` and answer `requester`
#[derive(Debug, Clone)]
pub struct LookupRequest {
    pub inn: Inn,
    pub requester: RequesterRef,
    /// "Request accepted" message to remove once the report is delivered
    pub acknowledgment: Option<MessageRef>,
    pub enqueued_at: DateTime<Utc>,
}

impl LookupRequest {
    pub fn new(inn: Inn, requester: RequesterRef, acknowledgment: Option<MessageRef>) -> Self {
        Self {
            inn,
            requester,
            acknowledgment,
            enqueued_at: Utc::now(),
        }
    }
}

/// Result of an admission attempt
#[derive(Debug)]
pub enum Enqueued {
    /// Accepted; `position` is the queue length after insertion (1 = served next)
    Admitted { position: usize },
    /// Refused; the request is handed back
    Rejected {
        reason: QueueRejection,
        request: LookupRequest,
    },
}

/// Why the queue refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRejection {
    Full,
    Closed,
}

/// A place in line; `request` is `None` while its reservation is open
struct Slot {
    ticket: u64,
    request: Option<LookupRequest>,
}

struct QueueState {
    slots: VecDeque<Slot>,
    next_ticket: u64,
    closed: bool,
}

impl QueueState {
    fn push(&mut self, request: Option<LookupRequest>) -> (u64, usize) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.slots.push_back(Slot { ticket, request });
        (ticket, self.slots.len())
    }

    fn index_of(&self, ticket: u64) -> Option<usize> {
        self.slots.iter().position(|slot| slot.ticket == ticket)
    }
}

/// Bounded FIFO of pending lookups
pub struct RequestQueue {
    state: Mutex<QueueState>,
    available: Notify,
    capacity: usize,
}

impl RequestQueue {
    /// Create an empty queue holding at most `capacity` waiting requests
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                slots: VecDeque::with_capacity(capacity),
                next_ticket: 0,
                closed: false,
            }),
            available: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // A panic while holding this lock cannot leave the VecDeque half-modified
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append unless full or closed; size check and append happen under one lock
    pub fn try_enqueue(&self, request: LookupRequest) -> Enqueued {
        let mut state = self.lock();
        if state.closed {
            return Enqueued::Rejected {
                reason: QueueRejection::Closed,
                request,
            };
        }
        if state.slots.len() >= self.capacity {
            return Enqueued::Rejected {
                reason: QueueRejection::Full,
                request,
            };
        }
        let (_, position) = state.push(Some(request));
        drop(state);

        self.available.notify_one();
        Enqueued::Admitted { position }
    }

    /// Claim the next place in line without making anything visible to the consumer
    ///
    /// The slot counts against capacity and holds its place until it is
    /// committed or dropped.
    pub fn try_reserve(&self) -> Result<Reservation<'_>, QueueRejection> {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueRejection::Closed);
        }
        if state.slots.len() >= self.capacity {
            return Err(QueueRejection::Full);
        }
        let (ticket, position) = state.push(None);
        Ok(Reservation {
            queue: self,
            ticket,
            position,
            committed: false,
        })
    }

    fn commit(&self, ticket: u64, request: LookupRequest) -> Result<(), LookupRequest> {
        let mut state = self.lock();
        let Some(index) = state.index_of(ticket) else {
            // Slot dropped by close()
            return Err(request);
        };
        state.slots[index].request = Some(request);
        let at_head = index == 0;
        drop(state);

        if at_head {
            self.available.notify_one();
        }
        Ok(())
    }

    fn release(&self, ticket: u64) {
        let mut state = self.lock();
        if let Some(index) = state.index_of(ticket) {
            state.slots.remove(index);
        }
        let head_ready = state
            .slots
            .front()
            .is_some_and(|slot| slot.request.is_some());
        drop(state);

        if head_ready {
            self.available.notify_one();
        }
    }

    /// Wait for the next request in admission order
    ///
    /// Returns `None` once the queue has been closed.
    pub async fn dequeue(&self) -> Option<LookupRequest> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register interest before checking so a push between the check and
            // the await is not missed
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                // An open reservation at the head keeps its turn
                if state.slots.front().is_some_and(|slot| slot.request.is_some()) {
                    if let Some(request) = state.slots.pop_front().and_then(|slot| slot.request) {
                        return Some(request);
                    }
                }
            }

            notified.await;
        }
    }

    /// Close the queue, wake the consumer, and hand back requests that never started
    ///
    /// Open reservations lose their slot; their later commit fails.
    pub fn close(&self) -> Vec<LookupRequest> {
        let mut state = self.lock();
        state.closed = true;
        let pending: Vec<LookupRequest> =
            state.slots.drain(..).filter_map(|slot| slot.request).collect();
        drop(state);

        self.available.notify_waiters();
        pending
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Current number of waiting requests (committed only)
    pub fn len(&self) -> usize {
        self.lock()
            .slots
            .iter()
            .filter(|slot| slot.request.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A claimed queue slot; released on drop unless committed
pub struct Reservation<'a> {
    queue: &'a RequestQueue,
    ticket: u64,
    position: usize,
    committed: bool,
}

impl Reservation<'_> {
    /// Place in line at the time of reservation (1 = served next)
    pub fn position(&self) -> usize {
        self.position
    }

    /// Fill the reserved slot, making the request visible to the consumer
    ///
    /// Fails, handing the request back, if the queue was closed meanwhile.
    pub fn commit(mut self, request: LookupRequest) -> Result<(), LookupRequest> {
        self.committed = true;
        self.queue.commit(self.ticket, request)
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.queue.release(self.ticket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn request(chat_id: i64) -> LookupRequest {
        LookupRequest::new(
            Inn::parse("7707083893").unwrap(),
            RequesterRef::new(chat_id, None),
            None,
        )
    }

    fn admitted(outcome: Enqueued) -> usize {
        match outcome {
            Enqueued::Admitted { position } => position,
            Enqueued::Rejected { reason, .. } => panic!("rejected: {:?}", reason),
        }
    }

    #[test]
    fn test_positions_count_up() {
        let queue = RequestQueue::new(3);
        assert_eq!(admitted(queue.try_enqueue(request(1))), 1);
        assert_eq!(admitted(queue.try_enqueue(request(2))), 2);
        assert_eq!(admitted(queue.try_enqueue(request(3))), 3);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_rejects_when_full_and_returns_request() {
        let queue = RequestQueue::new(1);
        admitted(queue.try_enqueue(request(1)));

        match queue.try_enqueue(request(2)) {
            Enqueued::Rejected { reason, request } => {
                assert_eq!(reason, QueueRejection::Full);
                assert_eq!(request.requester.chat_id, 2);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = RequestQueue::new(5);
        for chat_id in 1..=5 {
            admitted(queue.try_enqueue(request(chat_id)));
        }
        for expected in 1..=5 {
            let next = queue.dequeue().await.unwrap();
            assert_eq!(next.requester.chat_id, expected);
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_slot_frees_after_dequeue() {
        let queue = RequestQueue::new(1);
        admitted(queue.try_enqueue(request(1)));
        queue.dequeue().await.unwrap();
        assert_eq!(admitted(queue.try_enqueue(request(2))), 1);
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(RequestQueue::new(2));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        admitted(queue.try_enqueue(request(99)));

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer woke")
            .expect("consumer task")
            .expect("request");
        assert_eq!(received.requester.chat_id, 99);
    }

    #[tokio::test]
    async fn test_close_unblocks_consumer_and_returns_pending() {
        let queue = Arc::new(RequestQueue::new(2));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(queue.close().is_empty());
        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer woke")
            .expect("consumer task");
        assert!(received.is_none());
    }

    #[test]
    fn test_close_drains_and_refuses() {
        let queue = RequestQueue::new(3);
        admitted(queue.try_enqueue(request(1)));
        admitted(queue.try_enqueue(request(2)));

        let pending = queue.close();
        assert_eq!(pending.len(), 2);
        assert!(queue.is_closed());
        assert!(matches!(
            queue.try_enqueue(request(3)),
            Enqueued::Rejected {
                reason: QueueRejection::Closed,
                ..
            }
        ));
    }

    #[test]
    fn test_reservation_counts_against_capacity() {
        let queue = RequestQueue::new(2);
        let first = queue.try_reserve().unwrap();
        assert_eq!(first.position(), 1);
        let second = queue.try_reserve().unwrap();
        assert_eq!(second.position(), 2);

        assert!(matches!(queue.try_reserve(), Err(QueueRejection::Full)));
        assert!(matches!(
            queue.try_enqueue(request(3)),
            Enqueued::Rejected {
                reason: QueueRejection::Full,
                ..
            }
        ));
        // Reserved slots are not visible to the consumer
        assert_eq!(queue.len(), 0);

        first.commit(request(1)).unwrap();
        assert_eq!(queue.len(), 1);
        drop(second);
        assert_eq!(admitted(queue.try_enqueue(request(4))), 2);
    }

    #[test]
    fn test_dropped_reservation_frees_slot() {
        let queue = RequestQueue::new(1);
        {
            let _slot = queue.try_reserve().unwrap();
            assert!(queue.try_reserve().is_err());
        }
        assert!(queue.try_reserve().is_ok());
    }

    #[test]
    fn test_commit_after_close_hands_request_back() {
        let queue = RequestQueue::new(2);
        let slot = queue.try_reserve().unwrap();
        queue.close();

        let returned = slot.commit(request(5)).unwrap_err();
        assert_eq!(returned.requester.chat_id, 5);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_open_reservation_holds_its_turn() {
        let queue = Arc::new(RequestQueue::new(3));
        let first = queue.try_reserve().unwrap();
        let second = queue.try_reserve().unwrap();
        assert_eq!((first.position(), second.position()), (1, 2));

        second.commit(request(2)).unwrap();
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished(), "head slot still open");

        first.commit(request(1)).unwrap();
        let head = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer woke")
            .expect("consumer task")
            .expect("request");
        assert_eq!(head.requester.chat_id, 1);
        assert_eq!(queue.dequeue().await.unwrap().requester.chat_id, 2);
    }

    #[tokio::test]
    async fn test_dropped_head_reservation_lets_next_through() {
        let queue = Arc::new(RequestQueue::new(3));
        let first = queue.try_reserve().unwrap();
        admitted(queue.try_enqueue(request(2)));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);

        let next = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer woke")
            .expect("consumer task")
            .expect("request");
        assert_eq!(next.requester.chat_id, 2);
    }
}
