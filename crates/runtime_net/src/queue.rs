//! FIFO admission control with a single request in flight.
use crate::request::Request;
use core_types::RequestId;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct RequestQueue {
    pending: VecDeque<Request>,
    in_flight: Option<RequestId>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> Option<RequestId> {
        self.in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_ids(&self) -> impl Iterator<Item = RequestId> + '_ {
        self.pending.iter().map(Request::id)
    }

    pub fn get(&self, id: RequestId) -> Option<&Request> {
        self.pending.iter().find(|r| r.id() == id)
    }

    /// Admit `request`. When nothing is in flight it is handed back for
    /// immediate dispatch and becomes the in-flight request; otherwise it
    /// waits at the tail. `max_depth` bounds the waiting entries; the oldest
    /// waiting entry is evicted on overflow.
    pub fn enqueue(&mut self, request: Request, max_depth: Option<usize>) -> Option<Request> {
        if self.in_flight.is_none() {
            self.in_flight = Some(request.id());
            return Some(request);
        }
        log::debug!(target: "ajax.queue", "request {} waits behind {:?}", request.id(), self.in_flight);
        self.pending.push_back(request);
        if let Some(max) = max_depth {
            while self.pending.len() > max {
                if let Some(evicted) = self.pending.pop_front() {
                    log::debug!(target: "ajax.queue", "queue full, evicting request {}", evicted.id());
                }
            }
        }
        None
    }

    /// The in-flight request finished: hand out the next one, or go idle.
    pub fn process_queue(&mut self) -> Option<Request> {
        match self.pending.pop_front() {
            Some(next) => {
                self.in_flight = Some(next.id());
                Some(next)
            }
            None => {
                self.in_flight = None;
                None
            }
        }
    }

    /// Drop everything, in flight included. Returns how many waiting
    /// requests were discarded.
    pub fn cleanup(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.in_flight = None;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    fn req(id: RequestId) -> Request {
        Request::detached(id, "http://h/app")
    }

    #[test]
    fn first_request_dispatches_others_wait_in_order() {
        let mut q = RequestQueue::new();
        assert_eq!(q.enqueue(req(1), None).map(|r| r.id()), Some(1));
        assert!(q.enqueue(req(2), None).is_none());
        assert!(q.enqueue(req(3), None).is_none());
        assert_eq!(q.in_flight(), Some(1));
        assert_eq!(q.pending_ids().collect::<Vec<_>>(), vec![2, 3]);

        assert_eq!(q.process_queue().map(|r| r.id()), Some(2));
        assert_eq!(q.process_queue().map(|r| r.id()), Some(3));
        assert!(q.process_queue().is_none());
        assert!(q.is_idle());
    }

    #[test]
    fn overflow_evicts_oldest_waiting() {
        let mut q = RequestQueue::new();
        q.enqueue(req(1), Some(2));
        q.enqueue(req(2), Some(2));
        q.enqueue(req(3), Some(2));
        q.enqueue(req(4), Some(2));
        assert_eq!(q.pending_ids().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(q.in_flight(), Some(1));
    }

    #[test]
    fn cleanup_drops_everything() {
        let mut q = RequestQueue::new();
        q.enqueue(req(1), None);
        q.enqueue(req(2), None);
        assert_eq!(q.cleanup(), 1);
        assert!(q.is_idle());
        assert!(q.is_empty());
        assert_eq!(q.enqueue(req(3), None).map(|r| r.id()), Some(3));
    }
}
