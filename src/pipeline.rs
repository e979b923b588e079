//! The pipeline queue: requests whose responses haven't been fully
//! consumed yet, in wire order.

use std::collections::VecDeque;

/// A request whose headers (and, for 100-continue, body) have reached
/// the wire but whose response hasn't been fully read.
///
/// `body_len_opt` is `Some` only for the second, body-delivery entry of
/// an Expect: 100-continue request (queued once the body itself reaches
/// the wire); it lets `read_response` tell the interim `100` apart from
/// the final status by inspecting which pending entry is at the head.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: String,
    pub url: String,
    pub body_len_opt: Option<u64>,
}

#[derive(Debug, Default)]
pub struct Pipeline {
    queue: VecDeque<PendingRequest>,
}

impl Pipeline {
    pub fn new() -> Pipeline {
        Pipeline { queue: VecDeque::new() }
    }

    pub fn push(&mut self, req: PendingRequest) {
        self.queue.push_back(req);
    }

    pub fn pop_front(&mut self) -> Option<PendingRequest> {
        self.queue.pop_front()
    }

    pub fn front(&self) -> Option<&PendingRequest> {
        self.queue.front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
