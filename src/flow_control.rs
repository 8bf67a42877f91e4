/// Tracks permits the broker authorized but the application has since
/// consumed, and decides when to ask for more.
///
/// Invariant: `0 <= available_permits <= receiver_queue_size`.
pub struct FlowController {
    receiver_queue_size: usize,
    available_permits: i32,
}

impl FlowController {
    pub fn new(receiver_queue_size: usize) -> Self {
        FlowController {
            receiver_queue_size,
            available_permits: 0,
        }
    }

    pub fn available_permits(&self) -> i32 {
        self.available_permits
    }

    /// Credit `delta` consumed permits. Returns `Some(permits_to_request)`
    /// once the running total crosses half the receive queue, at which
    /// point the counter resets to zero; the caller (the session actor) is
    /// responsible for actually sending the `Flow` frame, since only it
    /// knows whether the connection is currently `Ready`.
    pub fn increase(&mut self, delta: i32) -> Option<i32> {
        if delta <= 0 {
            return None;
        }
        self.available_permits += delta;
        let threshold = (self.receiver_queue_size / 2) as i32;
        if threshold > 0 && self.available_permits >= threshold {
            let to_send = self.available_permits;
            self.available_permits = 0;
            Some(to_send)
        } else {
            None
        }
    }
}
