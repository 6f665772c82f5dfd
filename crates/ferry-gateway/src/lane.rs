use tokio::sync::mpsc;

use crate::protocol::ClientRequest;

/// Per-connection FIFO queue. Requests run one at a time in arrival order
/// while the socket reader stays free to notice a disconnect.
pub struct LaneQueue {
    tx: mpsc::Sender<ClientRequest>,
}

impl LaneQueue {
    /// Create a new lane and return (queue_handle, receiver).
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ClientRequest>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    /// Enqueue a request. Returns `false` once the processor has stopped.
    pub async fn push(&self, request: ClientRequest) -> bool {
        self.tx.send(request).await.is_ok()
    }
}
