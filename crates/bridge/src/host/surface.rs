//! Picker surface that forwards requests to a host UI task.

use tokio::sync::mpsc;
use tracing::debug;

use super::{PickerRequest, PickerSurface, SurfaceError};

/// Surface backed by an unbounded channel.
///
/// `present` only enqueues the request; whoever owns the receiver shows the
/// picker and later delivers the completion to the selection session.
#[derive(Debug, Clone)]
pub struct ChannelSurface {
    tx: mpsc::UnboundedSender<PickerRequest>,
}

impl ChannelSurface {
    /// Create a surface and the receiver the host UI reads requests from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PickerRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PickerSurface for ChannelSurface {
    fn present(&self, request: &PickerRequest) -> Result<(), SurfaceError> {
        debug!(
            request_code = request.request_code,
            allow_multiple = request.allow_multiple,
            "Forwarding picker request"
        );
        self.tx
            .send(request.clone())
            .map_err(|_| SurfaceError::Detached)
    }
}
