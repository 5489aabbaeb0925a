//! Host side of the bridge
//!
//! The USB stack is outside this crate. It hands host frames to the bridge and
//! takes frames for the host through [`HostTransport`].

use crate::frame::CanFrame;

/// Bulk endpoint pair towards the host
pub trait HostTransport {
    /// Take the next frame the host submitted, if any
    ///
    /// Must not block. The bridge only calls this when it has room for the
    /// frame, which is how backpressure reaches the host.
    fn receive_frame(&mut self) -> Option<CanFrame>;

    /// Queue a frame for the host (bus frame, echo or error frame)
    fn send_frame(&mut self, frame: &CanFrame);
}
