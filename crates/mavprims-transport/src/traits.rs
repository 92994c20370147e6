use std::sync::Arc;

use mavprims_frame::Frame;

/// Callback receiving every frame a link decodes.
///
/// Runs on the link's receive thread; it must not block.
pub type InboundHandler = Arc<dyn Fn(Frame) + Send + Sync>;

/// One concrete channel to remote participants.
///
/// Implementations own a receive thread that feeds a frame decoder and hands
/// complete frames to their [`InboundHandler`].
pub trait Transport: Send + Sync {
    /// Send one fully framed message.
    ///
    /// Returns false on a local failure, including "no destination known yet".
    fn send(&self, bytes: &[u8]) -> bool;

    /// Stop the receive loop, wake it, and join it. Safe to call more than once.
    fn stop(&self);

    /// Short human-readable endpoint description for logs.
    fn describe(&self) -> String;
}
