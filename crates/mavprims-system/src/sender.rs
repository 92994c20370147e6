use std::sync::Arc;

use mavprims_frame::{Frame, MessageData};

/// Outbound path of a system, usually the link registry.
pub trait FrameSender: Send + Sync {
    /// Hand one frame to every link. The sender assigns the sequence number.
    fn send_frame(&self, frame: Frame) -> bool;
}

/// Stamps our own ids on outgoing messages.
#[derive(Clone)]
pub struct Outbound {
    sender: Arc<dyn FrameSender>,
    own_system_id: u8,
    own_component_id: u8,
}

impl Outbound {
    pub fn new(sender: Arc<dyn FrameSender>, own_system_id: u8, own_component_id: u8) -> Self {
        Self {
            sender,
            own_system_id,
            own_component_id,
        }
    }

    pub fn send<M: MessageData>(&self, msg: &M) -> bool {
        self.sender
            .send_frame(Frame::from_message(self.own_system_id, self.own_component_id, msg))
    }

    pub fn own_system_id(&self) -> u8 {
        self.own_system_id
    }

    pub fn own_component_id(&self) -> u8 {
        self.own_component_id
    }
}
