use crate::constants::{CMD_RESET_ASSERT, MRQ_RESET, RESET_ID_UARTA};

/// One direction of a message. The size is always the length of `data`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub data: Vec<u8>,
}

impl Payload {
    pub fn new(data: Vec<u8>) -> Payload {
        return Payload { data: data };
    }

    pub fn size(&self) -> usize {
        return self.data.len();
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Self {
        return Payload::new(data.to_vec());
    }
}

/// A single BPMP request/response, alive for exactly one exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub request_id: u32,
    pub tx: Payload,
    pub rx: Payload,
    // set by the remote, negative is failure
    pub return_code: i32,
}

impl Message {
    pub fn new(request_id: u32, tx: &[u8]) -> Message {
        return Message {
            request_id: request_id,
            tx: Payload::from(tx),
            rx: Payload::default(),
            return_code: 0,
        };
    }
}

/// MRQ_RESET request body, `{ u32 cmd; u32 reset_id; }` little endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MrqResetRequest {
    pub cmd: u32,
    pub reset_id: u32,
}

impl MrqResetRequest {
    pub const SIZE: usize = 8;

    /// The request the control node fires: assert reset on UARTA.
    pub fn uarta_assert() -> MrqResetRequest {
        return MrqResetRequest {
            cmd: CMD_RESET_ASSERT,
            reset_id: RESET_ID_UARTA,
        };
    }

    pub fn to_bytes(&self) -> [u8; MrqResetRequest::SIZE] {
        let mut out = [0u8; MrqResetRequest::SIZE];
        out[0..4].copy_from_slice(&self.cmd.to_le_bytes());
        out[4..8].copy_from_slice(&self.reset_id.to_le_bytes());
        return out;
    }

    pub fn to_message(&self) -> Message {
        return Message::new(MRQ_RESET, &self.to_bytes());
    }
}
