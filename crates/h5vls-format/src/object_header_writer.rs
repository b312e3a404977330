//! Builder for version 2 object headers.

use crate::checksum::jenkins_lookup3;
use crate::message_type::MessageType;

/// Accumulates messages and serialises them as a single-chunk `OHDR` block.
#[derive(Debug, Default, Clone)]
pub struct ObjectHeaderWriter {
    messages: Vec<(MessageType, Vec<u8>, u8)>,
}

impl ObjectHeaderWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message with no flags set.
    pub fn message(self, msg_type: MessageType, data: Vec<u8>) -> Self {
        self.message_with_flags(msg_type, data, 0)
    }

    /// Append a message with explicit message flags (bit 0 marks it constant).
    pub fn message_with_flags(mut self, msg_type: MessageType, data: Vec<u8>, flags: u8) -> Self {
        self.messages.push((msg_type, data, flags));
        self
    }

    /// Serialised length, without building the bytes.
    pub fn encoded_len(&self) -> usize {
        let body = self.body_len();
        6 + size_width(body) + body + 4
    }

    fn body_len(&self) -> usize {
        self.messages.iter().map(|(_, d, _)| 4 + d.len()).sum()
    }

    /// Serialise: prefix, messages, lookup3 checksum.
    pub fn finish(self) -> Vec<u8> {
        let body = self.body_len();
        let width = size_width(body);
        let mut buf = Vec::with_capacity(6 + width + body + 4);
        buf.extend_from_slice(b"OHDR");
        buf.push(2);
        buf.push(width.trailing_zeros() as u8);
        buf.extend_from_slice(&(body as u64).to_le_bytes()[..width]);
        for (msg_type, data, flags) in &self.messages {
            buf.push(msg_type.to_u16() as u8);
            buf.extend_from_slice(&(data.len() as u16).to_le_bytes());
            buf.push(*flags);
            buf.extend_from_slice(data);
        }
        let sum = jenkins_lookup3(&buf);
        buf.extend_from_slice(&sum.to_le_bytes());
        buf
    }
}

fn size_width(body: usize) -> usize {
    if body <= 0xFF {
        1
    } else if body <= 0xFFFF {
        2
    } else if body <= 0xFFFF_FFFF {
        4
    } else {
        8
    }
}
