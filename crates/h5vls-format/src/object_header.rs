//! Object header parsing (v1 and v2), including continuation chunks.

use std::collections::VecDeque;

use crate::bytes::{ensure_len, read_offset, read_u16, read_u32, read_uint};
use crate::checksum::verify_trailing_checksum;
use crate::error::FormatError;
use crate::message_type::MessageType;

const OHDR_SIGNATURE: &[u8; 4] = b"OHDR";
const OCHK_SIGNATURE: &[u8; 4] = b"OCHK";

/// Message flag bit: fail if the message type is not understood.
const MSG_FLAG_MUST_UNDERSTAND: u8 = 0x08;

/// Header flag bits (v2).
const HDR_TRACK_CREATION_ORDER: u8 = 0x04;
const HDR_ATTRIBUTE_PHASE: u8 = 0x10;
const HDR_TIMESTAMPS: u8 = 0x20;

/// Upper bound on continuation chunks followed for one header.
const MAX_CHUNKS: usize = 4096;

/// A single header message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMessage {
    /// The message type.
    pub msg_type: MessageType,
    /// Message flags byte.
    pub flags: u8,
    /// Raw message body.
    pub data: Vec<u8>,
}

/// Parsed object header: the messages of every chunk in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Header version (1 or 2).
    pub version: u8,
    /// All non-nil, non-continuation messages.
    pub messages: Vec<HeaderMessage>,
}

#[derive(Debug, Clone, Copy)]
enum ChunkFormat {
    V1,
    V2 { creation_order: bool },
}

#[derive(Debug, Clone, Copy)]
struct Chunk {
    start: usize,
    end: usize,
}

impl ObjectHeader {
    /// Parse the object header at `address`.
    pub fn parse(
        data: &[u8],
        address: usize,
        offset_size: u8,
        length_size: u8,
    ) -> Result<ObjectHeader, FormatError> {
        ensure_len(data, address, 4)?;
        let (version, format, first) = if &data[address..address + 4] == OHDR_SIGNATURE {
            Self::v2_prefix(data, address)?
        } else {
            Self::v1_prefix(data, address)?
        };

        let mut header = ObjectHeader {
            version,
            messages: Vec::new(),
        };
        let mut queue = VecDeque::from([first]);
        let mut visited = 0usize;
        while let Some(chunk) = queue.pop_front() {
            visited += 1;
            if visited > MAX_CHUNKS {
                return Err(FormatError::Unsupported(format!(
                    "object header at {address} has more than {MAX_CHUNKS} chunks"
                )));
            }
            header.read_chunk(data, chunk, format, offset_size, length_size, &mut queue)?;
        }
        Ok(header)
    }

    /// v1 prefix: version, reserved, message count, refcount, header size,
    /// then padding to 16 bytes.
    fn v1_prefix(data: &[u8], address: usize) -> Result<(u8, ChunkFormat, Chunk), FormatError> {
        ensure_len(data, address, 16)?;
        let version = data[address];
        if version != 1 {
            return Err(FormatError::UnsupportedVersion {
                structure: "object header",
                version,
            });
        }
        let size = read_u32(data, address + 8)? as usize;
        let start = address + 16;
        ensure_len(data, start, size)?;
        Ok((1, ChunkFormat::V1, Chunk { start, end: start + size }))
    }

    fn v2_prefix(data: &[u8], address: usize) -> Result<(u8, ChunkFormat, Chunk), FormatError> {
        ensure_len(data, address, 6)?;
        let version = data[address + 4];
        if version != 2 {
            return Err(FormatError::UnsupportedVersion {
                structure: "object header",
                version,
            });
        }
        let flags = data[address + 5];
        let mut pos = address + 6;
        if flags & HDR_TIMESTAMPS != 0 {
            pos += 16;
        }
        if flags & HDR_ATTRIBUTE_PHASE != 0 {
            pos += 4;
        }
        let width = 1usize << (flags & 0x03);
        let size = read_uint(data, pos, width)? as usize;
        pos += width;

        let end = pos
            .checked_add(size)
            .ok_or(FormatError::SizeOverflow("object header chunk"))?;
        verify_trailing_checksum(&data[address..], end - address)?;
        let format = ChunkFormat::V2 {
            creation_order: flags & HDR_TRACK_CREATION_ORDER != 0,
        };
        Ok((2, format, Chunk { start: pos, end }))
    }

    fn read_chunk(
        &mut self,
        data: &[u8],
        chunk: Chunk,
        format: ChunkFormat,
        offset_size: u8,
        length_size: u8,
        queue: &mut VecDeque<Chunk>,
    ) -> Result<(), FormatError> {
        ensure_len(data, chunk.start, chunk.end.saturating_sub(chunk.start))?;
        let prefix = match format {
            ChunkFormat::V1 => 8,
            ChunkFormat::V2 { creation_order } => {
                if creation_order {
                    6
                } else {
                    4
                }
            }
        };

        let mut pos = chunk.start;
        // Trailing space smaller than a message prefix is a gap.
        while pos + prefix <= chunk.end {
            let (raw_type, size, flags) = match format {
                ChunkFormat::V1 => (read_u16(data, pos)?, read_u16(data, pos + 2)?, data[pos + 4]),
                ChunkFormat::V2 { .. } => {
                    (data[pos] as u16, read_u16(data, pos + 1)?, data[pos + 3])
                }
            };
            pos += prefix;
            let size = size as usize;
            if pos + size > chunk.end {
                return Err(FormatError::UnexpectedEof {
                    expected: pos + size,
                    available: chunk.end,
                });
            }
            let body = &data[pos..pos + size];
            pos += size;

            match MessageType::from_u16(raw_type) {
                MessageType::Nil => {}
                MessageType::Continuation => {
                    let target = read_offset(body, 0, offset_size)? as usize;
                    let length = read_offset(body, offset_size as usize, length_size)? as usize;
                    queue.push_back(Self::continuation_chunk(data, target, length, format)?);
                }
                MessageType::Unknown(id) if flags & MSG_FLAG_MUST_UNDERSTAND != 0 => {
                    return Err(FormatError::UnsupportedMessage(id));
                }
                msg_type => self.messages.push(HeaderMessage {
                    msg_type,
                    flags,
                    data: body.to_vec(),
                }),
            }
        }
        Ok(())
    }

    fn continuation_chunk(
        data: &[u8],
        target: usize,
        length: usize,
        format: ChunkFormat,
    ) -> Result<Chunk, FormatError> {
        ensure_len(data, target, length)?;
        match format {
            ChunkFormat::V1 => Ok(Chunk {
                start: target,
                end: target + length,
            }),
            ChunkFormat::V2 { .. } => {
                if length < 8 || &data[target..target + 4] != OCHK_SIGNATURE {
                    return Err(FormatError::InvalidSignature("OCHK"));
                }
                verify_trailing_checksum(&data[target..], length - 4)?;
                Ok(Chunk {
                    start: target + 4,
                    end: target + length - 4,
                })
            }
        }
    }

    /// First message of the given type.
    pub fn find(&self, msg_type: MessageType) -> Option<&HeaderMessage> {
        self.messages.iter().find(|m| m.msg_type == msg_type)
    }

    /// All messages of the given type, in header order.
    pub fn find_all(&self, msg_type: MessageType) -> impl Iterator<Item = &HeaderMessage> {
        self.messages.iter().filter(move |m| m.msg_type == msg_type)
    }
}
