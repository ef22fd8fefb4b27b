// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library

// From this library

/// Magic opening every NBD reply.
pub const REPLY_MAGIC: u32 = 0x6744_6698;

/// Wire size of a reply header, in bytes.
pub const REPLY_HEADER_SIZE: usize = 16;

/// An NBD reply header: magic, error, echoed handle. Payload bytes follow a
/// successful read reply. All fields big-endian on the wire.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ReplyHeader {
    pub magic: u32,
    pub error: u32,
    pub handle: [u8; 8],
}

impl ReplyHeader {
    /// Builds a reply echoing `handle`, carrying `error` (0 for success).
    pub fn new(handle: [u8; 8], error: u32) -> ReplyHeader {
        ReplyHeader {
            magic: REPLY_MAGIC,
            error,
            handle,
        }
    }

    pub fn encode(&self) -> [u8; REPLY_HEADER_SIZE] {
        let mut wire = [0u8; REPLY_HEADER_SIZE];
        wire[0..4].copy_from_slice(&self.magic.to_be_bytes());
        wire[4..8].copy_from_slice(&self.error.to_be_bytes());
        wire[8..16].copy_from_slice(&self.handle);

        wire
    }

    pub fn decode(wire: &[u8; REPLY_HEADER_SIZE]) -> ReplyHeader {
        ReplyHeader {
            magic: u32::from_be_bytes(wire[0..4].try_into().unwrap()),
            error: u32::from_be_bytes(wire[4..8].try_into().unwrap()),
            handle: wire[8..16].try_into().unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reply_header_round_trips_through_the_wire_encoding() {
        let header = ReplyHeader::new(7u64.to_be_bytes(), libc::EPERM as u32);

        let actual = ReplyHeader::decode(&header.encode());
        let expected = header;
        assert_eq!(actual, expected);
        assert_eq!(actual.magic, REPLY_MAGIC);
    }
}
