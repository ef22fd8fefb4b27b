// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library

// From this library

/// Magic opening every NBD request.
pub const REQUEST_MAGIC: u32 = 0x2560_9513;

/// Wire size of a request header, in bytes.
pub const REQUEST_HEADER_SIZE: usize = 28;

/// An NBD request header: magic, command, caller handle, offset, length.
/// All fields big-endian on the wire.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RequestHeader {
    pub magic: u32,
    pub command: u32,
    pub handle: [u8; 8],
    pub offset: u64,
    pub length: u32,
}

impl RequestHeader {
    /// Builds a request carrying the well-known magic.
    pub fn new(command: u32, handle: u64, offset: u64, length: u32) -> RequestHeader {
        RequestHeader {
            magic: REQUEST_MAGIC,
            command,
            handle: handle.to_be_bytes(),
            offset,
            length,
        }
    }

    pub fn encode(&self) -> [u8; REQUEST_HEADER_SIZE] {
        let mut wire = [0u8; REQUEST_HEADER_SIZE];
        wire[0..4].copy_from_slice(&self.magic.to_be_bytes());
        wire[4..8].copy_from_slice(&self.command.to_be_bytes());
        wire[8..16].copy_from_slice(&self.handle);
        wire[16..24].copy_from_slice(&self.offset.to_be_bytes());
        wire[24..28].copy_from_slice(&self.length.to_be_bytes());

        wire
    }

    pub fn decode(wire: &[u8; REQUEST_HEADER_SIZE]) -> RequestHeader {
        RequestHeader {
            magic: u32::from_be_bytes(wire[0..4].try_into().unwrap()),
            command: u32::from_be_bytes(wire[4..8].try_into().unwrap()),
            handle: wire[8..16].try_into().unwrap(),
            offset: u64::from_be_bytes(wire[16..24].try_into().unwrap()),
            length: u32::from_be_bytes(wire[24..28].try_into().unwrap()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_header_round_trips_through_the_wire_encoding() {
        let header = RequestHeader::new(0, 42, 0x1000, 4096);

        let actual = RequestHeader::decode(&header.encode());
        let expected = header;
        assert_eq!(actual, expected);
        assert_eq!(actual.magic, REQUEST_MAGIC);
    }
}
