//! Command packet layout.
//!
//! The dispatcher treats the header as opaque except for three accessors:
//! function code, declared payload length, and checksum validity.
//!
//! ```text
//! offset  size  field
//!   0      2    message id            (big-endian)
//!   2      2    sequence              (big-endian, 0xC000 | count)
//!   4      2    length = total - 7    (big-endian)
//!   6      1    function code         (low 7 bits)
//!   7      1    checksum              (XOR of all bytes seeded 0xFF == 0)
//!   8      n    payload
//! ```

use static_assertions::const_assert;

use crate::error::MsgError;

/// Fixed header length in bytes.
pub const CMD_HDR_LEN: usize = 8;

/// Header length field holds `total_len - LENGTH_BIAS`.
const LENGTH_BIAS: usize = 7;

const FUNCTION_CODE_MASK: u8 = 0x7F;

/// Sequence flags for an unsegmented packet.
const SEQ_UNSEGMENTED: u16 = 0xC000;

const_assert!(CMD_HDR_LEN > LENGTH_BIAS);
const_assert!(fsw_common::consts::MAX_CMD_LEN > CMD_HDR_LEN);

/// Read-only view of a validated-length command packet.
#[derive(Debug, Clone, Copy)]
pub struct CmdView<'a> {
    bytes: &'a [u8],
}

impl<'a> CmdView<'a> {
    /// Wrap `bytes`, checking that the header is present and that its
    /// length field agrees with the buffer length.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, MsgError> {
        if bytes.len() < CMD_HDR_LEN {
            return Err(MsgError::TooShort { len: bytes.len() });
        }
        let declared = usize::from(u16::from_be_bytes([bytes[4], bytes[5]])) + LENGTH_BIAS;
        if declared != bytes.len() {
            return Err(MsgError::LengthMismatch {
                declared,
                actual: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    /// Message (stream) identifier.
    #[inline]
    pub fn msg_id(&self) -> u16 {
        u16::from_be_bytes([self.bytes[0], self.bytes[1]])
    }

    /// Sequence count without the segmentation flags.
    #[inline]
    pub fn sequence(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2], self.bytes[3]]) & 0x3FFF
    }

    /// Function code from the secondary header.
    #[inline]
    pub fn function_code(&self) -> u16 {
        u16::from(self.bytes[6] & FUNCTION_CODE_MASK)
    }

    /// Payload length declared by the header.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.bytes.len() - CMD_HDR_LEN
    }

    /// Payload bytes following the header.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[CMD_HDR_LEN..]
    }

    /// True if the packet checksum verifies.
    #[inline]
    pub fn checksum_valid(&self) -> bool {
        checksum(self.bytes) == 0
    }
}

/// Function code of a buffer without validating anything else.
pub fn peek_function_code(bytes: &[u8]) -> Option<u16> {
    bytes.get(6).map(|b| u16::from(b & FUNCTION_CODE_MASK))
}

/// XOR of every byte seeded with `0xFF`. Zero for a valid packet.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0xFF, |acc, b| acc ^ b)
}

/// Builder for well-formed command packets.
pub struct CmdPacket;

impl CmdPacket {
    /// Build a packet with a valid length field and checksum.
    pub fn build(msg_id: u16, function_code: u16, payload: &[u8]) -> Result<Vec<u8>, MsgError> {
        Self::build_with_sequence(msg_id, 0, function_code, payload)
    }

    /// Build a packet carrying a sequence count.
    pub fn build_with_sequence(
        msg_id: u16,
        sequence: u16,
        function_code: u16,
        payload: &[u8],
    ) -> Result<Vec<u8>, MsgError> {
        if function_code > u16::from(FUNCTION_CODE_MASK) {
            return Err(MsgError::FunctionCodeRange(function_code));
        }
        let total = CMD_HDR_LEN + payload.len();
        let length_field = u16::try_from(total - LENGTH_BIAS)
            .map_err(|_| MsgError::PayloadTooLarge { len: payload.len() })?;

        let mut packet = Vec::with_capacity(total);
        packet.extend_from_slice(&msg_id.to_be_bytes());
        packet.extend_from_slice(&(SEQ_UNSEGMENTED | (sequence & 0x3FFF)).to_be_bytes());
        packet.extend_from_slice(&length_field.to_be_bytes());
        packet.push(function_code as u8);
        packet.push(0);
        packet.extend_from_slice(payload);
        packet[7] = checksum(&packet);
        Ok(packet)
    }
}

/// Read a NUL-padded fixed-width text field.
pub fn read_fixed_str(field: &[u8]) -> Result<&str, MsgError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).map_err(|_| MsgError::TextField)
}

/// Write `text` into a fixed-width field, NUL-padding the remainder.
///
/// At least one terminating NUL must fit.
pub fn write_fixed_str(field: &mut [u8], text: &str) -> Result<(), MsgError> {
    let bytes = text.as_bytes();
    if bytes.len() >= field.len() {
        return Err(MsgError::TextField);
    }
    field.fill(0);
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}
