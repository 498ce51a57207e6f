//! Stype HF wire codec
//!
//! ```text
//! offset  size  field
//! 0       1     header (0x0F)
//! 1       1     command
//! 2       3     timecode bitfield (little-endian)
//! 5       1     package_no
//! 6       60    15 x f32 LE: x y z pan tilt roll fov_x aspect_ratio
//!               focus zoom k1 k2 center_shift_x center_shift_y pa_width
//! 66      1     checksum (wrapping sum of bytes 0..66)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use contracts::{StypePacket, Timecode};

use crate::error::{IngestionError, Result};

/// Size of a Stype HF datagram
pub const PACKET_SIZE: usize = 67;

/// First byte of every Stype HF datagram
pub const PACKET_HEADER: u8 = 0x0F;

const FRAMES_MASK: u32 = 0x7F;
const SECONDS_SHIFT: u32 = 7;
const MINUTES_SHIFT: u32 = 13;
const HOURS_SHIFT: u32 = 19;
const SIXTY_MASK: u32 = 0x3F;
const HOURS_MASK: u32 = 0x1F;

/// Wrapping byte sum
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

/// Unpack the 24-bit timecode bitfield
pub fn decode_timecode(raw: u32) -> Timecode {
    Timecode::new(
        ((raw >> HOURS_SHIFT) & HOURS_MASK) as u8,
        ((raw >> MINUTES_SHIFT) & SIXTY_MASK) as u8,
        ((raw >> SECONDS_SHIFT) & SIXTY_MASK) as u8,
        (raw & FRAMES_MASK) as u8,
    )
}

/// Pack a timecode into the 24-bit bitfield; out-of-range fields are truncated
pub fn encode_timecode(timecode: &Timecode) -> u32 {
    (u32::from(timecode.frames) & FRAMES_MASK)
        | ((u32::from(timecode.seconds) & SIXTY_MASK) << SECONDS_SHIFT)
        | ((u32::from(timecode.minutes) & SIXTY_MASK) << MINUTES_SHIFT)
        | ((u32::from(timecode.hours) & HOURS_MASK) << HOURS_SHIFT)
}

/// Decode and validate one datagram
pub fn decode(datagram: &[u8]) -> Result<StypePacket> {
    if datagram.len() != PACKET_SIZE {
        return Err(IngestionError::InvalidSize {
            expected: PACKET_SIZE,
            actual: datagram.len(),
        });
    }

    let header = datagram[0];
    if header != PACKET_HEADER {
        return Err(IngestionError::InvalidHeader { found: header });
    }

    let computed = checksum(&datagram[..PACKET_SIZE - 1]);
    let carried = datagram[PACKET_SIZE - 1];
    if computed != carried {
        return Err(IngestionError::ChecksumMismatch { computed, carried });
    }

    let mut buf = &datagram[1..PACKET_SIZE - 1];
    let command = buf.get_u8();
    let timecode = decode_timecode(buf.get_uint_le(3) as u32);
    let package_no = buf.get_u8();

    Ok(StypePacket {
        command,
        timecode,
        package_no,
        x: buf.get_f32_le(),
        y: buf.get_f32_le(),
        z: buf.get_f32_le(),
        pan: buf.get_f32_le(),
        tilt: buf.get_f32_le(),
        roll: buf.get_f32_le(),
        fov_x: buf.get_f32_le(),
        aspect_ratio: buf.get_f32_le(),
        focus: buf.get_f32_le(),
        zoom: buf.get_f32_le(),
        k1: buf.get_f32_le(),
        k2: buf.get_f32_le(),
        center_shift_x: buf.get_f32_le(),
        center_shift_y: buf.get_f32_le(),
        pa_width: buf.get_f32_le(),
    })
}

/// Encode a packet, computing its checksum
pub fn encode(packet: &StypePacket) -> Bytes {
    let mut buf = BytesMut::with_capacity(PACKET_SIZE);
    buf.put_u8(PACKET_HEADER);
    buf.put_u8(packet.command);
    buf.put_uint_le(u64::from(encode_timecode(&packet.timecode)), 3);
    buf.put_u8(packet.package_no);

    for value in [
        packet.x,
        packet.y,
        packet.z,
        packet.pan,
        packet.tilt,
        packet.roll,
        packet.fov_x,
        packet.aspect_ratio,
        packet.focus,
        packet.zoom,
        packet.k1,
        packet.k2,
        packet.center_shift_x,
        packet.center_shift_y,
        packet.pa_width,
    ] {
        buf.put_f32_le(value);
    }

    let sum = checksum(&buf);
    buf.put_u8(sum);
    buf.freeze()
}
