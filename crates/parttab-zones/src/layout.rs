//! Little-endian field access for fixed-layout on-disk structures
//!
//! All helpers index directly into the slice and panic on out-of-range
//! offsets. Callers size their buffers from the structure constants first.

use uuid::Uuid;

/// Copy `N` bytes starting at `offset` into an array
pub fn read_array<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

pub fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(read_array(bytes, offset))
}

pub fn read_u64_le(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(read_array(bytes, offset))
}

pub fn write_bytes(buf: &mut [u8], offset: usize, src: &[u8]) {
    buf[offset..offset + src.len()].copy_from_slice(src);
}

pub fn write_u32_le(buf: &mut [u8], offset: usize, value: u32) {
    write_bytes(buf, offset, &value.to_le_bytes());
}

pub fn write_u64_le(buf: &mut [u8], offset: usize, value: u64) {
    write_bytes(buf, offset, &value.to_le_bytes());
}

/// Read a GUID stored in the on-disk mixed-endian form
///
/// The first three fields are little-endian, the last eight bytes are
/// stored as-is.
pub fn read_guid(bytes: &[u8], offset: usize) -> Uuid {
    Uuid::from_bytes_le(read_array(bytes, offset))
}

/// Write a GUID in the on-disk mixed-endian form
pub fn write_guid(buf: &mut [u8], offset: usize, guid: &Uuid) {
    write_bytes(buf, offset, &guid.to_bytes_le());
}

/// Decode a NUL-padded UTF-16LE name
///
/// Stops at the first NUL code unit. Unpaired surrogates become U+FFFD.
pub fn read_utf16_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();

    String::from_utf16_lossy(&units)
}

/// Encode `name` as UTF-16LE into `buf`, NUL-padding the remainder
///
/// Names longer than the field are cut at a code-point boundary.
/// Returns the number of code units written.
pub fn write_utf16_name(buf: &mut [u8], name: &str) -> usize {
    let capacity = buf.len() / 2;
    let mut units: Vec<u16> = name.encode_utf16().take(capacity).collect();

    // Never leave half of a surrogate pair behind
    if let Some(&last) = units.last() {
        if (0xD800..=0xDBFF).contains(&last) {
            units.pop();
        }
    }

    buf.fill(0);
    for (i, unit) in units.iter().enumerate() {
        write_bytes(buf, i * 2, &unit.to_le_bytes());
    }
    units.len()
}

/// True when every byte is zero
pub fn is_zeroed(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::uuid;

    #[test]
    fn test_integers_are_little_endian() {
        let mut buf = [0u8; 16];
        write_u32_le(&mut buf, 0, 0x1234_5678);
        write_u64_le(&mut buf, 4, 0x0102_0304_0506_0708);

        assert_eq!(&buf[0..4], &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(buf[4], 0x08);
        assert_eq!(buf[11], 0x01);
        assert_eq!(read_u32_le(&buf, 0), 0x1234_5678);
        assert_eq!(read_u64_le(&buf, 4), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_guid_mixed_endian() {
        let guid = uuid!("EBD0A0A2-B9E5-4433-87C0-68B6B72699C7");
        let mut buf = [0u8; 16];
        write_guid(&mut buf, 0, &guid);

        assert_eq!(
            buf,
            [
                0xa2, 0xa0, 0xd0, 0xeb, 0xe5, 0xb9, 0x33, 0x44,
                0x87, 0xc0, 0x68, 0xb6, 0xb7, 0x26, 0x99, 0xc7,
            ]
        );
        assert_eq!(read_guid(&buf, 0), guid);
    }

    #[test]
    fn test_utf16_name() {
        let mut field = [0xFFu8; 72];
        assert_eq!(write_utf16_name(&mut field, "DATA"), 4);
        assert_eq!(&field[0..8], &[b'D', 0, b'A', 0, b'T', 0, b'A', 0]);
        assert!(is_zeroed(&field[8..]));
        assert_eq!(read_utf16_name(&field), "DATA");
    }

    #[test]
    fn test_utf16_name_truncation() {
        let mut field = [0u8; 72];
        let long = "x".repeat(40);
        assert_eq!(write_utf16_name(&mut field, &long), 36);
        assert_eq!(read_utf16_name(&field), "x".repeat(36));

        // 35 ASCII units plus an emoji would need 37 units, the pair is dropped whole
        let name = format!("{}\u{1F600}", "y".repeat(35));
        assert_eq!(write_utf16_name(&mut field, &name), 35);
        assert_eq!(read_utf16_name(&field), "y".repeat(35));
    }

    #[test]
    fn test_utf16_name_stops_at_nul() {
        let mut field = [0u8; 72];
        write_bytes(&mut field, 0, &[b'A', 0, 0, 0, b'B', 0]);
        assert_eq!(read_utf16_name(&field), "A");
    }
}
