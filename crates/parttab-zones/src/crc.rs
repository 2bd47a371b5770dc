//! CRC32 engine
//!
//! The CRC-32/ISO-HDLC variant (reflected polynomial 0xEDB88320, init and
//! final XOR 0xFFFFFFFF) used by GPT headers and partition entry arrays.

use std::ops::Range;

/// CRC32 of a byte slice
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// CRC32 of `bytes` with the bytes in `field` hashed as zeroes
///
/// This is how a structure that stores its own checksum is hashed. The input
/// is neither copied nor modified.
pub fn crc32_with_zeroed_field(bytes: &[u8], field: Range<usize>) -> u32 {
    let mut crc = Crc32::new();
    crc.update(&bytes[..field.start]);
    crc.update_zeroes(field.len());
    crc.update(&bytes[field.end..]);
    crc.finalize()
}

/// Offset range of the header checksum field inside a GPT header
pub const HEADER_CRC32_FIELD: Range<usize> = 16..20;

/// CRC32 of a GPT header, hashing its own checksum field as zero
///
/// `header` must span exactly the header-size bytes.
pub fn header_crc32(header: &[u8]) -> u32 {
    crc32_with_zeroed_field(header, HEADER_CRC32_FIELD)
}

/// Streaming CRC32 accumulator
#[derive(Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Feed `count` zero bytes
    pub fn update_zeroes(&mut self, count: usize) {
        const ZEROES: [u8; 64] = [0; 64];
        let mut left = count;
        while left > 0 {
            let n = left.min(ZEROES.len());
            self.hasher.update(&ZEROES[..n]);
            left -= n;
        }
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(crc32(b""), 0x0000_0000);
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(
            crc32(b"The quick brown fox jumps over the lazy dog"),
            0x414F_A339
        );
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data: Vec<u8> = (0..=255).collect();
        let mut crc = Crc32::new();
        crc.update(&data[..100]);
        crc.update(&data[100..]);
        assert_eq!(crc.finalize(), crc32(&data));
    }

    #[test]
    fn test_update_zeroes() {
        let mut crc = Crc32::new();
        crc.update_zeroes(200);
        assert_eq!(crc.finalize(), crc32(&[0u8; 200]));
    }

    #[test]
    fn test_zeroed_field_matches_copy() {
        let mut data: Vec<u8> = (0..92).collect();
        let with_field = crc32_with_zeroed_field(&data, 16..20);

        assert_ne!(with_field, crc32(&data));

        data[16..20].fill(0);
        assert_eq!(with_field, crc32(&data));
    }

    #[test]
    fn test_header_crc32_ignores_stored_value() {
        let mut header = [0u8; 92];
        header[0..8].copy_from_slice(b"EFI PART");
        let expected = header_crc32(&header);

        header[16..20].copy_from_slice(&expected.to_le_bytes());
        assert_eq!(header_crc32(&header), expected);
        assert_ne!(crc32(&header), expected);
    }
}
