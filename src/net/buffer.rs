//! Outbound packet buffer
//!
//! A `PacketBuffer` writes byte-aligned fields. Calling [`PacketBuffer::bits`]
//! switches it into bit mode by handing out a [`BitWriter`] that mutably borrows
//! the buffer, so byte writes are impossible until the bit writer is finished
//! (or dropped). Finishing zero-pads the trailing partial byte.
//!
//! Variable-length messages reserve their size field with
//! [`PacketBuffer::size_u8`] / [`PacketBuffer::size_u16`] and redeem the returned
//! [`SizeMarker`] with [`PacketBuffer::patch`] once the payload is written.
//!
//! The client expects a handful of non-standard byte orders and byte
//! transforms. Their names follow the transform applied:
//! - `add`: low byte + 128
//! - `neg`: byte negated
//! - `sub`: 128 - byte
//! - `le`: little-endian
//! - `me`: middle-endian (`[b1, b0, b3, b2]` of the big-endian `b3 b2 b1 b0`)

use crate::util::cp1252;

/// Default hard limit for a single outbound message
pub const DEFAULT_LIMIT: usize = 64 * 1024;

/// Byte-mode packet buffer
#[derive(Debug, Clone)]
pub struct PacketBuffer {
    data: Vec<u8>,
    limit: usize,
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_LIMIT)
    }

    /// Create a buffer that must never grow past `limit` bytes
    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: Vec::with_capacity(limit.min(256)),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    fn ensure(&self, additional: usize) {
        assert!(
            self.data.len() + additional <= self.limit,
            "packet buffer overflow: {} + {} exceeds limit {}",
            self.data.len(),
            additional,
            self.limit
        );
    }

    #[inline]
    fn put(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.put(&[value]);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.write_u8(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.put(&value.to_be_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_u16(value as u16);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.put(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    pub fn write_u16_le(&mut self, value: u16) {
        self.put(&value.to_le_bytes());
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.put(&value.to_le_bytes());
    }

    pub fn write_u8_add(&mut self, value: u8) {
        self.write_u8(value.wrapping_add(128));
    }

    pub fn write_u8_neg(&mut self, value: u8) {
        self.write_u8(value.wrapping_neg());
    }

    pub fn write_u8_sub(&mut self, value: u8) {
        self.write_u8(128u8.wrapping_sub(value));
    }

    /// Big-endian, low byte + 128
    pub fn write_u16_add(&mut self, value: u16) {
        self.put(&[(value >> 8) as u8, (value as u8).wrapping_add(128)]);
    }

    /// Little-endian, low byte + 128
    pub fn write_u16_le_add(&mut self, value: u16) {
        self.put(&[(value as u8).wrapping_add(128), (value >> 8) as u8]);
    }

    pub fn write_u32_me(&mut self, value: u32) {
        self.put(&[
            (value >> 8) as u8,
            value as u8,
            (value >> 24) as u8,
            (value >> 16) as u8,
        ]);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.put(bytes);
    }

    /// Write a byte run last byte first
    pub fn write_bytes_reversed(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.data.extend(bytes.iter().rev());
    }

    /// Write a zero-terminated string in the client's text encoding
    pub fn write_str(&mut self, s: &str) {
        let start = self.data.len();
        cp1252::encode_into(s, &mut self.data);
        self.data.push(0);
        if self.data.len() > self.limit {
            let written = self.data.len() - start;
            self.data.truncate(start);
            self.ensure(written);
        }
    }

    /// One byte below 128, otherwise two bytes with the top bit set
    pub fn write_smart(&mut self, value: u16) {
        assert!(value < 0x8000, "smart value {value} out of range");
        if value < 128 {
            self.write_u8(value as u8);
        } else {
            self.write_u16(value | 0x8000);
        }
    }

    /// Reserve a 1-byte size field covering everything written after it
    #[must_use = "a size marker must be redeemed with PacketBuffer::patch"]
    pub fn size_u8(&mut self) -> SizeMarker {
        self.write_u8(0);
        SizeMarker::new(self.data.len() - 1, SizeWidth::Byte)
    }

    /// Reserve a 2-byte size field covering everything written after it
    #[must_use = "a size marker must be redeemed with PacketBuffer::patch"]
    pub fn size_u16(&mut self) -> SizeMarker {
        self.write_u16(0);
        SizeMarker::new(self.data.len() - 2, SizeWidth::Short)
    }

    /// Fill a reserved size field with `len() - start`
    pub fn patch(&mut self, mut marker: SizeMarker) {
        let size = self.data.len() - marker.start;
        match marker.width {
            SizeWidth::Byte => {
                assert!(size <= u8::MAX as usize, "size {size} overflows a 1-byte field");
                self.data[marker.at] = size as u8;
            }
            SizeWidth::Short => {
                assert!(size <= u16::MAX as usize, "size {size} overflows a 2-byte field");
                self.data[marker.at..marker.at + 2].copy_from_slice(&(size as u16).to_be_bytes());
            }
        }
        marker.redeemed = true;
    }

    /// Enter bit mode. Byte writes resume once the returned writer is gone.
    pub fn bits(&mut self) -> BitWriter<'_> {
        let bit_pos = self.data.len() * 8;
        BitWriter { buf: self, bit_pos }
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizeWidth {
    Byte,
    Short,
}

/// Reserved size field, redeemable exactly once
#[derive(Debug)]
pub struct SizeMarker {
    at: usize,
    start: usize,
    width: SizeWidth,
    redeemed: bool,
}

impl SizeMarker {
    fn new(at: usize, width: SizeWidth) -> Self {
        let start = at + match width {
            SizeWidth::Byte => 1,
            SizeWidth::Short => 2,
        };
        Self { at, start, width, redeemed: false }
    }

    /// Offset the size is measured from
    pub fn start(&self) -> usize {
        self.start
    }
}

impl Drop for SizeMarker {
    fn drop(&mut self) {
        if !self.redeemed && !std::thread::panicking() {
            debug_assert!(false, "size marker at offset {} dropped without patch", self.at);
        }
    }
}

/// Bit-mode view over a [`PacketBuffer`]
///
/// Bits are written most-significant first and packed across byte
/// boundaries. Bytes are appended zeroed as the cursor reaches them, so the
/// buffer is always padded to a whole byte.
#[derive(Debug)]
pub struct BitWriter<'a> {
    buf: &'a mut PacketBuffer,
    bit_pos: usize,
}

impl BitWriter<'_> {
    /// Write the low `width` bits of `value` (width 1..=32)
    pub fn write(&mut self, width: u32, value: u32) {
        assert!((1..=32).contains(&width), "bit width {width} out of range");
        let mut remaining = width;
        while remaining > 0 {
            let byte_index = self.bit_pos >> 3;
            if byte_index == self.buf.data.len() {
                self.buf.write_u8(0);
            }
            let free = 8 - (self.bit_pos & 7) as u32;
            let take = free.min(remaining);
            let chunk = ((value as u64 >> (remaining - take)) & ((1u64 << take) - 1)) as u8;
            self.buf.data[byte_index] |= chunk << (free - take);
            self.bit_pos += take as usize;
            remaining -= take;
        }
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write(1, value as u32);
    }

    /// Bits written since the buffer started
    pub fn position(&self) -> usize {
        self.bit_pos
    }

    /// Leave bit mode
    pub fn finish(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_fields() {
        let mut buf = PacketBuffer::new();
        buf.write_u8(0x12);
        buf.write_u16(0x3456);
        buf.write_u32(0x789A_BCDE);
        buf.write_i8(-1);
        buf.write_i16(-2);
        buf.write_i32(-3);
        assert_eq!(
            buf.as_bytes(),
            &[
                0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xFF, 0xFF, 0xFE, 0xFF, 0xFF, 0xFF,
                0xFD
            ]
        );
    }

    #[test]
    fn test_transformed_bytes() {
        let mut buf = PacketBuffer::new();
        buf.write_u8_add(1);
        buf.write_u8_neg(1);
        buf.write_u8_sub(1);
        buf.write_u8_neg(0);
        assert_eq!(buf.as_bytes(), &[129, 255, 127, 0]);
    }

    #[test]
    fn test_alternate_orders() {
        let mut buf = PacketBuffer::new();
        buf.write_u16_le(0x1234);
        buf.write_u16_add(0x1234);
        buf.write_u16_le_add(0x1234);
        buf.write_u32_le(0x1122_3344);
        buf.write_u32_me(0x1122_3344);
        assert_eq!(
            buf.as_bytes(),
            &[
                0x34, 0x12, 0x12, 0xB4, 0xB4, 0x12, 0x44, 0x33, 0x22, 0x11, 0x33, 0x44, 0x11,
                0x22
            ]
        );
    }

    #[test]
    fn test_reversed_bytes() {
        let mut buf = PacketBuffer::new();
        buf.write_bytes_reversed(&[1, 2, 3]);
        buf.write_bytes_reversed(&[]);
        assert_eq!(buf.as_bytes(), &[3, 2, 1]);
    }

    #[test]
    fn test_string_is_terminated() {
        let mut buf = PacketBuffer::new();
        buf.write_str("hi");
        buf.write_str("");
        assert_eq!(buf.as_bytes(), &[b'h', b'i', 0, 0]);
    }

    #[test]
    fn test_smart() {
        let mut buf = PacketBuffer::new();
        buf.write_smart(0);
        buf.write_smart(127);
        buf.write_smart(128);
        assert_eq!(buf.as_bytes(), &[0, 127, 0x80, 0x80]);
    }

    #[test]
    fn test_patch_empty_payload() {
        let mut buf = PacketBuffer::new();
        buf.write_u8(99);
        let size = buf.size_u8();
        buf.patch(size);
        assert_eq!(buf.as_bytes(), &[99, 0]);

        let mut buf = PacketBuffer::new();
        let size = buf.size_u16();
        buf.patch(size);
        assert_eq!(buf.as_bytes(), &[0, 0]);
    }

    #[test]
    fn test_patch_measures_from_start() {
        let mut buf = PacketBuffer::new();
        buf.write_u8(72);
        let size = buf.size_u16();
        assert_eq!(size.start(), 3);
        buf.write_u8(7);
        buf.patch(size);
        assert_eq!(buf.as_bytes(), &[72, 0, 1, 7]);
    }

    #[test]
    fn test_patch_byte_field_single_byte_payload() {
        let mut buf = PacketBuffer::new();
        buf.write_u8(99);
        let size = buf.size_u8();
        assert_eq!(size.start(), 2);
        buf.write_u8(0x42);
        buf.patch(size);
        assert_eq!(buf.as_bytes(), &[99, 1, 0x42]);
    }

    #[test]
    fn test_patch_boundaries() {
        let mut buf = PacketBuffer::new();
        let size = buf.size_u8();
        buf.write_bytes(&[0xAA; 255]);
        buf.patch(size);
        assert_eq!(buf.as_bytes()[0], 255);

        let mut buf = PacketBuffer::with_limit(2 + 65535);
        let size = buf.size_u16();
        buf.write_bytes(&vec![0x55; 65535]);
        buf.patch(size);
        assert_eq!(&buf.as_bytes()[..2], &[0xFF, 0xFF]);
    }

    #[test]
    #[should_panic(expected = "overflows a 1-byte field")]
    fn test_patch_overflow_panics() {
        let mut buf = PacketBuffer::new();
        let size = buf.size_u8();
        buf.write_bytes(&[0; 256]);
        buf.patch(size);
    }

    #[test]
    #[should_panic(expected = "overflows a 2-byte field")]
    fn test_patch_short_overflow_panics() {
        let mut buf = PacketBuffer::with_limit(2 + 65536);
        let size = buf.size_u16();
        buf.write_bytes(&vec![0; 65536]);
        buf.patch(size);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "dropped without patch")]
    fn test_unredeemed_marker_panics() {
        let mut buf = PacketBuffer::new();
        let _size = buf.size_u16();
    }

    #[test]
    #[should_panic(expected = "packet buffer overflow")]
    fn test_limit_enforced() {
        let mut buf = PacketBuffer::with_limit(3);
        buf.write_u16(1);
        buf.write_u16(2);
    }

    #[test]
    fn test_bits_pack_msb_first() {
        let mut buf = PacketBuffer::new();
        let mut bits = buf.bits();
        bits.write(1, 1);
        bits.write(2, 0);
        bits.write(5, 0b10101);
        bits.finish();
        assert_eq!(buf.as_bytes(), &[0b1001_0101]);
    }

    #[test]
    fn test_bits_cross_byte_boundaries() {
        let mut buf = PacketBuffer::new();
        let mut bits = buf.bits();
        bits.write(3, 0b101);
        bits.write(10, 0b11_0000_0011);
        bits.finish();
        assert_eq!(buf.as_bytes(), &[0b1011_1000, 0b0001_1000]);
    }

    #[test]
    fn test_bits_mask_value_to_width() {
        let mut buf = PacketBuffer::new();
        let mut bits = buf.bits();
        bits.write(4, 0xFFFF_FFF5);
        bits.finish();
        assert_eq!(buf.as_bytes(), &[0x50]);
    }

    #[test]
    fn test_bits_full_width() {
        let mut buf = PacketBuffer::new();
        let mut bits = buf.bits();
        bits.write(1, 0);
        bits.write(32, 0xDEAD_BEEF);
        bits.finish();
        assert_eq!(buf.as_bytes(), &[0x6F, 0x56, 0xDF, 0x77, 0x80]);
    }

    #[test]
    fn test_partial_byte_padded_before_bytes_resume() {
        let mut buf = PacketBuffer::new();
        buf.write_u8(0xAB);
        let mut bits = buf.bits();
        bits.write(1, 1);
        assert_eq!(bits.position(), 9);
        bits.finish();
        buf.write_u8(0xCD);
        assert_eq!(buf.as_bytes(), &[0xAB, 0x80, 0xCD]);
    }

    #[test]
    fn test_consecutive_bit_sections_are_byte_aligned() {
        let mut buf = PacketBuffer::new();
        let mut bits = buf.bits();
        bits.write_bool(true);
        bits.finish();
        let mut bits = buf.bits();
        bits.write_bool(true);
        bits.finish();
        assert_eq!(buf.as_bytes(), &[0x80, 0x80]);
    }

    #[test]
    #[should_panic(expected = "bit width 0 out of range")]
    fn test_zero_width_panics() {
        let mut buf = PacketBuffer::new();
        buf.bits().write(0, 0);
    }
}
