//! Output buffer for encoders

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use super::{Codec, Endian, LabelMap};

macro_rules! write_fn {
    ($name:ident, $ty:ty, $size:expr, $method:ident) => {
        #[doc = concat!("Appends a `", stringify!($ty), "` in the codec byte order.")]
        pub fn $name(&mut self, v: $ty) {
            let mut buf = [0u8; $size];
            match self.codec.endian {
                Endian::Little => LittleEndian::$method(&mut buf, v),
                Endian::Big => BigEndian::$method(&mut buf, v),
            }
            self.data.extend_from_slice(&buf);
        }
    };
}

/// A growing byte buffer with absolute addressing.
///
/// Addresses handed out by [`ByteWriter::address`] already include the
/// image base, so they can be written into pointer fields directly.
/// Every encoder records the structures it emits in the label map.
#[derive(Debug, Clone)]
pub struct ByteWriter {
    data: Vec<u8>,
    codec: Codec,
    labels: LabelMap,
}

impl ByteWriter {
    pub fn new(codec: Codec) -> Self {
        Self {
            data: Vec::new(),
            codec,
            labels: LabelMap::new(),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current position as a buffer offset.
    pub fn pos(&self) -> usize {
        self.data.len()
    }

    /// Current position as an absolute address.
    pub fn address(&self) -> u32 {
        self.codec.image_base.wrapping_add(self.data.len() as u32)
    }

    /// Converts an absolute address handed out by this writer back to a
    /// buffer offset.
    pub fn offset_of(&self, address: u32) -> u32 {
        address.wrapping_sub(self.codec.image_base)
    }

    pub fn align(&mut self, alignment: usize) {
        let padding = (alignment - (self.data.len() % alignment)) % alignment;
        self.data.extend(std::iter::repeat_n(0u8, padding));
    }

    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.data.push(v as u8);
    }

    write_fn!(write_u16, u16, 2, write_u16);
    write_fn!(write_i16, i16, 2, write_i16);
    write_fn!(write_u32, u32, 4, write_u32);
    write_fn!(write_i32, i32, 4, write_i32);
    write_fn!(write_u64, u64, 8, write_u64);
    write_fn!(write_i64, i64, 8, write_i64);
    write_fn!(write_f32, f32, 4, write_f32);
    write_fn!(write_f64, f64, 8, write_f64);

    /// Writes an absolute address, or a null pointer.
    pub fn write_ptr(&mut self, address: Option<u32>) {
        self.write_u32(address.unwrap_or(0));
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Writes a null-terminated string in the codec text encoding and
    /// returns its address.
    pub fn write_cstring(&mut self, s: &str) -> u32 {
        let address = self.address();
        let encoded = self.codec.text.encode(s);
        self.data.extend_from_slice(&encoded);
        self.data.push(0);
        address
    }

    /// Overwrites a `u16` at a buffer offset already written.
    pub fn patch_u16(&mut self, pos: usize, v: u16) {
        let slot = &mut self.data[pos..pos + 2];
        match self.codec.endian {
            Endian::Little => LittleEndian::write_u16(slot, v),
            Endian::Big => BigEndian::write_u16(slot, v),
        }
    }

    /// Overwrites a `u32` at a buffer offset already written.
    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        let slot = &mut self.data[pos..pos + 4];
        match self.codec.endian {
            Endian::Little => LittleEndian::write_u32(slot, v),
            Endian::Big => BigEndian::write_u32(slot, v),
        }
    }

    /// Records `name` at `address`. The first address recorded for a name wins.
    pub fn add_label(&mut self, name: impl Into<String>, address: u32) {
        self.labels.insert(name, address);
    }

    pub fn label(&self, name: &str) -> Option<u32> {
        self.labels.address_of(name)
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the writer, returning the bytes and the label map.
    pub fn finish(self) -> (Vec<u8>, LabelMap) {
        (self.data, self.labels)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_respects_endianness() {
        let mut le = Codec::little_endian().writer();
        le.write_u32(0x1234_5678);
        assert_eq!(le.as_bytes(), &[0x78, 0x56, 0x34, 0x12]);

        let mut be = Codec::big_endian().writer();
        be.write_u16(0xABCD);
        be.write_f32(1.0);
        assert_eq!(be.as_bytes(), &[0xAB, 0xCD, 0x3F, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn test_address_includes_image_base() {
        let mut w = Codec::default().with_image_base(0x8C01_0000).writer();
        w.write_u32(0);
        assert_eq!(w.address(), 0x8C01_0004);
        assert_eq!(w.offset_of(w.address()), 4);
    }

    #[test]
    fn test_align_and_patch() {
        let mut w = Codec::default().writer();
        w.write_u8(1);
        w.align(4);
        assert_eq!(w.len(), 4);
        w.write_u32(0);
        w.patch_u32(4, 0xDEAD_BEEF);
        assert_eq!(&w.as_bytes()[4..], &[0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn test_first_label_wins() {
        let mut w = Codec::default().writer();
        w.add_label("object_0", 0x10);
        w.add_label("object_0", 0x20);
        assert_eq!(w.label("object_0"), Some(0x10));
    }
}
