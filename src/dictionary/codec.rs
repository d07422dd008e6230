//! Fixed-layout record codec.
//!
//! Records are encoded in native byte order field by field, then normalised to the
//! file's byte order with a field-width descriptor. The descriptor is a sequence of
//! `<count><type>` items where the type is `c` (1 byte), `s` (2), `l` (4) or `d` (8),
//! e.g. `"24c24c4d2s"`. Swapping reverses every multi-byte field and leaves text alone,
//! so the one routine serves every record kind.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    #[cfg(target_endian = "little")]
    pub const NATIVE: ByteOrder = ByteOrder::Little;
    #[cfg(target_endian = "big")]
    pub const NATIVE: ByteOrder = ByteOrder::Big;

    /// Which byte order, if any, yields `magic` from the four leading bytes of a file.
    pub fn detect(bytes: [u8; 4], magic: u32) -> Option<ByteOrder> {
        if u32::from_le_bytes(bytes) == magic {
            Some(ByteOrder::Little)
        } else if u32::from_be_bytes(bytes) == magic {
            Some(ByteOrder::Big)
        } else {
            None
        }
    }

    pub fn magic_bytes(self, magic: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => magic.to_le_bytes(),
            ByteOrder::Big => magic.to_be_bytes(),
        }
    }

    pub fn is_native(self) -> bool {
        self == Self::NATIVE
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ByteOrder::Little => "little-endian",
            ByteOrder::Big => "big-endian",
        })
    }
}

/// A parsed field-width descriptor: runs of `(count, width)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    runs: Vec<(usize, usize)>,
}

impl FieldLayout {
    pub fn parse(descriptor: &str) -> Result<Self, String> {
        let mut runs = Vec::new();
        let mut count: Option<usize> = None;
        for ch in descriptor.chars() {
            if let Some(d) = ch.to_digit(10) {
                count = Some(count.unwrap_or(0) * 10 + d as usize);
                continue;
            }
            let width = match ch {
                'c' => 1,
                's' => 2,
                'l' => 4,
                'd' => 8,
                ' ' | ',' => continue,
                other => return Err(format!("unknown field type `{other}` in `{descriptor}`")),
            };
            let n = count.take().unwrap_or(1);
            if n == 0 {
                return Err(format!("zero repeat count in `{descriptor}`"));
            }
            runs.push((n, width));
        }
        if count.is_some() {
            return Err(format!("dangling repeat count in `{descriptor}`"));
        }
        Ok(FieldLayout { runs })
    }

    /// Total record size in bytes.
    pub fn size(&self) -> usize {
        self.runs.iter().map(|(n, w)| n * w).sum()
    }

    /// Reverse the bytes of every multi-byte field in place.
    pub fn swap(&self, record: &mut [u8]) {
        debug_assert_eq!(record.len(), self.size());
        let mut pos = 0;
        for &(n, w) in &self.runs {
            if w == 1 {
                pos += n;
                continue;
            }
            for _ in 0..n {
                record[pos..pos + w].reverse();
                pos += w;
            }
        }
    }

    /// Offset of the first 8-byte field that does not sit on an 8-byte boundary.
    pub fn misaligned_double(&self) -> Option<usize> {
        let mut pos = 0;
        for &(n, w) in &self.runs {
            if w == 8 && pos % 8 != 0 {
                return Some(pos);
            }
            pos += n * w;
        }
        None
    }
}

/// Native-order writer for one record.
pub struct RecordWriter {
    buf: Vec<u8>,
}

impl RecordWriter {
    pub(crate) fn with_capacity(size: usize) -> Self {
        RecordWriter {
            buf: Vec::with_capacity(size),
        }
    }

    /// Write `text` into a NUL padded field of `width` bytes; the last byte is always NUL.
    pub fn text(&mut self, text: &str, width: usize) {
        let bytes = text.as_bytes();
        let n = bytes.len().min(width - 1);
        self.buf.extend_from_slice(&bytes[..n]);
        self.buf.resize(self.buf.len() + width - n, 0);
    }

    pub fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    pub fn f64s(&mut self, vs: &[f64]) {
        for v in vs {
            self.f64(*v);
        }
    }

    pub fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    pub fn fill(&mut self, n: usize) {
        self.buf.resize(self.buf.len() + n, 0);
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Native-order reader for one record.
pub struct RecordReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        RecordReader { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    pub fn text(&mut self, width: usize) -> String {
        let field = &self.buf[self.pos..self.pos + width];
        self.pos += width;
        let end = field.iter().position(|&b| b == 0).unwrap_or(width);
        String::from_utf8_lossy(&field[..end]).into_owned()
    }

    pub fn f64(&mut self) -> f64 {
        f64::from_ne_bytes(self.take::<8>())
    }

    pub fn f64s<const N: usize>(&mut self) -> [f64; N] {
        let mut out = [0.0; N];
        for v in out.iter_mut() {
            *v = self.f64();
        }
        out
    }

    pub fn i16(&mut self) -> i16 {
        i16::from_ne_bytes(self.take::<2>())
    }

    pub fn i32(&mut self) -> i32 {
        i32::from_ne_bytes(self.take::<4>())
    }

    pub fn skip(&mut self, n: usize) {
        self.pos += n;
    }
}

/// Length of the trailer every record ends with; its first byte holds the protection key.
pub const TRAILER: usize = 8;

/// Derive a non-zero obfuscation key from a record key.
pub(crate) fn protection_key(name: &str) -> u8 {
    let k = name
        .bytes()
        .fold(0x5Au8, |acc, b| acc.wrapping_mul(31).wrapping_add(b.to_ascii_uppercase()));
    if k == 0 { 0xA5 } else { k }
}

fn apply_key_stream(record: &mut [u8], key_pos: usize, key: u8) {
    let mut k = key;
    for (i, b) in record.iter_mut().enumerate() {
        if i == key_pos {
            continue;
        }
        *b ^= k;
        k = k.wrapping_mul(0x1D).wrapping_add(0x3B);
    }
}

/// Obfuscate a distribution record. This is not a security boundary.
pub(crate) fn protect(record: &mut [u8], key: u8) {
    let key_pos = record.len() - TRAILER;
    apply_key_stream(record, key_pos, key);
    record[key_pos] = key;
}

/// Undo [`protect`]; records with a zero key byte are left untouched.
pub(crate) fn unprotect(record: &mut [u8]) {
    let key_pos = record.len() - TRAILER;
    let key = record[key_pos];
    if key != 0 {
        apply_key_stream(record, key_pos, key);
        record[key_pos] = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn descriptor_size_and_alignment() {
        let layout = FieldLayout::parse("24c24c4d64c64c2s4c8c").unwrap();
        assert_eq!(layout.size(), 224);
        assert_eq!(layout.misaligned_double(), None);

        let bad = FieldLayout::parse("3c1d").unwrap();
        assert_eq!(bad.misaligned_double(), Some(3));
    }

    #[test]
    fn descriptor_errors() {
        assert!(FieldLayout::parse("4x").is_err());
        assert!(FieldLayout::parse("4c12").is_err());
        assert!(FieldLayout::parse("0d").is_err());
    }

    #[test]
    fn swap_reverses_numbers_only() {
        let layout = FieldLayout::parse("2c1s1l").unwrap();
        let mut rec = [b'A', b'B', 1, 2, 3, 4, 5, 6];
        layout.swap(&mut rec);
        assert_eq!(rec, [b'A', b'B', 2, 1, 6, 5, 4, 3]);
    }

    #[test]
    fn magic_detects_order() {
        let magic = u32::from_be_bytes(*b"GXE1");
        assert_eq!(ByteOrder::detect(*b"GXE1", magic), Some(ByteOrder::Big));
        assert_eq!(ByteOrder::detect(*b"1EXG", magic), Some(ByteOrder::Little));
        assert_eq!(ByteOrder::detect(*b"JUNK", magic), None);
    }

    #[test]
    fn text_fields_truncate_and_pad() {
        let mut w = RecordWriter::with_capacity(8);
        w.text("ABCDEFGHIJ", 4);
        w.text("Z", 4);
        let bytes = w.finish();
        assert_eq!(&bytes, b"ABC\0Z\0\0\0");
        let mut r = RecordReader::new(&bytes);
        assert_eq!(r.text(4), "ABC");
        assert_eq!(r.text(4), "Z");
    }

    #[test]
    fn protection_is_reversible() {
        let original: Vec<u8> = (0u8..32).collect();
        let mut rec = original.clone();
        rec[24] = 0;
        let plain = rec.clone();
        protect(&mut rec, protection_key("NAD27"));
        assert_ne!(rec, plain);
        unprotect(&mut rec);
        assert_eq!(rec, plain);
    }
}
