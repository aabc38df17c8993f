use crate::android::buffer::ByteView;
use crate::android::chunk::{Chunk, CHUNK_HEADER_MIN_SIZE};
use crate::error::ApkResult;
use bitflags::bitflags;
use log::warn;
use std::cell::RefCell;
use std::collections::HashMap;

bitflags! {
    /// Flags of the string pool header.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct StringPoolFlags: u32 {
        const SORTED = 0x0000_0001;
        const UTF8 = 0x0000_0100;
    }
}

/// Bytes of the string pool header following the common chunk prefix.
const STRING_POOL_HEADER_FIELDS_SIZE: usize = 20;

const MAX_COUNT: u32 = i32::MAX as u32;

/// String pool of a document. Strings are referenced by their 0-based index.
///
/// Strings are decoded on first lookup and cached for the lifetime of the pool.
pub struct StringPool<'a> {
    contents: ByteView<'a>,
    strings: ByteView<'a>,
    string_count: u32,
    flags: StringPoolFlags,
    cache: RefCell<HashMap<u32, String>>,
}

impl<'a> StringPool<'a> {
    pub fn new(chunk: &Chunk<'a>) -> ApkResult<Self> {
        let mut header = chunk.header();
        let header_size = header.len();
        header.set_position(CHUNK_HEADER_MIN_SIZE)?;
        if header.remaining() < STRING_POOL_HEADER_FIELDS_SIZE {
            fail!(
                MalformedChunk,
                "XML chunk's header too short. Required at least {} bytes. Available: {} bytes",
                STRING_POOL_HEADER_FIELDS_SIZE,
                header.remaining()
            );
        }
        let string_count = header.read_u32()?;
        if string_count > MAX_COUNT {
            fail!(MalformedChunk, "Too many strings: {}", string_count);
        }
        let style_count = header.read_u32()?;
        if style_count > MAX_COUNT {
            fail!(MalformedChunk, "Too many styles: {}", style_count);
        }
        let flags = StringPoolFlags::from_bits_retain(header.read_u32()?);
        let strings_start = header.read_u32()? as usize;
        let styles_start = header.read_u32()? as usize;

        let contents = chunk.contents();
        let strings = if string_count > 0 {
            let section_start = strings_start.checked_sub(header_size).ok_or_else(|| {
                err!(
                    MalformedChunk,
                    "Strings offset ({}) inside the chunk header ({} bytes)",
                    strings_start,
                    header_size
                )
            })?;
            let section_end = if style_count > 0 {
                // Styles section follows the strings section
                if styles_start < strings_start {
                    fail!(
                        MalformedChunk,
                        "Styles offset ({}) < strings offset ({})",
                        styles_start,
                        strings_start
                    );
                }
                styles_start - header_size
            } else {
                contents.len()
            };
            contents.slice(section_start, section_end).map_err(|_| {
                err!(
                    MalformedChunk,
                    "Strings section [{}, {}) out of bounds of {} byte chunk contents",
                    section_start,
                    section_end,
                    contents.len()
                )
            })?
        } else {
            ByteView::empty()
        };

        Ok(StringPool {
            contents,
            strings,
            string_count,
            flags,
            cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn len(&self) -> u32 {
        self.string_count
    }

    pub fn is_empty(&self) -> bool {
        self.string_count == 0
    }

    pub fn is_utf8(&self) -> bool {
        self.flags.contains(StringPoolFlags::UTF8)
    }

    /// Returns the string at the 0-based `index`.
    pub fn get_string(&self, index: u32) -> ApkResult<String> {
        if index >= self.string_count {
            fail!(
                MalformedChunk,
                "Unsupported string index: {}, max: {}",
                index,
                self.string_count as i64 - 1
            );
        }
        if let Some(cached) = self.cache.borrow().get(&index) {
            return Ok(cached.clone());
        }

        let entry = (index as usize)
            .checked_mul(4)
            .ok_or_else(|| err!(MalformedChunk, "String index {} overflows offset table", index))?;
        let offset = self.contents.u32_at(entry)? as usize;
        if offset >= self.strings.len() {
            fail!(
                MalformedChunk,
                "Offset of string index {} out of bounds: {}, max: {}",
                index,
                offset,
                self.strings.len() as i64 - 1
            );
        }
        let mut encoded = self.strings;
        encoded.set_position(offset)?;
        let value = if self.is_utf8() {
            read_length_prefixed_utf8(&mut encoded)?
        } else {
            read_length_prefixed_utf16(&mut encoded)?
        };
        self.cache.borrow_mut().insert(index, value.clone());
        Ok(value)
    }
}

fn read_length_prefixed_utf16(encoded: &mut ByteView<'_>) -> ApkResult<String> {
    // 0x7fff or lower is a single u16, anything larger spreads 31 bits over two u16s
    // with the top bit of the first one set.
    let mut length_chars = encoded.read_u16()? as usize;
    if length_chars & 0x8000 != 0 {
        length_chars = ((length_chars & 0x7fff) << 16) | encoded.read_u16()? as usize;
    }
    if length_chars > (i32::MAX / 2) as usize {
        fail!(MalformedChunk, "String too long: {} uint16s", length_chars);
    }
    let bytes = encoded.read_bytes(length_chars * 2)?;
    // The runtime requires the UTF-16 form to be NUL terminated.
    if encoded.remaining() < 2 || encoded.read_u16()? != 0 {
        fail!(MalformedChunk, "UTF-16 encoded form of string not NULL terminated");
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok(String::from_utf16(&units).unwrap_or_else(|_| {
        warn!("string pool entry is not valid UTF-16, decoding lossily");
        String::from_utf16_lossy(&units)
    }))
}

fn read_length_prefixed_utf8(encoded: &mut ByteView<'_>) -> ApkResult<String> {
    // UTF-16 length in uint16s, unused beyond its encoded width
    read_utf8_length(encoded)?;
    let length_bytes = read_utf8_length(encoded)?;
    let bytes = encoded.read_bytes(length_bytes)?;
    // The runtime requires the UTF-8 form to be NUL terminated.
    if encoded.remaining() < 1 || encoded.read_u8()? != 0 {
        fail!(MalformedChunk, "UTF-8 encoded form of string not NULL terminated");
    }
    Ok(decode_utf8(bytes))
}

/// 0x7f or lower is a single byte, anything larger spreads 15 bits over two bytes with the
/// top bit of the first one set.
fn read_utf8_length(encoded: &mut ByteView<'_>) -> ApkResult<usize> {
    let mut length = encoded.read_u8()? as usize;
    if length & 0x80 != 0 {
        length = ((length & 0x7f) << 8) | encoded.read_u8()? as usize;
    }
    Ok(length)
}

fn decode_utf8(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    match cesu8::from_cesu8(bytes) {
        Ok(text) => text.into_owned(),
        Err(_) => {
            warn!("string pool entry is neither UTF-8 nor CESU-8, decoding lossily");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}
