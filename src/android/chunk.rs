use crate::android::buffer::ByteView;
use crate::error::ApkResult;
use log::debug;

pub const RES_STRING_POOL_TYPE: u16 = 0x0001;
pub const RES_XML_TYPE: u16 = 0x0003;
pub const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
pub const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
pub const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;

/// Size of the `type`/`headerSize`/`chunkSize` prefix every chunk starts with.
pub const CHUNK_HEADER_MIN_SIZE: usize = 8;

/// A typed chunk of a resource or binary XML document: a header followed by contents.
///
/// The header view covers the whole header including the 8-byte common prefix; the
/// contents view covers everything after the header up to the declared chunk size.
#[derive(Clone, Copy, Debug)]
pub struct Chunk<'a> {
    chunk_type: u16,
    header: ByteView<'a>,
    contents: ByteView<'a>,
}

impl<'a> Chunk<'a> {
    /// Consumes the chunk at the cursor of `input`.
    ///
    /// Returns `Ok(None)` and moves `input` to its end when what is left cannot hold a
    /// whole chunk: Android ignores a trailing chunk whose header or declared size does
    /// not fit into the file.
    pub fn read(input: &mut ByteView<'a>) -> ApkResult<Option<Chunk<'a>>> {
        if input.remaining() < CHUNK_HEADER_MIN_SIZE {
            debug!(
                "ignoring {} trailing bytes too short for a chunk header",
                input.remaining()
            );
            input.consume_all();
            return Ok(None);
        }

        let original_position = input.position();
        let chunk_type = input.read_u16()?;
        let header_size = input.read_u16()? as usize;
        let chunk_size = input.read_u32()? as usize;

        match chunk_size.checked_sub(CHUNK_HEADER_MIN_SIZE) {
            Some(chunk_remaining) if chunk_remaining <= input.remaining() => {}
            _ => {
                debug!(
                    "ignoring trailing chunk 0x{:04x} of {} bytes with only {} bytes left",
                    chunk_type,
                    chunk_size,
                    input.remaining()
                );
                input.consume_all();
                return Ok(None);
            }
        }

        if header_size < CHUNK_HEADER_MIN_SIZE {
            fail!(
                MalformedChunk,
                "Malformed chunk: header too short: {} bytes",
                header_size
            );
        } else if header_size > chunk_size {
            fail!(
                MalformedChunk,
                "Malformed chunk: header too long: {} bytes. Chunk size: {} bytes",
                header_size,
                chunk_size
            );
        }

        let content_start = original_position + header_size;
        let chunk_end = original_position + chunk_size;
        let header = input.slice(original_position, content_start)?;
        let contents = input.slice(content_start, chunk_end)?;
        input.set_position(chunk_end)?;

        Ok(Some(Chunk {
            chunk_type,
            header,
            contents,
        }))
    }

    pub fn chunk_type(&self) -> u16 {
        self.chunk_type
    }

    /// The chunk header, cursor at zero.
    pub fn header(&self) -> ByteView<'a> {
        self.header
    }

    /// The chunk contents, cursor at zero.
    pub fn contents(&self) -> ByteView<'a> {
        self.contents
    }
}
