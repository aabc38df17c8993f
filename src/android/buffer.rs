use crate::error::ApkResult;

/// A range-scoped, read-only cursor over a shared byte slice.
///
/// All offsets taken and returned by a view are relative to its own start. Reads never
/// reach outside `[start, end)`, even when the backing slice extends further, so a
/// sub-view handed to a decoder cannot leak access to its neighbours. Multi-byte values
/// are little-endian.
#[derive(Clone, Copy, Debug)]
pub struct ByteView<'a> {
    data: &'a [u8],
    start: usize,
    end: usize,
    pos: usize,
}

impl<'a> ByteView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteView {
            data,
            start: 0,
            end: data.len(),
            pos: 0,
        }
    }

    /// An empty view, used where a section is absent.
    pub fn empty() -> Self {
        ByteView::new(&[])
    }

    /// A new view over `[start, end)` of this view, with its own cursor at zero.
    pub fn slice(&self, start: usize, end: usize) -> ApkResult<ByteView<'a>> {
        if start > end || end > self.len() {
            fail!(
                BufferUnderflow,
                "Slice [{}, {}) out of bounds of view of {} bytes",
                start,
                end,
                self.len()
            );
        }
        Ok(ByteView {
            data: self.data,
            start: self.start + start,
            end: self.start + end,
            pos: 0,
        })
    }

    /// A new view over everything from the cursor to the end of this view.
    pub fn rest(&self) -> ByteView<'a> {
        ByteView {
            data: self.data,
            start: self.start + self.pos,
            end: self.end,
            pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute offset of the cursor within the backing slice, for diagnostics.
    pub fn absolute_position(&self) -> usize {
        self.start + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.len() - self.pos
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    pub fn set_position(&mut self, position: usize) -> ApkResult<()> {
        if position > self.len() {
            fail!(
                BufferUnderflow,
                "New position {} cannot be greater than the view's size {}",
                position,
                self.len()
            );
        }
        self.pos = position;
        Ok(())
    }

    /// Moves the cursor to the end of the view.
    pub fn consume_all(&mut self) {
        self.pos = self.len();
    }

    pub fn skip(&mut self, count: usize) -> ApkResult<()> {
        let target = self.pos.checked_add(count).ok_or_else(|| {
            err!(BufferUnderflow, "Skipping {} bytes overflows the cursor", count)
        })?;
        self.set_position(target)
    }

    /// The bytes of `[offset, offset + length)` without moving the cursor.
    pub fn bytes_at(&self, offset: usize, length: usize) -> ApkResult<&'a [u8]> {
        let available = self.len().saturating_sub(offset);
        if offset > self.len() || length > available {
            fail!(
                BufferUnderflow,
                "There are less than {} bytes left to read at offset {}: {} available",
                length,
                offset,
                available
            );
        }
        let begin = self.start + offset;
        Ok(&self.data[begin..begin + length])
    }

    pub fn read_bytes(&mut self, length: usize) -> ApkResult<&'a [u8]> {
        let bytes = self.bytes_at(self.pos, length)?;
        self.pos += length;
        Ok(bytes)
    }

    /// Everything in the view, independent of the cursor.
    pub fn as_slice(&self) -> &'a [u8] {
        &self.data[self.start..self.end]
    }

    pub fn u8_at(&self, offset: usize) -> ApkResult<u8> {
        Ok(self.bytes_at(offset, 1)?[0])
    }

    pub fn u16_at(&self, offset: usize) -> ApkResult<u16> {
        let b = self.bytes_at(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32_at(&self, offset: usize) -> ApkResult<u32> {
        let b = self.bytes_at(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u8(&mut self) -> ApkResult<u8> {
        let value = self.u8_at(self.pos)?;
        self.pos += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> ApkResult<u16> {
        let value = self.u16_at(self.pos)?;
        self.pos += 2;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> ApkResult<u32> {
        let value = self.u32_at(self.pos)?;
        self.pos += 4;
        Ok(value)
    }
}
