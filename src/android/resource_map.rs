use crate::android::buffer::ByteView;
use crate::android::chunk::Chunk;

/// Resource map of a document: resource IDs referenced by their 0-based index.
///
/// Attribute name indices past the end of the map resolve to resource ID `0` rather than
/// failing, the same relaxed lookup the Android runtime applies.
#[derive(Clone, Copy, Debug)]
pub struct ResourceMap<'a> {
    contents: ByteView<'a>,
    entry_count: usize,
}

impl<'a> ResourceMap<'a> {
    pub fn new(chunk: &Chunk<'a>) -> Self {
        let contents = chunk.contents();
        // Each entry is a four byte int32 resource ID.
        let entry_count = contents.len() / 4;
        ResourceMap {
            contents,
            entry_count,
        }
    }

    pub fn len(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Returns the resource ID at `index`, or `0` when the index is out of range.
    pub fn resource_id(&self, index: u32) -> i32 {
        let index = index as usize;
        if index >= self.entry_count {
            return 0;
        }
        self.contents
            .u32_at(index * 4)
            .map(|id| id as i32)
            .unwrap_or(0)
    }
}
