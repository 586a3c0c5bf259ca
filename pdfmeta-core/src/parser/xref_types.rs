//! Cross-reference entry types
//!
//! ISO 32000-1 Section 7.5.4 (classic entries) and Section 7.5.8.3 (stream entries).

/// Type field of a cross-reference stream entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntryType {
    /// Type 0: free object
    Free,
    /// Type 1: object stored at a byte offset
    Uncompressed,
    /// Type 2: object stored inside an object stream
    Compressed,
    /// Any other type; readers treat it as a reference to the null object
    Unknown(u64),
}

impl XRefEntryType {
    pub fn from_value(value: u64) -> Self {
        match value {
            0 => XRefEntryType::Free,
            1 => XRefEntryType::Uncompressed,
            2 => XRefEntryType::Compressed,
            other => XRefEntryType::Unknown(other),
        }
    }
}

/// Location of one object number in the merged index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    Free {
        next_free: u32,
        generation: u16,
    },
    InUse {
        offset: u64,
        generation: u16,
    },
    Compressed {
        /// Object number of the containing object stream
        stream_number: u32,
        index: u32,
    },
}

impl XRefEntry {
    /// Build an entry from the three decoded fields of a stream row.
    pub fn from_stream_fields(kind: XRefEntryType, field2: u64, field3: u64) -> Self {
        match kind {
            XRefEntryType::Uncompressed => XRefEntry::InUse {
                offset: field2,
                generation: clamp_generation(field3),
            },
            XRefEntryType::Compressed => match (u32::try_from(field2), u32::try_from(field3)) {
                (Ok(stream_number), Ok(index)) => XRefEntry::Compressed {
                    stream_number,
                    index,
                },
                _ => XRefEntry::free(),
            },
            XRefEntryType::Free => XRefEntry::Free {
                next_free: u32::try_from(field2).unwrap_or(0),
                generation: clamp_generation(field3),
            },
            XRefEntryType::Unknown(_) => XRefEntry::free(),
        }
    }

    pub fn free() -> Self {
        XRefEntry::Free {
            next_free: 0,
            generation: 0,
        }
    }

    pub fn is_in_use(&self) -> bool {
        !matches!(self, XRefEntry::Free { .. })
    }

    /// Generation an indirect reference must carry; objects in object streams are always 0.
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } | XRefEntry::InUse { generation, .. } => *generation,
            XRefEntry::Compressed { .. } => 0,
        }
    }
}

fn clamp_generation(value: u64) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}
