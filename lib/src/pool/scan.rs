use crate::errors::Error;
use crate::pool::entry::decode_modified_utf8;

/// Random access into the constant pool of a raw class image
///
/// Parsing a whole class just to look at a few constants is wasteful, so this
/// walks the pool region once, recording where each entry's data begins, and
/// then answers lookups straight out of the original byte slice. No entry is
/// decoded until asked for.
///
/// The pool count sits at byte offset 8 of the image (right after the magic
/// and version), and entry data follows from offset 10.
pub struct PoolScan<'a> {
    bytes: &'a [u8],
    /// Byte offset of each entry's data (past its tag); 0 marks slot 0 and
    /// the unusable slots trailing wide entries
    offsets: Vec<u32>,
    end: u32,
}

const POOL_COUNT_OFFSET: usize = 8;
const POOL_DATA_OFFSET: usize = 10;

impl<'a> PoolScan<'a> {
    /// Scan the pool region of a class image
    pub fn new(bytes: &'a [u8]) -> Result<PoolScan<'a>, Error> {
        let mut offsets = vec![];
        let end = walk(bytes, Some(&mut offsets))?;
        Ok(PoolScan { bytes, offsets, end })
    }

    /// Byte offset of the first thing after the pool (the access flags),
    /// without recording per-entry offsets
    pub fn end_offset(bytes: &[u8]) -> Result<u32, Error> {
        walk(bytes, None)
    }

    /// Number of slots, as the image's count field reports it
    pub fn size(&self) -> u16 {
        self.offsets.len() as u16
    }

    /// Offset just past the last pool entry
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Tag byte of the entry at an index
    pub fn tag(&self, index: u16) -> Result<u8, Error> {
        let data = self.data_offset(index)?;
        self.read_u8(data - 1)
    }

    /// Byte offset of the entry's data, past its tag
    pub fn data_offset(&self, index: u16) -> Result<u32, Error> {
        match self.offsets.get(index as usize) {
            Some(&offset) if offset != 0 => Ok(offset),
            _ => Err(Error::IndexOutOfRange {
                index: index as usize,
                size: self.offsets.len(),
            }),
        }
    }

    /// Decode the `Utf8` entry at an index
    pub fn utf8(&self, index: u16) -> Result<String, Error> {
        let data = self.data_offset(index)? as usize;
        if self.read_u8(data as u32 - 1)? != 1 {
            return Err(Error::MalformedFormat(format!(
                "constant {} is not Utf8",
                index
            )));
        }
        let len = self.read_u16(data as u32)? as usize;
        let start = data + 2;
        match self.bytes.get(start..start + len) {
            Some(raw) => decode_modified_utf8(raw),
            None => Err(Error::UnexpectedEndOfInput),
        }
    }

    /// Read the byte at an absolute offset
    pub fn read_u8(&self, offset: u32) -> Result<u8, Error> {
        match self.bytes.get(offset as usize) {
            Some(&b) => Ok(b),
            None => Err(Error::UnexpectedEndOfInput),
        }
    }

    /// Read a big-endian `u16` at an absolute offset
    pub fn read_u16(&self, offset: u32) -> Result<u16, Error> {
        let at = offset as usize;
        match self.bytes.get(at..at + 2) {
            Some(b) => Ok(u16::from_be_bytes([b[0], b[1]])),
            None => Err(Error::UnexpectedEndOfInput),
        }
    }

    /// Read a big-endian `u32` at an absolute offset
    pub fn read_u32(&self, offset: u32) -> Result<u32, Error> {
        let at = offset as usize;
        match self.bytes.get(at..at + 4) {
            Some(b) => Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
            None => Err(Error::UnexpectedEndOfInput),
        }
    }
}

/// Step over every pool entry, optionally recording data offsets, and return
/// the offset just past the pool
fn walk(bytes: &[u8], mut offsets: Option<&mut Vec<u32>>) -> Result<u32, Error> {
    let count = match bytes.get(POOL_COUNT_OFFSET..POOL_COUNT_OFFSET + 2) {
        Some(b) => u16::from_be_bytes([b[0], b[1]]) as u32,
        None => return Err(Error::UnexpectedEndOfInput),
    };
    if count == 0 {
        return Err(Error::MalformedFormat(
            "constant pool count must be at least 1".to_string(),
        ));
    }
    if let Some(offsets) = offsets.as_mut() {
        offsets.reserve(count as usize);
        offsets.push(0);
    }

    let mut at = POOL_DATA_OFFSET;
    let mut index = 1;
    while index < count {
        let tag = match bytes.get(at) {
            Some(&tag) => tag,
            None => return Err(Error::UnexpectedEndOfInput),
        };
        if let Some(offsets) = offsets.as_mut() {
            offsets.push(at as u32 + 1);
        }

        // Per-tag entry sizes, tag byte included
        let size = match tag {
            1 => {
                let len = match bytes.get(at + 1..at + 3) {
                    Some(b) => u16::from_be_bytes([b[0], b[1]]) as usize,
                    None => return Err(Error::UnexpectedEndOfInput),
                };
                3 + len
            }
            7 | 8 | 16 | 19 | 20 => 3,
            3 | 4 | 9 | 10 | 11 | 12 | 18 => 5,
            5 | 6 => 9,
            15 => 4,
            other => {
                return Err(Error::MalformedFormat(format!(
                    "unknown constant pool tag {} at offset {}",
                    other, at
                )))
            }
        };

        if tag == 5 || tag == 6 {
            if index + 2 > count {
                return Err(Error::MalformedFormat(format!(
                    "wide constant at index {} exceeds pool count {}",
                    index, count
                )));
            }
            if let Some(offsets) = offsets.as_mut() {
                offsets.push(0);
            }
            index += 2;
        } else {
            index += 1;
        }
        at += size;
    }

    if at > bytes.len() {
        return Err(Error::UnexpectedEndOfInput);
    }
    Ok(at as u32)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::binary::Serialize;
    use crate::pool::{ConstantPool, Entry};

    fn fake_image(pool: &ConstantPool) -> Vec<u8> {
        let mut bytes = vec![];
        0xCAFEBABEu32.serialize(&mut bytes).unwrap();
        0u16.serialize(&mut bytes).unwrap();
        55u16.serialize(&mut bytes).unwrap();
        pool.serialize(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn offsets_line_up_with_entries() {
        let mut pool = ConstantPool::new();
        let class = pool.find_or_create_class("Example").unwrap();
        let long = pool.find_or_create_long(9).unwrap();
        let int = pool.find_or_create_int(3).unwrap();
        let bytes = fake_image(&pool);

        let scan = PoolScan::new(&bytes).unwrap();
        assert_eq!(scan.size(), pool.size());
        assert_eq!(scan.tag(class).unwrap(), 7);
        assert_eq!(scan.tag(long).unwrap(), 5);
        assert_eq!(scan.tag(int).unwrap(), 3);
        assert_eq!(scan.utf8(1).unwrap(), "Example");

        // The class entry points back at its name
        let name = scan.read_u16(scan.data_offset(class).unwrap()).unwrap();
        assert_eq!(name, 1);

        // The unusable slot after the long is unreachable
        assert!(scan.data_offset(long + 1).is_err());
        assert_eq!(scan.end(), bytes.len() as u32);
    }

    #[test]
    fn end_offset_without_table() {
        let mut pool = ConstantPool::new();
        pool.find_or_create_string("hi").unwrap();
        let bytes = fake_image(&pool);
        assert_eq!(PoolScan::end_offset(&bytes).unwrap(), bytes.len() as u32);
    }

    #[test]
    fn unknown_tag_rejected() {
        let mut bytes = vec![];
        0xCAFEBABEu32.serialize(&mut bytes).unwrap();
        0u16.serialize(&mut bytes).unwrap();
        55u16.serialize(&mut bytes).unwrap();
        2u16.serialize(&mut bytes).unwrap();
        bytes.push(13);
        assert!(matches!(
            PoolScan::new(&bytes),
            Err(Error::MalformedFormat(_))
        ));
    }

    #[test]
    fn wide_entry_crossing_the_count_rejected() {
        let mut bytes = vec![];
        0xCAFEBABEu32.serialize(&mut bytes).unwrap();
        0u16.serialize(&mut bytes).unwrap();
        55u16.serialize(&mut bytes).unwrap();
        // Count leaves room for one slot, but a long needs two
        2u16.serialize(&mut bytes).unwrap();
        Entry::Long(7).serialize(&mut bytes).unwrap();
        assert!(matches!(
            PoolScan::new(&bytes),
            Err(Error::MalformedFormat(_))
        ));
    }

    #[test]
    fn zero_count_rejected() {
        let mut bytes = vec![];
        0xCAFEBABEu32.serialize(&mut bytes).unwrap();
        0u16.serialize(&mut bytes).unwrap();
        55u16.serialize(&mut bytes).unwrap();
        0u16.serialize(&mut bytes).unwrap();
        assert!(matches!(
            PoolScan::new(&bytes),
            Err(Error::MalformedFormat(_))
        ));
    }

    #[test]
    fn truncated_image_rejected() {
        let mut pool = ConstantPool::new();
        pool.append(Entry::Integer(5)).unwrap();
        let mut bytes = fake_image(&pool);
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(
            PoolScan::new(&bytes),
            Err(Error::UnexpectedEndOfInput)
        ));
    }
}
