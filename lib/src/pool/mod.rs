//! Constant pool storage, deduplication, and the raw-bytes scanner

mod entry;
mod scan;

pub use entry::{decode_modified_utf8, encode_modified_utf8, Entry, EntryKey};
pub use scan::PoolScan;

use crate::binary::Serialize;
use crate::errors::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::Result;

/// Class file constant pool
///
/// Slot 0 is reserved by the format and never usable; `Long` and `Double`
/// entries occupy two slots, with the trailing slot unusable. Unusable slots
/// are held as `None` so that vector positions and pool indices line up.
///
/// A reverse index from entry content to slot index backs the
/// `find_or_create_*` methods, so structurally identical constants always
/// share one slot. The index is kept current across in-place edits: mutating
/// an entry re-keys it, and its old key becomes available for reuse by a
/// later insertion.
pub struct ConstantPool {
    entries: Vec<Option<Entry>>,
    lookup: HashMap<EntryKey, u16>,
}

impl ConstantPool {
    /// Make a fresh pool containing only the reserved slot 0
    pub fn new() -> ConstantPool {
        ConstantPool {
            entries: vec![None],
            lookup: HashMap::new(),
        }
    }

    /// Count of slots, reserved slot 0 and wide placeholders included
    ///
    /// This is exactly the `constant_pool_count` the serialized form carries:
    /// one more than the highest valid index.
    pub fn size(&self) -> u16 {
        self.entries.len() as u16
    }

    /// Look up the entry at an index
    ///
    /// Index 0, placeholder slots after wide entries, and indices past the
    /// end are all out of range.
    pub fn get(&self, index: u16) -> std::result::Result<&Entry, Error> {
        match self.entries.get(index as usize) {
            Some(Some(entry)) => Ok(entry),
            _ => Err(Error::IndexOutOfRange {
                index: index as usize,
                size: self.entries.len(),
            }),
        }
    }

    /// Convenience accessor for the string behind a `Utf8` slot
    pub fn utf8(&self, index: u16) -> std::result::Result<&str, Error> {
        match self.get(index)? {
            Entry::Utf8(string) => Ok(string),
            other => Err(Error::MalformedFormat(format!(
                "constant {} is not Utf8 (tag {})",
                index,
                other.tag()
            ))),
        }
    }

    /// Append an entry unconditionally and return its index
    ///
    /// Does not consult the reverse index before inserting, so this can
    /// create duplicates on purpose. The new entry is still registered as a
    /// lookup candidate unless its key is already claimed by an earlier slot.
    pub fn append(&mut self, entry: Entry) -> std::result::Result<u16, Error> {
        let index = self.entries.len();
        let width = entry.width() as usize;

        // The count field is a u16, so the highest usable index is 65534 for
        // narrow entries and 65533 for wide ones
        if index + width > u16::MAX as usize {
            return Err(Error::PoolOverflow);
        }

        self.lookup.entry(entry.key()).or_insert(index as u16);
        let wide = width == 2;
        self.entries.push(Some(entry));
        if wide {
            self.entries.push(None);
        }
        Ok(index as u16)
    }

    /// Replace the entry at an index with another of the same width
    ///
    /// Swapping a narrow entry for a wide one (or vice versa) would shift
    /// every later index, so it is rejected.
    pub fn replace(&mut self, index: u16, entry: Entry) -> std::result::Result<(), Error> {
        let old = self.get(index)?;
        if old.width() != entry.width() {
            return Err(Error::InvalidOperation(
                "replacement constant has a different width",
            ));
        }

        // Drop the stale reverse mapping only if this slot owns it: another
        // slot with equal content keeps its claim
        let old_key = old.key();
        if self.lookup.get(&old_key) == Some(&index) {
            self.lookup.remove(&old_key);
        }
        self.lookup.entry(entry.key()).or_insert(index);
        self.entries[index as usize] = Some(entry);
        Ok(())
    }

    fn find_or_create(&mut self, entry: Entry) -> std::result::Result<u16, Error> {
        if let Some(index) = self.lookup.get(&entry.key()) {
            Ok(*index)
        } else {
            self.append(entry)
        }
    }

    /// Get or insert a `Utf8` entry
    pub fn find_or_create_utf8(&mut self, value: &str) -> std::result::Result<u16, Error> {
        if let Some(index) = self.lookup.get(&EntryKey::Utf8(value.to_string())) {
            Ok(*index)
        } else {
            self.append(Entry::Utf8(value.to_string()))
        }
    }

    /// Get or insert an `Integer` entry
    pub fn find_or_create_int(&mut self, value: i32) -> std::result::Result<u16, Error> {
        self.find_or_create(Entry::Integer(value))
    }

    /// Get or insert a `Float` entry (matched on bit pattern)
    pub fn find_or_create_float(&mut self, value: f32) -> std::result::Result<u16, Error> {
        self.find_or_create(Entry::Float(value))
    }

    /// Get or insert a `Long` entry
    pub fn find_or_create_long(&mut self, value: i64) -> std::result::Result<u16, Error> {
        self.find_or_create(Entry::Long(value))
    }

    /// Get or insert a `Double` entry (matched on bit pattern)
    pub fn find_or_create_double(&mut self, value: f64) -> std::result::Result<u16, Error> {
        self.find_or_create(Entry::Double(value))
    }

    /// Get or insert a `Class` entry by binary name, creating the backing
    /// `Utf8` as needed
    pub fn find_or_create_class(&mut self, name: &str) -> std::result::Result<u16, Error> {
        let utf8 = self.find_or_create_utf8(name)?;
        self.find_or_create(Entry::Class(utf8))
    }

    /// Get or insert a `String` entry by value, creating the backing `Utf8`
    /// as needed
    pub fn find_or_create_string(&mut self, value: &str) -> std::result::Result<u16, Error> {
        let utf8 = self.find_or_create_utf8(value)?;
        self.find_or_create(Entry::String(utf8))
    }

    /// Get or insert a `NameAndType` entry, creating the backing `Utf8`s as
    /// needed
    pub fn find_or_create_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> std::result::Result<u16, Error> {
        let name = self.find_or_create_utf8(name)?;
        let descriptor = self.find_or_create_utf8(descriptor)?;
        self.find_or_create(Entry::NameAndType { name, descriptor })
    }

    /// Rewrite the string behind a `Utf8` slot, re-keying the reverse index
    pub fn set_utf8(&mut self, index: u16, value: &str) -> std::result::Result<(), Error> {
        match self.get(index)? {
            Entry::Utf8(_) => self.replace(index, Entry::Utf8(value.to_string())),
            other => Err(Error::MalformedFormat(format!(
                "constant {} is not Utf8 (tag {})",
                index,
                other.tag()
            ))),
        }
    }

    /// Read a pool, count field included
    pub fn read<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<ConstantPool, Error> {
        let count = reader.read_u16::<BigEndian>()? as usize;
        if count == 0 {
            return Err(Error::MalformedFormat(
                "constant pool count must be at least 1".to_string(),
            ));
        }
        let mut pool = ConstantPool::new();
        let mut index = 1;
        while index < count {
            let entry = Entry::read(reader)?;
            let width = entry.width() as usize;
            if index + width > count {
                return Err(Error::MalformedFormat(format!(
                    "wide constant at index {} exceeds pool count {}",
                    index, count
                )));
            }
            pool.append(entry)?;
            index += width;
        }
        Ok(pool)
    }
}

impl Default for ConstantPool {
    fn default() -> ConstantPool {
        ConstantPool::new()
    }
}

impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.entries.len() as u16).serialize(writer)?;
        for entry in self.entries.iter().flatten() {
            entry.serialize(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deduplicates_structurally_equal_entries() {
        let mut pool = ConstantPool::new();
        let first = pool.find_or_create_utf8("foo").unwrap();
        let second = pool.find_or_create_utf8("foo").unwrap();
        assert_eq!(first, 1);
        assert_eq!(first, second);
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn class_and_string_share_the_utf8() {
        let mut pool = ConstantPool::new();
        let class = pool.find_or_create_class("java/lang/Object").unwrap();
        let utf8 = pool.find_or_create_utf8("java/lang/Object").unwrap();
        assert_eq!(pool.get(class).unwrap(), &Entry::Class(utf8));
        // Utf8 and Class, nothing else
        assert_eq!(pool.size(), 3);
    }

    #[test]
    fn wide_entries_leave_a_placeholder() {
        let mut pool = ConstantPool::new();
        let long = pool.find_or_create_long(7).unwrap();
        let next = pool.find_or_create_int(7).unwrap();
        assert_eq!(long, 1);
        assert_eq!(next, 3);
        assert!(pool.get(2).is_err());
    }

    #[test]
    fn index_zero_is_reserved() {
        let pool = ConstantPool::new();
        assert!(matches!(
            pool.get(0),
            Err(Error::IndexOutOfRange { index: 0, .. })
        ));
    }

    #[test]
    fn append_permits_duplicates() {
        let mut pool = ConstantPool::new();
        let first = pool.append(Entry::Integer(1)).unwrap();
        let second = pool.append(Entry::Integer(1)).unwrap();
        assert_ne!(first, second);
        // Lookups keep resolving to the earliest copy
        assert_eq!(pool.find_or_create_int(1).unwrap(), first);
    }

    #[test]
    fn replace_rekeys_the_lookup() {
        let mut pool = ConstantPool::new();
        let index = pool.find_or_create_utf8("old").unwrap();
        pool.set_utf8(index, "new").unwrap();
        assert_eq!(pool.utf8(index).unwrap(), "new");
        assert_eq!(pool.find_or_create_utf8("new").unwrap(), index);
        // "old" is gone, so asking for it mints a fresh slot
        assert_ne!(pool.find_or_create_utf8("old").unwrap(), index);
    }

    #[test]
    fn replace_rejects_width_change() {
        let mut pool = ConstantPool::new();
        let index = pool.find_or_create_int(1).unwrap();
        assert!(matches!(
            pool.replace(index, Entry::Long(1)),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn nan_constants_deduplicate() {
        let mut pool = ConstantPool::new();
        let first = pool.find_or_create_float(f32::NAN).unwrap();
        let second = pool.find_or_create_float(f32::NAN).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn round_trip() {
        let mut pool = ConstantPool::new();
        pool.find_or_create_class("Example").unwrap();
        pool.find_or_create_long(1 << 33).unwrap();
        pool.find_or_create_string("hello").unwrap();
        pool.find_or_create_name_and_type("main", "([Ljava/lang/String;)V")
            .unwrap();

        let mut bytes = vec![];
        pool.serialize(&mut bytes).unwrap();
        let reread = ConstantPool::read(&mut std::io::Cursor::new(&bytes)).unwrap();
        assert_eq!(reread.size(), pool.size());

        let mut rewritten = vec![];
        reread.serialize(&mut rewritten).unwrap();
        assert_eq!(bytes, rewritten);
    }

    #[test]
    fn read_rejects_wide_entry_at_the_boundary() {
        // Count claims 2 slots but the single entry is a Long needing 2 past
        // the reserved slot
        let mut bytes = vec![];
        2u16.serialize(&mut bytes).unwrap();
        Entry::Long(0).serialize(&mut bytes).unwrap();
        assert!(matches!(
            ConstantPool::read(&mut std::io::Cursor::new(&bytes)),
            Err(Error::MalformedFormat(_))
        ));
    }

    #[test]
    fn read_rejects_zero_count() {
        let mut bytes = vec![];
        0u16.serialize(&mut bytes).unwrap();
        assert!(matches!(
            ConstantPool::read(&mut std::io::Cursor::new(&bytes)),
            Err(Error::MalformedFormat(_))
        ));
    }
}
