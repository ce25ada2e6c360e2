use crate::binary::{Deserialize, Serialize};
use crate::errors::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// Entries as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Class or an interface, pointing at its `Utf8` binary name
    Class(u16),

    /// Constant object of type `java.lang.String`, pointing at its `Utf8` value
    String(u16),

    /// Field
    FieldRef { class: u16, name_and_type: u16 },

    /// Method declared on a class
    MethodRef { class: u16, name_and_type: u16 },

    /// Method declared on an interface
    InterfaceMethodRef { class: u16, name_and_type: u16 },

    /// Name and a type (eg. for a field or a method)
    NameAndType { name: u16, descriptor: u16 },

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        kind: u8,

        /// Depending on the handle kind, this points to different things:
        ///
        ///   - `FieldRef` for kinds 1 through 4
        ///   - `MethodRef` or `InterfaceMethodRef` for the rest
        reference: u16,
    },

    /// Method type, pointing at its `Utf8` descriptor
    MethodType(u16),

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: u16,
    },

    /// Module, pointing at its `Utf8` name
    Module(u16),

    /// Package, pointing at its `Utf8` name
    Package(u16),
}

/// Hashable identity of an [`Entry`], used for the pool's reverse index
///
/// Floating point entries are keyed by their raw bit patterns, since `f32`
/// and `f64` are not `Eq` (and two NaN constants with the same bits should
/// deduplicate to the same slot).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum EntryKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    InvokeDynamic(u16, u16),
    Module(u16),
    Package(u16),
}

impl Entry {
    /// Tag byte leading the entry in its serialized form
    pub fn tag(&self) -> u8 {
        match self {
            Entry::Utf8(_) => 1,
            Entry::Integer(_) => 3,
            Entry::Float(_) => 4,
            Entry::Long(_) => 5,
            Entry::Double(_) => 6,
            Entry::Class(_) => 7,
            Entry::String(_) => 8,
            Entry::FieldRef { .. } => 9,
            Entry::MethodRef { .. } => 10,
            Entry::InterfaceMethodRef { .. } => 11,
            Entry::NameAndType { .. } => 12,
            Entry::MethodHandle { .. } => 15,
            Entry::MethodType(_) => 16,
            Entry::InvokeDynamic { .. } => 18,
            Entry::Module(_) => 19,
            Entry::Package(_) => 20,
        }
    }

    /// How many pool slots the entry occupies
    ///
    /// Almost all entries have width 1, except for `Entry::Long` and
    /// `Entry::Double`. Quoting the format documentation:
    ///
    /// > All 8-byte constants take up two entries in the constant_pool table
    /// > of the class file. If a CONSTANT_Long_info or CONSTANT_Double_info
    /// > structure is the item in the constant_pool table at index n, then the
    /// > next usable item in the pool is located at index n+2. The
    /// > constant_pool index n+1 must be valid but is considered unusable.
    /// >
    /// > In retrospect, making 8-byte constants take two constant pool entries
    /// > was a poor choice.
    pub fn width(&self) -> u16 {
        match self {
            Entry::Long(_) | Entry::Double(_) => 2,
            _ => 1,
        }
    }

    /// Key under which this entry deduplicates
    pub fn key(&self) -> EntryKey {
        match self {
            Entry::Utf8(string) => EntryKey::Utf8(string.clone()),
            Entry::Integer(int) => EntryKey::Integer(*int),
            Entry::Float(float) => EntryKey::Float(float.to_bits()),
            Entry::Long(long) => EntryKey::Long(*long),
            Entry::Double(double) => EntryKey::Double(double.to_bits()),
            Entry::Class(name) => EntryKey::Class(*name),
            Entry::String(value) => EntryKey::String(*value),
            Entry::FieldRef {
                class,
                name_and_type,
            } => EntryKey::FieldRef(*class, *name_and_type),
            Entry::MethodRef {
                class,
                name_and_type,
            } => EntryKey::MethodRef(*class, *name_and_type),
            Entry::InterfaceMethodRef {
                class,
                name_and_type,
            } => EntryKey::InterfaceMethodRef(*class, *name_and_type),
            Entry::NameAndType { name, descriptor } => EntryKey::NameAndType(*name, *descriptor),
            Entry::MethodHandle { kind, reference } => EntryKey::MethodHandle(*kind, *reference),
            Entry::MethodType(descriptor) => EntryKey::MethodType(*descriptor),
            Entry::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => EntryKey::InvokeDynamic(*bootstrap_method, *name_and_type),
            Entry::Module(name) => EntryKey::Module(*name),
            Entry::Package(name) => EntryKey::Package(*name),
        }
    }

    /// Read a single entry, tag byte included
    pub fn read<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Entry, Error> {
        let tag = u8::deserialize(reader)?;
        let entry = match tag {
            1 => {
                let len = u16::deserialize(reader)? as usize;
                let mut bytes = vec![0u8; len];
                reader.read_exact(&mut bytes)?;
                Entry::Utf8(decode_modified_utf8(&bytes)?)
            }
            3 => Entry::Integer(i32::deserialize(reader)?),
            4 => Entry::Float(f32::deserialize(reader)?),
            5 => Entry::Long(i64::deserialize(reader)?),
            6 => Entry::Double(f64::deserialize(reader)?),
            7 => Entry::Class(u16::deserialize(reader)?),
            8 => Entry::String(u16::deserialize(reader)?),
            9 => Entry::FieldRef {
                class: u16::deserialize(reader)?,
                name_and_type: u16::deserialize(reader)?,
            },
            10 => Entry::MethodRef {
                class: u16::deserialize(reader)?,
                name_and_type: u16::deserialize(reader)?,
            },
            11 => Entry::InterfaceMethodRef {
                class: u16::deserialize(reader)?,
                name_and_type: u16::deserialize(reader)?,
            },
            12 => Entry::NameAndType {
                name: u16::deserialize(reader)?,
                descriptor: u16::deserialize(reader)?,
            },
            15 => Entry::MethodHandle {
                kind: u8::deserialize(reader)?,
                reference: u16::deserialize(reader)?,
            },
            16 => Entry::MethodType(u16::deserialize(reader)?),
            18 => Entry::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: u16::deserialize(reader)?,
            },
            19 => Entry::Module(u16::deserialize(reader)?),
            20 => Entry::Package(u16::deserialize(reader)?),
            other => {
                return Err(Error::MalformedFormat(format!(
                    "unknown constant pool tag {}",
                    other
                )))
            }
        };
        Ok(entry)
    }
}

impl Serialize for Entry {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.tag().serialize(writer)?;
        match self {
            Entry::Utf8(string) => {
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Entry::Integer(integer) => integer.serialize(writer)?,
            Entry::Float(float) => float.serialize(writer)?,
            Entry::Long(long) => long.serialize(writer)?,
            Entry::Double(double) => double.serialize(writer)?,
            Entry::Class(name) => name.serialize(writer)?,
            Entry::String(value) => value.serialize(writer)?,
            Entry::FieldRef {
                class,
                name_and_type,
            }
            | Entry::MethodRef {
                class,
                name_and_type,
            }
            | Entry::InterfaceMethodRef {
                class,
                name_and_type,
            } => {
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Entry::NameAndType { name, descriptor } => {
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Entry::MethodHandle { kind, reference } => {
                kind.serialize(writer)?;
                reference.serialize(writer)?;
            }
            Entry::MethodType(descriptor) => descriptor.serialize(writer)?,
            Entry::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Entry::Module(name) => name.serialize(writer)?,
            Entry::Package(name) => name.serialize(writer)?,
        };
        Ok(())
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        // Handle the exception for how `\u{0000}` is represented
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: main divergence from unicode
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x1F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Surrogate halves encoded as separate 3-byte sequences are recombined into
/// supplementary characters. A lone surrogate half, a truncated sequence, or
/// an invalid leading byte is a format error.
pub fn decode_modified_utf8(bytes: &[u8]) -> std::result::Result<String, Error> {
    fn bad(detail: &str) -> Error {
        Error::MalformedFormat(format!("invalid modified UTF-8 ({})", detail))
    }

    fn continuation(bytes: &[u8], at: usize) -> std::result::Result<u32, Error> {
        match bytes.get(at) {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Ok((b & 0x3F) as u32),
            Some(_) => Err(bad("expected continuation byte")),
            None => Err(bad("truncated sequence")),
        }
    }

    let mut string = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        let code: u32 = if b0 & 0b1000_0000 == 0 {
            if b0 == 0 {
                return Err(bad("embedded null byte"));
            }
            i += 1;
            b0 as u32
        } else if b0 & 0b1110_0000 == 0b1100_0000 {
            let c1 = continuation(bytes, i + 1)?;
            i += 2;
            ((b0 & 0x1F) as u32) << 6 | c1
        } else if b0 & 0b1111_0000 == 0b1110_0000 {
            let c1 = continuation(bytes, i + 1)?;
            let c2 = continuation(bytes, i + 2)?;
            i += 3;
            ((b0 & 0x0F) as u32) << 12 | c1 << 6 | c2
        } else {
            return Err(bad("invalid leading byte"));
        };

        match code {
            // High surrogate: the low half must follow as another 3-byte unit
            0xD800..=0xDBFF => {
                if i + 3 > bytes.len() || bytes[i] & 0b1111_0000 != 0b1110_0000 {
                    return Err(bad("unpaired high surrogate"));
                }
                let c1 = continuation(bytes, i + 1)?;
                let c2 = continuation(bytes, i + 2)?;
                let low = ((bytes[i] & 0x0F) as u32) << 12 | c1 << 6 | c2;
                if !(0xDC00..=0xDFFF).contains(&low) {
                    return Err(bad("unpaired high surrogate"));
                }
                i += 3;
                let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                match char::from_u32(combined) {
                    Some(c) => string.push(c),
                    None => return Err(bad("surrogate pair out of range")),
                }
            }
            0xDC00..=0xDFFF => return Err(bad("unpaired low surrogate")),
            _ => match char::from_u32(code) {
                Some(c) => string.push(c),
                None => return Err(bad("code point out of range")),
            },
        }
    }
    Ok(string)
}

#[cfg(test)]
mod modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\x00a");
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(
            encode_modified_utf8("hel10_World"),
            vec![104, 101, 108, 49, 48, 95, 87, 111, 114, 108, 100]
        );
        assert_eq!(decode_modified_utf8(&[102, 111, 111]).unwrap(), "foo");
    }

    #[test]
    fn two_and_three_byte_encodings() {
        let two_byte = "ĄǍǞǠǺȀȂȦȺӐӒ";
        let three_byte = "ऄअॲঅਅઅଅஅఅಅഅะະ༁ཨ";
        assert_eq!(
            encode_modified_utf8(two_byte),
            vec![
                196, 132, 199, 141, 199, 158, 199, 160, 199, 186, 200, 128, 200, 130, 200, 166,
                200, 186, 211, 144, 211, 146
            ]
        );
        assert_eq!(
            decode_modified_utf8(&encode_modified_utf8(two_byte)).unwrap(),
            two_byte
        );
        assert_eq!(
            decode_modified_utf8(&encode_modified_utf8(three_byte)).unwrap(),
            three_byte
        );
    }

    #[test]
    fn supplementary_characters() {
        let supplementary = "\u{10000}\u{dffff}\u{10FFFF}";
        assert_eq!(
            encode_modified_utf8(supplementary),
            vec![
                237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237,
                191, 191
            ]
        );
        assert_eq!(
            decode_modified_utf8(&encode_modified_utf8(supplementary)).unwrap(),
            supplementary
        );
    }

    #[test]
    fn rejects_lone_surrogate() {
        // High half of U+10000 with nothing following
        assert!(decode_modified_utf8(&[237, 160, 128]).is_err());
        // Low half on its own
        assert!(decode_modified_utf8(&[237, 176, 128]).is_err());
    }

    #[test]
    fn rejects_truncated_sequence() {
        assert!(decode_modified_utf8(&[196]).is_err());
        assert!(decode_modified_utf8(&[224, 164]).is_err());
    }
}

#[cfg(test)]
mod entry_tests {
    use super::*;

    fn round_trip(entry: Entry) {
        let mut bytes = vec![];
        entry.serialize(&mut bytes).unwrap();
        let mut cursor = std::io::Cursor::new(bytes);
        assert_eq!(Entry::read(&mut cursor).unwrap(), entry);
    }

    #[test]
    fn tag_dispatch() {
        round_trip(Entry::Utf8("Hello, World".to_string()));
        round_trip(Entry::Integer(-42));
        round_trip(Entry::Long(1 << 40));
        round_trip(Entry::Class(3));
        round_trip(Entry::FieldRef {
            class: 2,
            name_and_type: 5,
        });
        round_trip(Entry::MethodHandle {
            kind: 6,
            reference: 9,
        });
        round_trip(Entry::InvokeDynamic {
            bootstrap_method: 0,
            name_and_type: 4,
        });
    }

    #[test]
    fn unknown_tag_rejected() {
        let mut cursor = std::io::Cursor::new(vec![13u8, 0, 0]);
        assert!(matches!(
            Entry::read(&mut cursor),
            Err(Error::MalformedFormat(_))
        ));
    }

    #[test]
    fn wide_entries_span_two_slots() {
        assert_eq!(Entry::Long(0).width(), 2);
        assert_eq!(Entry::Double(0.0).width(), 2);
        assert_eq!(Entry::Integer(0).width(), 1);
        assert_eq!(Entry::Utf8(String::new()).width(), 1);
    }

    #[test]
    fn float_keys_use_bits() {
        assert_eq!(Entry::Float(f32::NAN).key(), Entry::Float(f32::NAN).key());
        assert_ne!(Entry::Float(0.0).key(), Entry::Float(-0.0).key());
    }
}
