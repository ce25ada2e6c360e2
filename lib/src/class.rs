//! Top-level class file structure: fields, methods, and attributes around a
//! shared constant pool

use crate::access_flags::{ClassAccessFlags, FieldAccessFlags, InnerClassAccessFlags, MethodAccessFlags};
use crate::binary::{Deserialize, Serialize};
use crate::code::Code;
use crate::errors::Error;
use crate::pool::{ConstantPool, Entry};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::cell::RefCell;
use std::io::Cursor;
use std::rc::Rc;

const MAGIC: u32 = 0xCAFEBABE;

/// Default version emitted for freshly built classes (Java 8)
const DEFAULT_MAJOR_VERSION: u16 = 52;

/// An attribute this library does not interpret: just a name and its raw
/// payload, carried through unchanged
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl Attribute {
    fn read<R: ReadBytesExt>(reader: &mut R) -> Result<Attribute, Error> {
        let name_index = u16::deserialize(reader)?;
        let length = u32::deserialize(reader)?;
        let mut info = vec![0u8; length as usize];
        reader.read_exact(&mut info)?;
        Ok(Attribute { name_index, info })
    }

    fn write<W: WriteBytesExt>(&self, writer: &mut W) -> Result<(), Error> {
        writer.write_u16::<BigEndian>(self.name_index)?;
        writer.write_u32::<BigEndian>(self.info.len() as u32)?;
        writer.write_all(&self.info)?;
        Ok(())
    }
}

/// Put a re-rendered attribute back at the record position it held in the
/// parsed image; freshly added attributes go at the end
pub(crate) fn place_attribute(
    attributes: &mut Vec<Attribute>,
    position: Option<usize>,
    attribute: Attribute,
) {
    match position {
        Some(index) if index <= attributes.len() => attributes.insert(index, attribute),
        _ => attributes.push(attribute),
    }
}

/// One record of the `InnerClasses` attribute
#[derive(Debug, Clone)]
pub struct InnerClass {
    /// `Class` constant of the nested class
    pub inner_class: u16,
    /// `Class` constant of the enclosing class, or 0
    pub outer_class: u16,
    /// `Utf8` constant of the simple name, or 0 for anonymous classes
    pub inner_name: u16,
    pub access_flags: InnerClassAccessFlags,
}

impl Serialize for InnerClass {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.inner_class.serialize(writer)?;
        self.outer_class.serialize(writer)?;
        self.inner_name.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for InnerClass {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<InnerClass, Error> {
        Ok(InnerClass {
            inner_class: u16::deserialize(reader)?,
            outer_class: u16::deserialize(reader)?,
            inner_name: u16::deserialize(reader)?,
            access_flags: InnerClassAccessFlags::deserialize(reader)?,
        })
    }
}

/// Field member of a class
#[derive(Debug)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    /// Pool index of the initial value, for `static final` fields
    pub constant_value: Option<u16>,
    /// Unrecognized attributes, carried through verbatim
    pub attributes: Vec<Attribute>,
    /// Record position `ConstantValue` held among the parsed attributes
    constant_value_position: Option<usize>,
}

/// Method member of a class
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    /// Absent for `abstract` and `native` methods
    pub code: Option<Code>,
    /// Unrecognized attributes, carried through verbatim
    pub attributes: Vec<Attribute>,
    /// Record position `Code` held among the parsed attributes
    code_position: Option<usize>,
}

/// A parsed (or under-construction) class file
///
/// The constant pool is behind `Rc<RefCell<...>>` because every method body
/// shares it: morphing an `ldc` or naming an attribute may intern constants
/// at any time. Single-threaded by construction.
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pool: Rc<RefCell<ConstantPool>>,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    /// 0 only for `java/lang/Object`
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub inner_classes: Option<Vec<InnerClass>>,
    /// `Utf8` constant of the source file name
    pub source_file: Option<u16>,
    /// Unrecognized attributes, carried through verbatim
    pub attributes: Vec<Attribute>,
    source_file_position: Option<usize>,
    inner_classes_position: Option<usize>,
}

impl ClassFile {
    /// Start a class from scratch
    pub fn new(this_name: &str, super_name: &str) -> Result<ClassFile, Error> {
        let mut pool = ConstantPool::new();
        let this_class = pool.find_or_create_class(this_name)?;
        let super_class = pool.find_or_create_class(super_name)?;
        Ok(ClassFile {
            minor_version: 0,
            major_version: DEFAULT_MAJOR_VERSION,
            pool: Rc::new(RefCell::new(pool)),
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            inner_classes: None,
            source_file: None,
            attributes: vec![],
            source_file_position: None,
            inner_classes_position: None,
        })
    }

    pub fn pool(&self) -> Rc<RefCell<ConstantPool>> {
        self.pool.clone()
    }

    /// Binary name of this class
    pub fn class_name(&self) -> Result<String, Error> {
        let pool = self.pool.borrow();
        match pool.get(self.this_class)? {
            Entry::Class(name) => Ok(pool.utf8(*name)?.to_string()),
            other => Err(Error::MalformedFormat(format!(
                "this_class is not a Class constant (tag {})",
                other.tag()
            ))),
        }
    }

    /// Fresh empty code block sharing this class's pool
    pub fn new_code(&self) -> Code {
        Code::new(self.pool.clone())
    }

    /// Add a field, interning its name and descriptor
    pub fn add_field(
        &mut self,
        name: &str,
        descriptor: &str,
        access_flags: FieldAccessFlags,
    ) -> Result<&mut Field, Error> {
        let mut pool = self.pool.borrow_mut();
        let name_index = pool.find_or_create_utf8(name)?;
        let descriptor_index = pool.find_or_create_utf8(descriptor)?;
        drop(pool);
        self.fields.push(Field {
            access_flags,
            name_index,
            descriptor_index,
            constant_value: None,
            attributes: vec![],
            constant_value_position: None,
        });
        Ok(self.fields.last_mut().unwrap())
    }

    /// Add a method, interning its name and descriptor
    pub fn add_method(
        &mut self,
        name: &str,
        descriptor: &str,
        access_flags: MethodAccessFlags,
    ) -> Result<&mut Method, Error> {
        let mut pool = self.pool.borrow_mut();
        let name_index = pool.find_or_create_utf8(name)?;
        let descriptor_index = pool.find_or_create_utf8(descriptor)?;
        drop(pool);
        self.methods.push(Method {
            access_flags,
            name_index,
            descriptor_index,
            code: None,
            attributes: vec![],
            code_position: None,
        });
        Ok(self.methods.last_mut().unwrap())
    }

    /// Record the source file name
    pub fn set_source_file(&mut self, name: &str) -> Result<(), Error> {
        self.source_file = Some(self.pool.borrow_mut().find_or_create_utf8(name)?);
        Ok(())
    }

    /// Parse a complete class image
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = Cursor::new(bytes);
        let magic = reader.read_u32::<BigEndian>()?;
        if magic != MAGIC {
            return Err(Error::MalformedFormat(format!(
                "bad magic number {:#010x}",
                magic
            )));
        }
        let minor_version = reader.read_u16::<BigEndian>()?;
        let major_version = reader.read_u16::<BigEndian>()?;
        let pool = Rc::new(RefCell::new(ConstantPool::read(&mut reader)?));
        log::trace!(
            "Parsed constant pool: {} slots",
            pool.borrow().size()
        );

        let access_flags = ClassAccessFlags::deserialize(&mut reader)?;
        let this_class = reader.read_u16::<BigEndian>()?;
        let super_class = reader.read_u16::<BigEndian>()?;
        let interfaces = Vec::<u16>::deserialize(&mut reader)?;

        let mut class = ClassFile {
            minor_version,
            major_version,
            pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields: vec![],
            methods: vec![],
            inner_classes: None,
            source_file: None,
            attributes: vec![],
            source_file_position: None,
            inner_classes_position: None,
        };

        let field_count = reader.read_u16::<BigEndian>()?;
        for _ in 0..field_count {
            let field = class.read_field(&mut reader)?;
            class.fields.push(field);
        }
        let method_count = reader.read_u16::<BigEndian>()?;
        for _ in 0..method_count {
            let method = class.read_method(&mut reader)?;
            class.methods.push(method);
        }

        let attribute_count = reader.read_u16::<BigEndian>()?;
        for index in 0..attribute_count as usize {
            let attribute = Attribute::read(&mut reader)?;
            let name = class.pool.borrow().utf8(attribute.name_index)?.to_string();
            let mut body = Cursor::new(&attribute.info[..]);
            match name.as_str() {
                "SourceFile" => {
                    class.source_file = Some(body.read_u16::<BigEndian>()?);
                    class.source_file_position = Some(index);
                }
                "InnerClasses" => {
                    class.inner_classes = Some(Vec::<InnerClass>::deserialize(&mut body)?);
                    class.inner_classes_position = Some(index);
                }
                _ => class.attributes.push(attribute),
            }
        }

        log::trace!(
            "Parsed class: {} fields, {} methods",
            class.fields.len(),
            class.methods.len()
        );
        Ok(class)
    }

    fn read_field<R: ReadBytesExt>(&self, reader: &mut R) -> Result<Field, Error> {
        let access_flags = FieldAccessFlags::deserialize(reader)?;
        let name_index = reader.read_u16::<BigEndian>()?;
        let descriptor_index = reader.read_u16::<BigEndian>()?;
        let mut field = Field {
            access_flags,
            name_index,
            descriptor_index,
            constant_value: None,
            attributes: vec![],
            constant_value_position: None,
        };
        let attribute_count = reader.read_u16::<BigEndian>()?;
        for index in 0..attribute_count as usize {
            let attribute = Attribute::read(reader)?;
            let name = self.pool.borrow().utf8(attribute.name_index)?.to_string();
            if name == "ConstantValue" {
                let mut body = Cursor::new(&attribute.info[..]);
                field.constant_value = Some(body.read_u16::<BigEndian>()?);
                field.constant_value_position = Some(index);
            } else {
                field.attributes.push(attribute);
            }
        }
        Ok(field)
    }

    fn read_method<R: ReadBytesExt>(&self, reader: &mut R) -> Result<Method, Error> {
        let access_flags = MethodAccessFlags::deserialize(reader)?;
        let name_index = reader.read_u16::<BigEndian>()?;
        let descriptor_index = reader.read_u16::<BigEndian>()?;
        let mut method = Method {
            access_flags,
            name_index,
            descriptor_index,
            code: None,
            attributes: vec![],
            code_position: None,
        };
        let attribute_count = reader.read_u16::<BigEndian>()?;
        for index in 0..attribute_count as usize {
            let attribute = Attribute::read(reader)?;
            let name = self.pool.borrow().utf8(attribute.name_index)?.to_string();
            if name == "Code" {
                let mut body = Cursor::new(&attribute.info[..]);
                method.code = Some(Code::read_from(&mut body, self.pool.clone())?);
                method.code_position = Some(index);
            } else {
                method.attributes.push(attribute);
            }
        }
        Ok(method)
    }

    /// Serialize the whole class
    ///
    /// Members are rendered to buffers first: writing a method body or a
    /// recognized attribute may intern names into the pool, and the pool's
    /// bytes come before theirs in the image.
    pub fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<(), Error> {
        let mut field_bytes = vec![];
        for field in &self.fields {
            self.write_field(&mut field_bytes, field)?;
        }
        let mut method_bytes = vec![];
        for method in &self.methods {
            self.write_method(&mut method_bytes, method)?;
        }

        let mut attributes: Vec<Attribute> = self.attributes.clone();
        let mut recognized: Vec<(Option<usize>, Attribute)> = vec![];
        if let Some(source_file) = self.source_file {
            let name_index = self.pool.borrow_mut().find_or_create_utf8("SourceFile")?;
            let mut info = vec![];
            source_file.serialize(&mut info).map_err(Error::from)?;
            recognized.push((self.source_file_position, Attribute { name_index, info }));
        }
        if let Some(inner_classes) = &self.inner_classes {
            let name_index = self.pool.borrow_mut().find_or_create_utf8("InnerClasses")?;
            let mut info = vec![];
            inner_classes.serialize(&mut info).map_err(Error::from)?;
            recognized.push((self.inner_classes_position, Attribute { name_index, info }));
        }
        // Lower record positions insert first so the indices still hold
        recognized.sort_by_key(|(position, _)| position.unwrap_or(usize::MAX));
        for (position, attribute) in recognized {
            place_attribute(&mut attributes, position, attribute);
        }

        writer.write_u32::<BigEndian>(MAGIC)?;
        writer.write_u16::<BigEndian>(self.minor_version)?;
        writer.write_u16::<BigEndian>(self.major_version)?;
        self.pool.borrow().serialize(writer).map_err(Error::from)?;
        self.access_flags.serialize(writer).map_err(Error::from)?;
        writer.write_u16::<BigEndian>(self.this_class)?;
        writer.write_u16::<BigEndian>(self.super_class)?;
        self.interfaces.serialize(writer).map_err(Error::from)?;

        writer.write_u16::<BigEndian>(self.fields.len() as u16)?;
        writer.write_all(&field_bytes)?;
        writer.write_u16::<BigEndian>(self.methods.len() as u16)?;
        writer.write_all(&method_bytes)?;

        writer.write_u16::<BigEndian>(attributes.len() as u16)?;
        for attribute in &attributes {
            attribute.write(writer)?;
        }
        Ok(())
    }

    /// Serialize to a fresh byte vector
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    fn write_field<W: WriteBytesExt>(&self, writer: &mut W, field: &Field) -> Result<(), Error> {
        field.access_flags.serialize(writer).map_err(Error::from)?;
        writer.write_u16::<BigEndian>(field.name_index)?;
        writer.write_u16::<BigEndian>(field.descriptor_index)?;

        let mut attributes: Vec<Attribute> = field.attributes.clone();
        if let Some(constant_value) = field.constant_value {
            let name_index = self.pool.borrow_mut().find_or_create_utf8("ConstantValue")?;
            let mut info = vec![];
            constant_value.serialize(&mut info).map_err(Error::from)?;
            place_attribute(
                &mut attributes,
                field.constant_value_position,
                Attribute { name_index, info },
            );
        }

        writer.write_u16::<BigEndian>(attributes.len() as u16)?;
        for attribute in &attributes {
            attribute.write(writer)?;
        }
        Ok(())
    }

    fn write_method<W: WriteBytesExt>(&self, writer: &mut W, method: &Method) -> Result<(), Error> {
        method.access_flags.serialize(writer).map_err(Error::from)?;
        writer.write_u16::<BigEndian>(method.name_index)?;
        writer.write_u16::<BigEndian>(method.descriptor_index)?;

        let mut attributes: Vec<Attribute> = method.attributes.clone();
        if let Some(code) = &method.code {
            let mut info = vec![];
            code.write(&mut info)?;
            let name_index = self.pool.borrow_mut().find_or_create_utf8("Code")?;
            place_attribute(
                &mut attributes,
                method.code_position,
                Attribute { name_index, info },
            );
        }

        writer.write_u16::<BigEndian>(attributes.len() as u16)?;
        for attribute in &attributes {
            attribute.write(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::code::{opcodes, Insn};

    fn tiny_class() -> ClassFile {
        let mut class = ClassFile::new("Example", "java/lang/Object").unwrap();
        let mut code = class.new_code();
        code.max_stack = 1;
        code.max_locals = 1;
        code.push(Insn::simple(opcodes::RETURN));
        let method = class
            .add_method("<init>", "()V", MethodAccessFlags::PUBLIC)
            .unwrap();
        method.code = Some(code);
        class
    }

    #[test]
    fn round_trip_is_byte_exact() {
        let class = tiny_class();
        let bytes = class.to_bytes().unwrap();
        let reread = ClassFile::parse(&bytes).unwrap();
        assert_eq!(reread.class_name().unwrap(), "Example");
        assert_eq!(reread.methods.len(), 1);
        assert_eq!(reread.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = tiny_class().to_bytes().unwrap();
        bytes[0] = 0;
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(Error::MalformedFormat(_))
        ));
    }

    #[test]
    fn truncated_image_rejected() {
        let bytes = tiny_class().to_bytes().unwrap();
        assert!(matches!(
            ClassFile::parse(&bytes[..bytes.len() - 3]),
            Err(Error::UnexpectedEndOfInput)
        ));
    }

    #[test]
    fn source_file_and_constant_value_survive() {
        let mut class = tiny_class();
        class.set_source_file("Example.java").unwrap();
        let pool = class.pool();
        let value = pool.borrow_mut().find_or_create_int(42).unwrap();
        let field = class
            .add_field("ANSWER", "I", FieldAccessFlags::STATIC | FieldAccessFlags::FINAL)
            .unwrap();
        field.constant_value = Some(value);

        let bytes = class.to_bytes().unwrap();
        let reread = ClassFile::parse(&bytes).unwrap();
        assert_eq!(reread.fields[0].constant_value, Some(value));
        let source = reread.source_file.unwrap();
        assert_eq!(reread.pool().borrow().utf8(source).unwrap(), "Example.java");
    }

    #[test]
    fn inner_classes_survive() {
        let mut class = tiny_class();
        let pool = class.pool();
        let inner = pool.borrow_mut().find_or_create_class("Example$Inner").unwrap();
        let outer = pool.borrow_mut().find_or_create_class("Example").unwrap();
        let name = pool.borrow_mut().find_or_create_utf8("Inner").unwrap();
        class.inner_classes = Some(vec![InnerClass {
            inner_class: inner,
            outer_class: outer,
            inner_name: name,
            access_flags: InnerClassAccessFlags::PUBLIC | InnerClassAccessFlags::STATIC,
        }]);

        let bytes = class.to_bytes().unwrap();
        let reread = ClassFile::parse(&bytes).unwrap();
        let inner_classes = reread.inner_classes.unwrap();
        assert_eq!(inner_classes.len(), 1);
        assert_eq!(inner_classes[0].inner_class, inner);
        assert!(inner_classes[0].access_flags.contains(InnerClassAccessFlags::STATIC));
    }

    #[test]
    fn attribute_record_order_survives_round_trips() {
        let class = tiny_class();
        let pool = class.pool();
        let deprecated = pool.borrow_mut().find_or_create_utf8("Deprecated").unwrap();
        let source_file = pool.borrow_mut().find_or_create_utf8("SourceFile").unwrap();
        let file = pool.borrow_mut().find_or_create_utf8("Example.java").unwrap();

        // Splice the class attributes in by hand, the raw record first
        let mut bytes = class.to_bytes().unwrap();
        let count_at = bytes.len() - 2;
        bytes[count_at..].copy_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&deprecated.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&source_file.to_be_bytes());
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&file.to_be_bytes());

        let reread = ClassFile::parse(&bytes).unwrap();
        assert_eq!(reread.source_file, Some(file));
        assert_eq!(reread.attributes.len(), 1);
        assert_eq!(reread.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn unknown_attributes_carried_through() {
        let mut class = tiny_class();
        let name_index = class.pool().borrow_mut().find_or_create_utf8("Deprecated").unwrap();
        class.attributes.push(Attribute {
            name_index,
            info: vec![],
        });
        let bytes = class.to_bytes().unwrap();
        let reread = ClassFile::parse(&bytes).unwrap();
        assert_eq!(reread.attributes.len(), 1);
        assert_eq!(reread.to_bytes().unwrap(), bytes);
    }
}
