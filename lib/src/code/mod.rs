//! Mutable method bodies: instruction streams, branch pointers, and the
//! tables keyed to byte positions within them

pub mod opcodes;

mod attrs;
mod insn;
mod ptr;
mod switches;

pub use attrs::{
    ExceptionHandler, LineNumber, LineNumberTable, LocalVariable, LocalVariableTable,
};
pub use insn::{ConstOperand, Insn, LocalForm, ValueKind};
pub use ptr::{InsnId, InsnPtr};
pub use switches::{pad_after, LookupSwitch, TableSwitch};

use crate::class::{place_attribute, Attribute};
use crate::errors::Error;
use crate::pool::ConstantPool;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;
use std::rc::Rc;

struct Slot {
    insn: Option<Insn>,
    prev: Option<InsnId>,
    next: Option<InsnId>,
}

/// Cached byte layout of a code block
///
/// Offsets go stale whenever the instruction stream changes and are
/// recomputed in one pass the next time anyone asks for a byte position.
#[derive(Default)]
struct OffsetCache {
    dirty: bool,
    /// Byte offset per slot (stale slots hold garbage, never read)
    offsets: Vec<u32>,
    total: u32,
}

/// Maps byte offsets of the current layout back to instruction handles
///
/// Built once per resolution pass so pointer updates do not re-walk the
/// stream per pointer.
pub struct TargetResolver {
    by_offset: HashMap<u32, InsnId>,
    /// In stream order
    ordered: Vec<(u32, InsnId)>,
    total: u32,
}

impl TargetResolver {
    /// Instruction starting exactly at a byte offset
    pub fn at(&self, offset: u32) -> Result<InsnId, Error> {
        match self.by_offset.get(&offset) {
            Some(id) => Ok(*id),
            None => Err(Error::DanglingTarget {
                offset: Some(offset),
            }),
        }
    }

    /// Instruction whose encoding ends exactly at an (exclusive) byte offset
    ///
    /// Used for range ends: `pc` equal to the total code length names the
    /// last instruction, and any other `pc` must be the start of some
    /// instruction, whose predecessor is the answer.
    pub fn ending_at(&self, pc: u32) -> Result<InsnId, Error> {
        if pc == self.total {
            return match self.ordered.last() {
                Some((_, id)) => Ok(*id),
                None => Err(Error::DanglingTarget { offset: Some(pc) }),
            };
        }
        match self
            .ordered
            .binary_search_by_key(&pc, |(offset, _)| *offset)
        {
            Ok(position) if position > 0 => Ok(self.ordered[position - 1].1),
            _ => Err(Error::DanglingTarget { offset: Some(pc) }),
        }
    }
}

/// A method body under edit
///
/// Instructions live in an arena of slots forming a doubly linked list, and
/// are addressed by [`InsnId`] handles that survive any amount of inserting
/// and removing around them. Byte offsets are never maintained eagerly;
/// asking for one triggers a single relayout pass over the whole stream
/// (instruction sizes depend on their positions, switch padding most of
/// all, so there is no cheaper unit of recomputation).
///
/// The constant pool is shared with the owning class through
/// `Rc<RefCell<...>>`: editing is a single-threaded affair, and any `ldc`
/// morph may need to intern new constants.
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pool: Rc<RefCell<ConstantPool>>,
    slots: Vec<Slot>,
    head: Option<InsnId>,
    tail: Option<InsnId>,
    len: usize,
    cursor: Option<InsnId>,
    offsets: RefCell<OffsetCache>,
    pub handlers: Vec<ExceptionHandler>,
    pub line_numbers: Option<LineNumberTable>,
    pub local_variables: Option<LocalVariableTable>,
    /// Unrecognized sub-attributes, carried through verbatim
    pub attributes: Vec<Attribute>,
    /// Record positions the recognized tables held among the parsed
    /// sub-attributes
    line_numbers_position: Option<usize>,
    local_variables_position: Option<usize>,
}

impl Code {
    pub fn new(pool: Rc<RefCell<ConstantPool>>) -> Code {
        Code {
            max_stack: 0,
            max_locals: 0,
            pool,
            slots: vec![],
            head: None,
            tail: None,
            len: 0,
            cursor: None,
            offsets: RefCell::new(OffsetCache {
                dirty: true,
                ..OffsetCache::default()
            }),
            handlers: vec![],
            line_numbers: None,
            local_variables: None,
            attributes: vec![],
            line_numbers_position: None,
            local_variables_position: None,
        }
    }

    pub fn pool(&self) -> Rc<RefCell<ConstantPool>> {
        self.pool.clone()
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether a handle still names an instruction in this block
    pub fn contains(&self, id: InsnId) -> bool {
        self.slots.get(id.0).map_or(false, |slot| slot.insn.is_some())
    }

    pub fn insn(&self, id: InsnId) -> Result<&Insn, Error> {
        match self.slots.get(id.0).and_then(|slot| slot.insn.as_ref()) {
            Some(insn) => Ok(insn),
            None => Err(Error::DanglingTarget { offset: None }),
        }
    }

    /// Mutable access to an instruction; any byte layout is assumed stale
    /// afterwards
    pub fn insn_mut(&mut self, id: InsnId) -> Result<&mut Insn, Error> {
        self.offsets.borrow_mut().dirty = true;
        match self.slots.get_mut(id.0).and_then(|slot| slot.insn.as_mut()) {
            Some(insn) => Ok(insn),
            None => Err(Error::DanglingTarget { offset: None }),
        }
    }

    /// Append an instruction at the end
    pub fn push(&mut self, insn: Insn) -> InsnId {
        let id = self.new_slot(insn, self.tail, None);
        match self.tail {
            Some(tail) => self.slots[tail.0].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        id
    }

    /// Insert an instruction just before another
    pub fn insert_before(&mut self, before: InsnId, insn: Insn) -> Result<InsnId, Error> {
        if !self.contains(before) {
            return Err(Error::DanglingTarget { offset: None });
        }
        let prev = self.slots[before.0].prev;
        let id = self.new_slot(insn, prev, Some(before));
        match prev {
            Some(prev) => self.slots[prev.0].next = Some(id),
            None => self.head = Some(id),
        }
        self.slots[before.0].prev = Some(id);
        Ok(id)
    }

    /// Insert an instruction just after another
    pub fn insert_after(&mut self, after: InsnId, insn: Insn) -> Result<InsnId, Error> {
        if !self.contains(after) {
            return Err(Error::DanglingTarget { offset: None });
        }
        let next = self.slots[after.0].next;
        let id = self.new_slot(insn, Some(after), next);
        match next {
            Some(next) => self.slots[next.0].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.slots[after.0].next = Some(id);
        Ok(id)
    }

    /// Unlink an instruction and hand it back
    ///
    /// Pointers at the removed instruction are not redirected; they dangle
    /// until [`Code::replace_target`] or a fresh assignment says otherwise.
    /// The handle is retired for good, never given to a later insertion.
    pub fn remove(&mut self, id: InsnId) -> Result<Insn, Error> {
        if !self.contains(id) {
            return Err(Error::DanglingTarget { offset: None });
        }
        let prev = self.slots[id.0].prev;
        let next = self.slots[id.0].next;
        match prev {
            Some(prev) => self.slots[prev.0].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slots[next.0].prev = prev,
            None => self.tail = prev,
        }
        if self.cursor == Some(id) {
            self.cursor = next;
        }
        self.len -= 1;
        self.offsets.borrow_mut().dirty = true;
        let insn = self.slots[id.0].insn.take();
        insn.ok_or(Error::DanglingTarget { offset: None })
    }

    fn new_slot(&mut self, insn: Insn, prev: Option<InsnId>, next: Option<InsnId>) -> InsnId {
        let id = InsnId(self.slots.len());
        self.slots.push(Slot {
            insn: Some(insn),
            prev,
            next,
        });
        self.len += 1;
        self.offsets.borrow_mut().dirty = true;
        id
    }

    pub fn first(&self) -> Option<InsnId> {
        self.head
    }

    pub fn last(&self) -> Option<InsnId> {
        self.tail
    }

    pub fn next(&self, id: InsnId) -> Option<InsnId> {
        self.slots.get(id.0).and_then(|slot| slot.next)
    }

    pub fn prev(&self, id: InsnId) -> Option<InsnId> {
        self.slots.get(id.0).and_then(|slot| slot.prev)
    }

    /// Iterate over instruction handles in stream order
    pub fn iter(&self) -> impl Iterator<Item = InsnId> + '_ {
        let mut at = self.head;
        std::iter::from_fn(move || {
            let id = at?;
            at = self.slots[id.0].next;
            Some(id)
        })
    }

    /// Reset the traversal cursor to the first instruction
    pub fn rewind(&mut self) {
        self.cursor = self.head;
    }

    pub fn has_next(&self) -> bool {
        self.cursor.is_some()
    }

    /// Advance the cursor, returning the instruction it was on
    pub fn advance(&mut self) -> Option<InsnId> {
        let id = self.cursor?;
        self.cursor = self.slots[id.0].next;
        Some(id)
    }

    fn ensure_offsets(&self) {
        let mut cache = self.offsets.borrow_mut();
        if !cache.dirty {
            return;
        }
        cache.offsets.resize(self.slots.len(), 0);
        let mut at: u32 = 0;
        let mut walk = self.head;
        while let Some(id) = walk {
            let slot = &self.slots[id.0];
            cache.offsets[id.0] = at;
            if let Some(insn) = &slot.insn {
                at += insn.encoded_len(at);
            }
            walk = slot.next;
        }
        cache.total = at;
        cache.dirty = false;
    }

    /// Byte offset of an instruction in the current layout
    pub fn byte_index(&self, id: InsnId) -> Result<u32, Error> {
        if !self.contains(id) {
            return Err(Error::DanglingTarget { offset: None });
        }
        self.ensure_offsets();
        Ok(self.offsets.borrow().offsets[id.0])
    }

    /// Byte offset just past an instruction in the current layout
    pub fn byte_end(&self, id: InsnId) -> Result<u32, Error> {
        let at = self.byte_index(id)?;
        Ok(at + self.insn(id)?.encoded_len(at))
    }

    /// Total encoded size of the instruction stream
    pub fn byte_length(&self) -> u32 {
        self.ensure_offsets();
        self.offsets.borrow().total
    }

    /// Instruction starting at a byte offset of the current layout
    pub fn instruction_at(&self, offset: u32) -> Result<InsnId, Error> {
        self.ensure_offsets();
        let cache = self.offsets.borrow();
        for id in self.iter() {
            if cache.offsets[id.0] == offset {
                return Ok(id);
            }
        }
        Err(Error::DanglingTarget {
            offset: Some(offset),
        })
    }

    fn resolver(&self) -> TargetResolver {
        self.ensure_offsets();
        let cache = self.offsets.borrow();
        let mut by_offset = HashMap::with_capacity(self.len);
        let mut ordered = Vec::with_capacity(self.len);
        for id in self.iter() {
            let offset = cache.offsets[id.0];
            by_offset.insert(offset, id);
            ordered.push((offset, id));
        }
        TargetResolver {
            by_offset,
            ordered,
            total: cache.total,
        }
    }

    /// Resolve every offset-mode pointer in the block (branch targets,
    /// exception ranges, debug tables) to instruction mode
    ///
    /// Offsets are interpreted against the current layout, so this is meant
    /// to run before any edits move instructions around.
    pub fn update_targets(&mut self) -> Result<(), Error> {
        let resolver = self.resolver();
        let ids: Vec<InsnId> = self.iter().collect();
        for id in ids {
            let mut result = Ok(());
            if let Some(insn) = self.slots[id.0].insn.as_mut() {
                insn.for_each_ptr_mut(|ptr| {
                    if let Err(err) = ptr.resolve(&resolver) {
                        if result.is_ok() {
                            result = Err(err);
                        }
                    }
                });
            }
            result?;
        }
        for handler in &mut self.handlers {
            handler.resolve(&resolver)?;
        }
        if let Some(table) = &mut self.line_numbers {
            table.resolve(&resolver)?;
        }
        if let Some(table) = &mut self.local_variables {
            table.resolve(&resolver)?;
        }
        Ok(())
    }

    /// Redirect every pointer at one instruction to another
    ///
    /// The usual companion of [`Code::remove`] when the removed instruction
    /// was a branch target.
    pub fn replace_target(&mut self, from: InsnId, to: InsnId) {
        for index in 0..self.slots.len() {
            if let Some(insn) = self.slots[index].insn.as_mut() {
                insn.for_each_ptr_mut(|ptr| ptr.replace(from, to));
            }
        }
        for handler in &mut self.handlers {
            handler.try_start.replace(from, to);
            handler.try_end.replace(from, to);
            handler.handler.replace(from, to);
        }
        if let Some(table) = &mut self.line_numbers {
            for entry in &mut table.entries {
                entry.target.replace(from, to);
            }
        }
        if let Some(table) = &mut self.local_variables {
            for entry in &mut table.entries {
                entry.start.replace(from, to);
                entry.end.replace(from, to);
            }
        }
    }

    /// Morph an instruction into the most compact push of an `int`
    pub fn set_const_int(&mut self, id: InsnId, value: i32) -> Result<(), Error> {
        let insn = match value {
            -1..=5 => Insn::Constant {
                opcode: (opcodes::ICONST_0 as i32 + value) as u8,
                operand: ConstOperand::None,
            },
            -128..=127 => Insn::Constant {
                opcode: opcodes::BIPUSH,
                operand: ConstOperand::Byte(value as i8),
            },
            -32768..=32767 => Insn::Constant {
                opcode: opcodes::SIPUSH,
                operand: ConstOperand::Short(value as i16),
            },
            _ => {
                let index = self.pool.borrow_mut().find_or_create_int(value)?;
                ldc_of(index)
            }
        };
        *self.insn_mut(id)? = insn;
        Ok(())
    }

    /// Morph an instruction into the most compact push of a `long`
    pub fn set_const_long(&mut self, id: InsnId, value: i64) -> Result<(), Error> {
        let insn = match value {
            0 | 1 => Insn::Constant {
                opcode: opcodes::LCONST_0 + value as u8,
                operand: ConstOperand::None,
            },
            _ => {
                let index = self.pool.borrow_mut().find_or_create_long(value)?;
                Insn::Constant {
                    opcode: opcodes::LDC2_W,
                    operand: ConstOperand::Pool(index),
                }
            }
        };
        *self.insn_mut(id)? = insn;
        Ok(())
    }

    /// Morph an instruction into the most compact push of a `float`
    ///
    /// The `fconst` shortcuts are taken only on an exact bit match, so a
    /// negative zero still goes through the pool.
    pub fn set_const_float(&mut self, id: InsnId, value: f32) -> Result<(), Error> {
        let shortcut = [0.0f32, 1.0, 2.0]
            .iter()
            .position(|c| c.to_bits() == value.to_bits());
        let insn = match shortcut {
            Some(position) => Insn::Constant {
                opcode: opcodes::FCONST_0 + position as u8,
                operand: ConstOperand::None,
            },
            None => {
                let index = self.pool.borrow_mut().find_or_create_float(value)?;
                ldc_of(index)
            }
        };
        *self.insn_mut(id)? = insn;
        Ok(())
    }

    /// Morph an instruction into the most compact push of a `double`
    pub fn set_const_double(&mut self, id: InsnId, value: f64) -> Result<(), Error> {
        let shortcut = [0.0f64, 1.0]
            .iter()
            .position(|c| c.to_bits() == value.to_bits());
        let insn = match shortcut {
            Some(position) => Insn::Constant {
                opcode: opcodes::DCONST_0 + position as u8,
                operand: ConstOperand::None,
            },
            None => {
                let index = self.pool.borrow_mut().find_or_create_double(value)?;
                Insn::Constant {
                    opcode: opcodes::LDC2_W,
                    operand: ConstOperand::Pool(index),
                }
            }
        };
        *self.insn_mut(id)? = insn;
        Ok(())
    }

    /// Morph an instruction into a push of a `String` constant
    pub fn set_const_string(&mut self, id: InsnId, value: &str) -> Result<(), Error> {
        let index = self.pool.borrow_mut().find_or_create_string(value)?;
        *self.insn_mut(id)? = ldc_of(index);
        Ok(())
    }

    /// Morph an instruction into a push of a class literal
    pub fn set_const_class(&mut self, id: InsnId, name: &str) -> Result<(), Error> {
        let index = self.pool.borrow_mut().find_or_create_class(name)?;
        *self.insn_mut(id)? = ldc_of(index);
        Ok(())
    }

    /// Morph an instruction into `aconst_null`
    pub fn set_const_null(&mut self, id: InsnId) -> Result<(), Error> {
        *self.insn_mut(id)? = Insn::Constant {
            opcode: opcodes::ACONST_NULL,
            operand: ConstOperand::None,
        };
        Ok(())
    }

    /// Read a `Code` attribute body
    ///
    /// All pointers come out resolved to instruction mode.
    pub fn read_from<R: ReadBytesExt>(
        reader: &mut R,
        pool: Rc<RefCell<ConstantPool>>,
    ) -> Result<Code, Error> {
        let mut code = Code::new(pool);
        code.max_stack = reader.read_u16::<BigEndian>()?;
        code.max_locals = reader.read_u16::<BigEndian>()?;

        let code_length = reader.read_u32::<BigEndian>()?;
        let mut bytes = vec![0u8; code_length as usize];
        reader.read_exact(&mut bytes)?;

        let mut body = Cursor::new(&bytes[..]);
        while (body.position() as u32) < code_length {
            let at = body.position() as u32;
            let opcode = body.read_u8()?;
            code.push(Insn::read(opcode, &mut body, at)?);
        }

        let handler_count = reader.read_u16::<BigEndian>()?;
        for _ in 0..handler_count {
            code.handlers.push(ExceptionHandler::read(reader)?);
        }

        let attribute_count = reader.read_u16::<BigEndian>()?;
        for index in 0..attribute_count as usize {
            let name_index = reader.read_u16::<BigEndian>()?;
            let length = reader.read_u32::<BigEndian>()?;
            let mut info = vec![0u8; length as usize];
            reader.read_exact(&mut info)?;

            let name = code.pool.borrow().utf8(name_index)?.to_string();
            let mut body = Cursor::new(&info[..]);
            match name.as_str() {
                "LineNumberTable" => {
                    code.line_numbers = Some(LineNumberTable::read(&mut body)?);
                    code.line_numbers_position = Some(index);
                }
                "LocalVariableTable" => {
                    code.local_variables = Some(LocalVariableTable::read(&mut body)?);
                    code.local_variables_position = Some(index);
                }
                _ => code.attributes.push(Attribute { name_index, info }),
            }
        }

        code.update_targets()?;
        Ok(code)
    }

    /// Write the `Code` attribute body
    pub fn write<W: WriteBytesExt>(&self, writer: &mut W) -> Result<(), Error> {
        let mut body: Vec<u8> = vec![];
        for id in self.iter() {
            let at = self.byte_index(id)?;
            debug_assert_eq!(at, body.len() as u32);
            self.insn(id)?.write(&mut body, at, self)?;
        }

        // Table attributes serialize before the header so their names are in
        // the pool by the time anyone writes it out
        let mut attributes: Vec<Attribute> = self.attributes.clone();
        let mut recognized: Vec<(Option<usize>, Attribute)> = vec![];
        if let Some(table) = &self.line_numbers {
            let mut info = vec![];
            table.write(&mut info, self)?;
            let name_index = self.pool.borrow_mut().find_or_create_utf8("LineNumberTable")?;
            recognized.push((self.line_numbers_position, Attribute { name_index, info }));
        }
        if let Some(table) = &self.local_variables {
            let mut info = vec![];
            table.write(&mut info, self)?;
            let name_index = self
                .pool
                .borrow_mut()
                .find_or_create_utf8("LocalVariableTable")?;
            recognized.push((self.local_variables_position, Attribute { name_index, info }));
        }
        recognized.sort_by_key(|(position, _)| position.unwrap_or(usize::MAX));
        for (position, attribute) in recognized {
            place_attribute(&mut attributes, position, attribute);
        }

        writer.write_u16::<BigEndian>(self.max_stack)?;
        writer.write_u16::<BigEndian>(self.max_locals)?;
        writer.write_u32::<BigEndian>(body.len() as u32)?;
        writer.write_all(&body)?;

        writer.write_u16::<BigEndian>(self.handlers.len() as u16)?;
        for handler in &self.handlers {
            handler.write(writer, self)?;
        }

        writer.write_u16::<BigEndian>(attributes.len() as u16)?;
        for attribute in &attributes {
            writer.write_u16::<BigEndian>(attribute.name_index)?;
            writer.write_u32::<BigEndian>(attribute.info.len() as u32)?;
            writer.write_all(&attribute.info)?;
        }
        Ok(())
    }
}

fn ldc_of(index: u16) -> Insn {
    let opcode = if index <= u8::MAX as u16 {
        opcodes::LDC
    } else {
        opcodes::LDC_W
    };
    Insn::Constant {
        opcode,
        operand: ConstOperand::Pool(index),
    }
}
