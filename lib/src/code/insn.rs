use crate::binary::Deserialize;
use crate::code::switches::{LookupSwitch, TableSwitch};
use crate::code::{opcodes, Code, InsnPtr};
use crate::errors::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Category of value a local variable instruction moves
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Object,
}

impl ValueKind {
    /// Position within the opcode families, which lay the kinds out in this
    /// order (`iload`, `lload`, `fload`, `dload`, `aload` and so on)
    fn index(self) -> u8 {
        match self {
            ValueKind::Int => 0,
            ValueKind::Long => 1,
            ValueKind::Float => 2,
            ValueKind::Double => 3,
            ValueKind::Object => 4,
        }
    }

    fn from_index(index: u8) -> ValueKind {
        match index {
            0 => ValueKind::Int,
            1 => ValueKind::Long,
            2 => ValueKind::Float,
            3 => ValueKind::Double,
            _ => ValueKind::Object,
        }
    }

    /// Operand stack slots a value of this kind occupies
    pub fn stack_width(self) -> i32 {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            _ => 1,
        }
    }
}

/// Encoded shape of a local variable access
///
/// The format offers three encodings per family: a one-byte form for slots 0
/// through 3, a two-byte form for slots up to 255, and a `wide`-prefixed
/// four-byte form for the rest. Decoding remembers which form the input used
/// so an untouched instruction re-encodes byte for byte; mutating the slot
/// re-picks the most compact form.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LocalForm {
    Fast,
    Short,
    Wide,
}

impl LocalForm {
    pub fn for_slot(slot: u16) -> LocalForm {
        if slot <= 3 {
            LocalForm::Fast
        } else if slot <= u8::MAX as u16 {
            LocalForm::Short
        } else {
            LocalForm::Wide
        }
    }
}

/// Operand of a constant-pushing instruction
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConstOperand {
    /// The value is implied by the opcode (`iconst_2`, `aconst_null`, ...)
    None,
    /// `bipush` immediate
    Byte(i8),
    /// `sipush` immediate
    Short(i16),
    /// Constant pool index (`ldc`, `ldc_w`, `ldc2_w`)
    Pool(u16),
}

/// One decoded instruction
///
/// Instructions with interesting operands get their own variants; everything
/// with no operands (arithmetic, stack shuffling, array element access,
/// returns, ...) is `Simple`.
#[derive(Debug, Clone)]
pub enum Insn {
    Simple {
        opcode: u8,
    },

    /// Pushes a constant: the `iconst` family, `bipush`/`sipush`, and the
    /// `ldc` family
    Constant {
        opcode: u8,
        operand: ConstOperand,
    },

    /// Reads a local variable slot
    ///
    /// `kind` and `slot` are `None` on a freshly constructed instruction
    /// whose details have not been filled in yet; such an instruction cannot
    /// be encoded.
    Load {
        kind: Option<ValueKind>,
        slot: Option<u16>,
        form: LocalForm,
    },

    /// Writes a local variable slot
    Store {
        kind: Option<ValueKind>,
        slot: Option<u16>,
        form: LocalForm,
    },

    Iinc {
        slot: u16,
        amount: i16,
        wide: bool,
    },

    Ret {
        slot: u16,
        wide: bool,
    },

    /// Field access, invocation, `new`, `anewarray`, `checkcast`, or
    /// `instanceof`: one constant pool operand
    PoolRef {
        opcode: u8,
        index: u16,
    },

    InvokeInterface {
        index: u16,
        count: u8,
    },

    InvokeDynamic {
        index: u16,
    },

    NewArray {
        element_type: u8,
    },

    MultiANewArray {
        index: u16,
        dims: u8,
    },

    /// Conditional or unconditional branch (`goto_w`/`jsr_w` included)
    Jump {
        opcode: u8,
        target: InsnPtr,
    },

    TableSwitch(TableSwitch),

    LookupSwitch(LookupSwitch),
}

impl Insn {
    pub fn simple(opcode: u8) -> Insn {
        Insn::Simple { opcode }
    }

    /// Fresh load with no kind or slot yet
    pub fn load() -> Insn {
        Insn::Load {
            kind: None,
            slot: None,
            form: LocalForm::Fast,
        }
    }

    pub fn load_of(kind: ValueKind, slot: u16) -> Insn {
        Insn::Load {
            kind: Some(kind),
            slot: Some(slot),
            form: LocalForm::for_slot(slot),
        }
    }

    /// Fresh store with no kind or slot yet
    pub fn store() -> Insn {
        Insn::Store {
            kind: None,
            slot: None,
            form: LocalForm::Fast,
        }
    }

    pub fn store_of(kind: ValueKind, slot: u16) -> Insn {
        Insn::Store {
            kind: Some(kind),
            slot: Some(slot),
            form: LocalForm::for_slot(slot),
        }
    }

    pub fn iinc(slot: u16, amount: i16) -> Insn {
        let wide = slot > u8::MAX as u16 || amount < i8::MIN as i16 || amount > i8::MAX as i16;
        Insn::Iinc { slot, amount, wide }
    }

    pub fn ret(slot: u16) -> Insn {
        Insn::Ret {
            slot,
            wide: slot > u8::MAX as u16,
        }
    }

    pub fn jump(opcode: u8, target: InsnPtr) -> Insn {
        Insn::Jump { opcode, target }
    }

    /// Kind of value accessed, for load and store instructions
    pub fn local_kind(&self) -> Option<ValueKind> {
        match self {
            Insn::Load { kind, .. } | Insn::Store { kind, .. } => *kind,
            _ => None,
        }
    }

    /// Local variable slot accessed, for load, store, `iinc`, and `ret`
    pub fn local_slot(&self) -> Option<u16> {
        match self {
            Insn::Load { slot, .. } | Insn::Store { slot, .. } => *slot,
            Insn::Iinc { slot, .. } | Insn::Ret { slot, .. } => Some(*slot),
            _ => None,
        }
    }

    /// Set the value kind of a load or store
    pub fn set_local_kind(&mut self, new_kind: ValueKind) -> Result<(), Error> {
        match self {
            Insn::Load { kind, .. } | Insn::Store { kind, .. } => {
                *kind = Some(new_kind);
                Ok(())
            }
            _ => Err(Error::InvalidOperation(
                "not a local variable load or store",
            )),
        }
    }

    /// Set the slot of a load or store, re-picking the most compact encoding
    pub fn set_local_slot(&mut self, new_slot: u16) -> Result<(), Error> {
        match self {
            Insn::Load { slot, form, .. } | Insn::Store { slot, form, .. } => {
                *slot = Some(new_slot);
                *form = LocalForm::for_slot(new_slot);
                Ok(())
            }
            _ => Err(Error::InvalidOperation(
                "not a local variable load or store",
            )),
        }
    }

    /// Branch target, for jumps only (switches have several)
    pub fn jump_target(&self) -> Option<&InsnPtr> {
        match self {
            Insn::Jump { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Visit every instruction pointer this instruction carries
    pub fn for_each_ptr_mut<F: FnMut(&mut InsnPtr)>(&mut self, mut f: F) {
        match self {
            Insn::Jump { target, .. } => f(target),
            Insn::TableSwitch(switch) => {
                f(&mut switch.default_target);
                for target in &mut switch.targets {
                    f(target);
                }
            }
            Insn::LookupSwitch(switch) => {
                f(&mut switch.default_target);
                for (_, target) in &mut switch.cases {
                    f(target);
                }
            }
            _ => {}
        }
    }

    /// Current opcode byte, `None` while a load or store is incomplete
    pub fn opcode(&self) -> Option<u8> {
        let opcode = match self {
            Insn::Simple { opcode }
            | Insn::Constant { opcode, .. }
            | Insn::PoolRef { opcode, .. }
            | Insn::Jump { opcode, .. } => *opcode,
            Insn::Load { kind, slot, form } => {
                local_opcode(opcodes::ILOAD, opcodes::ILOAD_0, (*kind)?, (*slot)?, *form)
            }
            Insn::Store { kind, slot, form } => {
                local_opcode(opcodes::ISTORE, opcodes::ISTORE_0, (*kind)?, (*slot)?, *form)
            }
            Insn::Iinc { .. } => opcodes::IINC,
            Insn::Ret { .. } => opcodes::RET,
            Insn::InvokeInterface { .. } => opcodes::INVOKEINTERFACE,
            Insn::InvokeDynamic { .. } => opcodes::INVOKEDYNAMIC,
            Insn::NewArray { .. } => opcodes::NEWARRAY,
            Insn::MultiANewArray { .. } => opcodes::MULTIANEWARRAY,
            Insn::TableSwitch(_) => opcodes::TABLESWITCH,
            Insn::LookupSwitch(_) => opcodes::LOOKUPSWITCH,
        };
        Some(opcode)
    }

    /// Mnemonic of the current opcode
    pub fn mnemonic(&self) -> &'static str {
        self.opcode()
            .and_then(opcodes::name)
            .unwrap_or("<incomplete>")
    }

    /// Encoded size in bytes, were this instruction to start at byte `at`
    ///
    /// Incomplete loads and stores report the one-byte fast form until their
    /// slot says otherwise.
    pub fn encoded_len(&self, at: u32) -> u32 {
        match self {
            Insn::Simple { .. } => 1,
            Insn::Constant { opcode, .. } => match *opcode {
                opcodes::BIPUSH | opcodes::LDC => 2,
                opcodes::SIPUSH | opcodes::LDC_W | opcodes::LDC2_W => 3,
                _ => 1,
            },
            Insn::Load { form, .. } | Insn::Store { form, .. } => match form {
                LocalForm::Fast => 1,
                LocalForm::Short => 2,
                LocalForm::Wide => 4,
            },
            Insn::Iinc { wide, .. } => {
                if *wide {
                    6
                } else {
                    3
                }
            }
            Insn::Ret { wide, .. } => {
                if *wide {
                    4
                } else {
                    2
                }
            }
            Insn::PoolRef { .. } => 3,
            Insn::InvokeInterface { .. } => 5,
            Insn::InvokeDynamic { .. } => 5,
            Insn::NewArray { .. } => 2,
            Insn::MultiANewArray { .. } => 4,
            Insn::Jump { opcode, .. } => match *opcode {
                opcodes::GOTO_W | opcodes::JSR_W => 5,
                _ => 3,
            },
            Insn::TableSwitch(switch) => switch.encoded_len(at),
            Insn::LookupSwitch(switch) => switch.encoded_len(at),
        }
    }

    /// Net operand stack effect, when it can be known without consulting a
    /// descriptor (field accesses and invocations need one)
    pub fn stack_delta(&self) -> Option<i32> {
        match self {
            Insn::Load { kind, .. } => Some(kind.as_ref()?.stack_width()),
            Insn::Store { kind, .. } => Some(-kind.as_ref()?.stack_width()),
            Insn::MultiANewArray { dims, .. } => Some(1 - *dims as i32),
            Insn::PoolRef { opcode, .. } => opcodes::stack_delta(*opcode),
            _ => opcodes::stack_delta(self.opcode()?),
        }
    }

    /// Decode the instruction whose opcode byte was `opcode`, found at byte
    /// offset `at` of the code array
    ///
    /// The reader is positioned just past the opcode byte. Branches come out
    /// holding offset-mode pointers.
    pub fn read<R: ReadBytesExt>(opcode: u8, reader: &mut R, at: u32) -> Result<Insn, Error> {
        use crate::code::opcodes::*;
        let insn = match opcode {
            ACONST_NULL..=DCONST_1 => Insn::Constant {
                opcode,
                operand: ConstOperand::None,
            },
            BIPUSH => Insn::Constant {
                opcode,
                operand: ConstOperand::Byte(i8::deserialize(reader)?),
            },
            SIPUSH => Insn::Constant {
                opcode,
                operand: ConstOperand::Short(i16::deserialize(reader)?),
            },
            LDC => Insn::Constant {
                opcode,
                operand: ConstOperand::Pool(reader.read_u8()? as u16),
            },
            LDC_W | LDC2_W => Insn::Constant {
                opcode,
                operand: ConstOperand::Pool(reader.read_u16::<BigEndian>()?),
            },
            ILOAD..=ALOAD => Insn::Load {
                kind: Some(ValueKind::from_index(opcode - ILOAD)),
                slot: Some(reader.read_u8()? as u16),
                form: LocalForm::Short,
            },
            ILOAD_0..=45 => Insn::Load {
                kind: Some(ValueKind::from_index((opcode - ILOAD_0) / 4)),
                slot: Some(((opcode - ILOAD_0) % 4) as u16),
                form: LocalForm::Fast,
            },
            ISTORE..=ASTORE => Insn::Store {
                kind: Some(ValueKind::from_index(opcode - ISTORE)),
                slot: Some(reader.read_u8()? as u16),
                form: LocalForm::Short,
            },
            ISTORE_0..=78 => Insn::Store {
                kind: Some(ValueKind::from_index((opcode - ISTORE_0) / 4)),
                slot: Some(((opcode - ISTORE_0) % 4) as u16),
                form: LocalForm::Fast,
            },
            IINC => Insn::Iinc {
                slot: reader.read_u8()? as u16,
                amount: reader.read_i8()? as i16,
                wide: false,
            },
            IFEQ..=JSR | IFNULL | IFNONNULL => {
                let relative = reader.read_i16::<BigEndian>()? as i64;
                Insn::Jump {
                    opcode,
                    target: branch_target(at, relative)?,
                }
            }
            GOTO_W | JSR_W => {
                let relative = reader.read_i32::<BigEndian>()? as i64;
                Insn::Jump {
                    opcode,
                    target: branch_target(at, relative)?,
                }
            }
            RET => Insn::Ret {
                slot: reader.read_u8()? as u16,
                wide: false,
            },
            TABLESWITCH => Insn::TableSwitch(TableSwitch::read(reader, at)?),
            LOOKUPSWITCH => Insn::LookupSwitch(LookupSwitch::read(reader, at)?),
            GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Insn::PoolRef {
                opcode,
                index: reader.read_u16::<BigEndian>()?,
            },
            INVOKEINTERFACE => {
                let index = reader.read_u16::<BigEndian>()?;
                let count = reader.read_u8()?;
                reader.read_u8()?; // trailing zero byte
                Insn::InvokeInterface { index, count }
            }
            INVOKEDYNAMIC => {
                let index = reader.read_u16::<BigEndian>()?;
                reader.read_u16::<BigEndian>()?; // trailing zero bytes
                Insn::InvokeDynamic { index }
            }
            NEWARRAY => Insn::NewArray {
                element_type: reader.read_u8()?,
            },
            MULTIANEWARRAY => Insn::MultiANewArray {
                index: reader.read_u16::<BigEndian>()?,
                dims: reader.read_u8()?,
            },
            WIDE => {
                let widened = reader.read_u8()?;
                let slot = reader.read_u16::<BigEndian>()?;
                match widened {
                    ILOAD..=ALOAD => Insn::Load {
                        kind: Some(ValueKind::from_index(widened - ILOAD)),
                        slot: Some(slot),
                        form: LocalForm::Wide,
                    },
                    ISTORE..=ASTORE => Insn::Store {
                        kind: Some(ValueKind::from_index(widened - ISTORE)),
                        slot: Some(slot),
                        form: LocalForm::Wide,
                    },
                    RET => Insn::Ret { slot, wide: true },
                    IINC => Insn::Iinc {
                        slot,
                        amount: reader.read_i16::<BigEndian>()?,
                        wide: true,
                    },
                    other => {
                        return Err(Error::MalformedFormat(format!(
                            "opcode {} cannot follow a wide prefix",
                            other
                        )))
                    }
                }
            }
            other => {
                if opcodes::name(other).is_some() {
                    Insn::Simple { opcode: other }
                } else {
                    return Err(Error::MalformedFormat(format!(
                        "unknown opcode {} at byte {}",
                        other, at
                    )));
                }
            }
        };
        Ok(insn)
    }

    /// Encode this instruction at byte offset `at`
    ///
    /// Branch targets are resolved to offsets through `code`, which must be
    /// the block this instruction belongs to.
    pub fn write<W: WriteBytesExt>(&self, writer: &mut W, at: u32, code: &Code) -> Result<(), Error> {
        use crate::code::opcodes::*;
        match self {
            Insn::Simple { opcode } => writer.write_u8(*opcode)?,
            Insn::Constant { opcode, operand } => {
                writer.write_u8(*opcode)?;
                match (opcode, operand) {
                    (&BIPUSH, ConstOperand::Byte(value)) => writer.write_i8(*value)?,
                    (&SIPUSH, ConstOperand::Short(value)) => {
                        writer.write_i16::<BigEndian>(*value)?
                    }
                    (&LDC, ConstOperand::Pool(index)) => writer.write_u8(*index as u8)?,
                    (&(LDC_W | LDC2_W), ConstOperand::Pool(index)) => {
                        writer.write_u16::<BigEndian>(*index)?
                    }
                    (_, ConstOperand::None) => {}
                    _ => {
                        return Err(Error::InvalidOperation(
                            "constant instruction operand does not match its opcode",
                        ))
                    }
                }
            }
            Insn::Load { kind, slot, form } | Insn::Store { kind, slot, form } => {
                let (kind, slot) = match (kind, slot) {
                    (Some(kind), Some(slot)) => (*kind, *slot),
                    _ => {
                        return Err(Error::InvalidOperation(
                            "local variable instruction is missing its kind or slot",
                        ))
                    }
                };
                let (base, fast_base) = if matches!(self, Insn::Load { .. }) {
                    (ILOAD, ILOAD_0)
                } else {
                    (ISTORE, ISTORE_0)
                };
                match form {
                    LocalForm::Fast => {
                        writer.write_u8(fast_base + kind.index() * 4 + slot as u8)?
                    }
                    LocalForm::Short => {
                        writer.write_u8(base + kind.index())?;
                        writer.write_u8(slot as u8)?;
                    }
                    LocalForm::Wide => {
                        writer.write_u8(WIDE)?;
                        writer.write_u8(base + kind.index())?;
                        writer.write_u16::<BigEndian>(slot)?;
                    }
                }
            }
            Insn::Iinc { slot, amount, wide } => {
                if *wide {
                    writer.write_u8(WIDE)?;
                    writer.write_u8(IINC)?;
                    writer.write_u16::<BigEndian>(*slot)?;
                    writer.write_i16::<BigEndian>(*amount)?;
                } else {
                    writer.write_u8(IINC)?;
                    writer.write_u8(*slot as u8)?;
                    writer.write_i8(*amount as i8)?;
                }
            }
            Insn::Ret { slot, wide } => {
                if *wide {
                    writer.write_u8(WIDE)?;
                    writer.write_u8(RET)?;
                    writer.write_u16::<BigEndian>(*slot)?;
                } else {
                    writer.write_u8(RET)?;
                    writer.write_u8(*slot as u8)?;
                }
            }
            Insn::PoolRef { opcode, index } => {
                writer.write_u8(*opcode)?;
                writer.write_u16::<BigEndian>(*index)?;
            }
            Insn::InvokeInterface { index, count } => {
                writer.write_u8(INVOKEINTERFACE)?;
                writer.write_u16::<BigEndian>(*index)?;
                writer.write_u8(*count)?;
                writer.write_u8(0)?;
            }
            Insn::InvokeDynamic { index } => {
                writer.write_u8(INVOKEDYNAMIC)?;
                writer.write_u16::<BigEndian>(*index)?;
                writer.write_u16::<BigEndian>(0)?;
            }
            Insn::NewArray { element_type } => {
                writer.write_u8(NEWARRAY)?;
                writer.write_u8(*element_type)?;
            }
            Insn::MultiANewArray { index, dims } => {
                writer.write_u8(MULTIANEWARRAY)?;
                writer.write_u16::<BigEndian>(*index)?;
                writer.write_u8(*dims)?;
            }
            Insn::Jump { opcode, target } => {
                writer.write_u8(*opcode)?;
                let relative = target.byte_index(code)? as i64 - at as i64;
                if *opcode == GOTO_W || *opcode == JSR_W {
                    match i32::try_from(relative) {
                        Ok(relative) => writer.write_i32::<BigEndian>(relative)?,
                        Err(_) => return Err(Error::JumpOffsetOverflow(relative)),
                    }
                } else {
                    match i16::try_from(relative) {
                        Ok(relative) => writer.write_i16::<BigEndian>(relative)?,
                        Err(_) => return Err(Error::JumpOffsetOverflow(relative)),
                    }
                }
            }
            Insn::TableSwitch(switch) => {
                writer.write_u8(TABLESWITCH)?;
                switch.write(writer, at, code)?;
            }
            Insn::LookupSwitch(switch) => {
                writer.write_u8(LOOKUPSWITCH)?;
                switch.write(writer, at, code)?;
            }
        }
        Ok(())
    }
}

fn local_opcode(base: u8, fast_base: u8, kind: ValueKind, slot: u16, form: LocalForm) -> u8 {
    match form {
        LocalForm::Fast => fast_base + kind.index() * 4 + slot as u8,
        _ => base + kind.index(),
    }
}

fn branch_target(at: u32, relative: i64) -> Result<InsnPtr, Error> {
    match u32::try_from(at as i64 + relative) {
        Ok(absolute) => Ok(InsnPtr::Offset(absolute)),
        Err(_) => Err(Error::MalformedFormat(format!(
            "branch offset {} escapes the code array",
            relative
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode(bytes: &[u8], at: u32) -> Insn {
        let mut cursor = std::io::Cursor::new(&bytes[1..]);
        Insn::read(bytes[0], &mut cursor, at).unwrap()
    }

    #[test]
    fn fast_forms_decode_kind_and_slot() {
        let insn = decode(&[42], 0); // aload_0
        assert_eq!(insn.local_kind(), Some(ValueKind::Object));
        assert_eq!(insn.local_slot(), Some(0));

        let insn = decode(&[63], 0); // lstore_0
        assert_eq!(insn.local_kind(), Some(ValueKind::Long));
        assert_eq!(insn.local_slot(), Some(0));
        assert_eq!(insn.stack_delta(), Some(-2));
    }

    #[test]
    fn wide_prefix_decodes() {
        let insn = decode(&[196, 21, 1, 44], 0); // wide iload 300
        assert_eq!(insn.local_kind(), Some(ValueKind::Int));
        assert_eq!(insn.local_slot(), Some(300));
        assert_eq!(insn.encoded_len(0), 4);

        let insn = decode(&[196, 132, 1, 44, 0, 200], 0); // wide iinc 300 by 200
        match insn {
            Insn::Iinc { slot, amount, wide } => {
                assert_eq!(slot, 300);
                assert_eq!(amount, 200);
                assert!(wide);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn slot_mutation_repicks_the_form() {
        let mut insn = decode(&[25, 200], 0); // aload 200
        assert_eq!(insn.encoded_len(0), 2);
        insn.set_local_slot(2).unwrap();
        assert_eq!(insn.encoded_len(0), 1);
        assert_eq!(insn.opcode(), Some(44)); // aload_2
        insn.set_local_slot(300).unwrap();
        assert_eq!(insn.encoded_len(0), 4);
    }

    #[test]
    fn incomplete_load_cannot_encode() {
        let insn = Insn::load();
        assert_eq!(insn.encoded_len(0), 1);
        assert_eq!(insn.opcode(), None);
        assert_eq!(insn.stack_delta(), None);
    }

    #[test]
    fn jumps_resolve_relative_offsets() {
        let insn = decode(&[167, 0, 10], 4); // goto +10
        assert_eq!(insn.jump_target(), Some(&InsnPtr::Offset(14)));

        let insn = decode(&[153, 255, 252], 8); // ifeq -4
        assert_eq!(insn.jump_target(), Some(&InsnPtr::Offset(4)));
    }

    #[test]
    fn backward_branch_before_the_start_rejected() {
        let mut cursor = std::io::Cursor::new(vec![255u8, 0]); // -256
        assert!(matches!(
            Insn::read(opcodes::GOTO, &mut cursor, 4),
            Err(Error::MalformedFormat(_))
        ));
    }

    #[test]
    fn invoke_interface_swallows_count_bytes() {
        let insn = decode(&[185, 0, 9, 2, 0], 0);
        match insn {
            Insn::InvokeInterface { index, count } => {
                assert_eq!(index, 9);
                assert_eq!(count, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_opcode_rejected() {
        let mut cursor = std::io::Cursor::new(vec![]);
        assert!(matches!(
            Insn::read(203, &mut cursor, 0),
            Err(Error::MalformedFormat(_))
        ));
    }

    #[test]
    fn multianewarray_stack_delta_counts_dimensions() {
        let insn = decode(&[197, 0, 2, 3], 0);
        assert_eq!(insn.stack_delta(), Some(-2));
    }
}
