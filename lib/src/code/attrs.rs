use crate::code::{Code, InsnPtr, TargetResolver};
use crate::errors::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// One entry of a method's exception table
///
/// The encoded form keys the protected range by program counter, with an
/// exclusive end. In instruction mode `try_end` points at the last covered
/// instruction instead, so the range follows edits naturally: the encoded
/// end is recomputed as that instruction's end on write.
#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    pub try_start: InsnPtr,
    pub try_end: InsnPtr,
    pub handler: InsnPtr,
    /// `Class` constant of the caught type, or 0 for a catch-all
    pub catch_index: u16,
}

impl ExceptionHandler {
    pub fn read<R: ReadBytesExt>(reader: &mut R) -> Result<ExceptionHandler, Error> {
        Ok(ExceptionHandler {
            try_start: InsnPtr::Offset(reader.read_u16::<BigEndian>()? as u32),
            try_end: InsnPtr::Offset(reader.read_u16::<BigEndian>()? as u32),
            handler: InsnPtr::Offset(reader.read_u16::<BigEndian>()? as u32),
            catch_index: reader.read_u16::<BigEndian>()?,
        })
    }

    /// Resolve all three pointers, mapping the exclusive end offset back to
    /// the last instruction it covers
    pub fn resolve(&mut self, resolver: &TargetResolver) -> Result<(), Error> {
        self.try_start.resolve(resolver)?;
        if let InsnPtr::Offset(end_pc) = self.try_end {
            self.try_end = InsnPtr::Insn(resolver.ending_at(end_pc)?);
        }
        self.handler.resolve(resolver)?;
        Ok(())
    }

    /// Exclusive end of the protected range, in bytes
    pub fn end_pc(&self, code: &Code) -> Result<u32, Error> {
        match self.try_end {
            InsnPtr::Offset(offset) => Ok(offset),
            InsnPtr::Insn(id) => code.byte_end(id),
        }
    }

    pub fn write<W: WriteBytesExt>(&self, writer: &mut W, code: &Code) -> Result<(), Error> {
        write_pc(writer, self.try_start.byte_index(code)?)?;
        write_pc(writer, self.end_pc(code)?)?;
        write_pc(writer, self.handler.byte_index(code)?)?;
        writer.write_u16::<BigEndian>(self.catch_index)?;
        Ok(())
    }
}

/// `LineNumberTable` attribute body
///
/// Each record marks the first instruction generated for a source line.
#[derive(Debug, Clone, Default)]
pub struct LineNumberTable {
    pub entries: Vec<LineNumber>,
}

#[derive(Debug, Clone)]
pub struct LineNumber {
    pub target: InsnPtr,
    pub line: u16,
}

impl LineNumberTable {
    pub fn read<R: ReadBytesExt>(reader: &mut R) -> Result<LineNumberTable, Error> {
        let count = reader.read_u16::<BigEndian>()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(LineNumber {
                target: InsnPtr::Offset(reader.read_u16::<BigEndian>()? as u32),
                line: reader.read_u16::<BigEndian>()?,
            });
        }
        Ok(LineNumberTable { entries })
    }

    pub fn resolve(&mut self, resolver: &TargetResolver) -> Result<(), Error> {
        for entry in &mut self.entries {
            entry.target.resolve(resolver)?;
        }
        Ok(())
    }

    /// Records ordered by their current byte offset, whatever order they
    /// were inserted or decoded in
    pub fn sorted_entries(&self, code: &Code) -> Result<Vec<&LineNumber>, Error> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            entries.push((entry.target.byte_index(code)?, entry));
        }
        entries.sort_by_key(|(pc, _)| *pc);
        Ok(entries.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Source line covering a byte offset: the record with the greatest
    /// start not past it
    pub fn line_at(&self, code: &Code, pc: u32) -> Result<Option<u16>, Error> {
        let mut best: Option<(u32, u16)> = None;
        for entry in &self.entries {
            let start = entry.target.byte_index(code)?;
            if start <= pc && best.map_or(true, |(at, _)| start >= at) {
                best = Some((start, entry.line));
            }
        }
        Ok(best.map(|(_, line)| line))
    }

    pub fn write<W: WriteBytesExt>(&self, writer: &mut W, code: &Code) -> Result<(), Error> {
        let mut records = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let pc = checked_pc(entry.target.byte_index(code)?)?;
            records.push((pc, entry.line));
        }
        records.sort_by_key(|(pc, _)| *pc);

        writer.write_u16::<BigEndian>(records.len() as u16)?;
        for (pc, line) in records {
            writer.write_u16::<BigEndian>(pc)?;
            writer.write_u16::<BigEndian>(line)?;
        }
        Ok(())
    }
}

/// `LocalVariableTable` attribute body
///
/// Scope ranges get the same treatment as exception handler ranges: an
/// inclusive `end` instruction in memory, an exclusive program counter on
/// the wire.
#[derive(Debug, Clone, Default)]
pub struct LocalVariableTable {
    pub entries: Vec<LocalVariable>,
}

#[derive(Debug, Clone)]
pub struct LocalVariable {
    pub start: InsnPtr,
    pub end: InsnPtr,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub slot: u16,
}

impl LocalVariableTable {
    pub fn read<R: ReadBytesExt>(reader: &mut R) -> Result<LocalVariableTable, Error> {
        let count = reader.read_u16::<BigEndian>()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let start_pc = reader.read_u16::<BigEndian>()? as u32;
            let length = reader.read_u16::<BigEndian>()? as u32;
            entries.push(LocalVariable {
                start: InsnPtr::Offset(start_pc),
                end: InsnPtr::Offset(start_pc + length),
                name_index: reader.read_u16::<BigEndian>()?,
                descriptor_index: reader.read_u16::<BigEndian>()?,
                slot: reader.read_u16::<BigEndian>()?,
            });
        }
        Ok(LocalVariableTable { entries })
    }

    pub fn resolve(&mut self, resolver: &TargetResolver) -> Result<(), Error> {
        for entry in &mut self.entries {
            entry.start.resolve(resolver)?;
            if let InsnPtr::Offset(end_pc) = entry.end {
                entry.end = InsnPtr::Insn(resolver.ending_at(end_pc)?);
            }
        }
        Ok(())
    }

    /// Records ordered by the current byte offset of their scope start
    pub fn sorted_entries(&self, code: &Code) -> Result<Vec<&LocalVariable>, Error> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            entries.push((entry.start.byte_index(code)?, entry));
        }
        entries.sort_by_key(|(pc, _)| *pc);
        Ok(entries.into_iter().map(|(_, entry)| entry).collect())
    }

    pub fn write<W: WriteBytesExt>(&self, writer: &mut W, code: &Code) -> Result<(), Error> {
        let mut records = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let start = entry.start.byte_index(code)?;
            let end = match entry.end {
                InsnPtr::Offset(offset) => offset,
                InsnPtr::Insn(id) => code.byte_end(id)?,
            };
            records.push((start, end.saturating_sub(start), entry));
        }
        records.sort_by_key(|(start, _, _)| *start);

        writer.write_u16::<BigEndian>(records.len() as u16)?;
        for (start, length, entry) in records {
            write_pc(writer, start)?;
            write_pc(writer, length)?;
            writer.write_u16::<BigEndian>(entry.name_index)?;
            writer.write_u16::<BigEndian>(entry.descriptor_index)?;
            writer.write_u16::<BigEndian>(entry.slot)?;
        }
        Ok(())
    }
}

fn checked_pc(pc: u32) -> Result<u16, Error> {
    u16::try_from(pc).map_err(|_| Error::MethodCodeOverflow(pc))
}

fn write_pc<W: WriteBytesExt>(writer: &mut W, pc: u32) -> Result<(), Error> {
    writer.write_u16::<BigEndian>(checked_pc(pc)?)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::code::{opcodes, Code, Insn, InsnId};
    use crate::pool::ConstantPool;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn two_insn_code() -> (Code, InsnId, InsnId) {
        let mut code = Code::new(Rc::new(RefCell::new(ConstantPool::new())));
        let a = code.push(Insn::simple(opcodes::NOP));
        let b = code.push(Insn::simple(opcodes::RETURN));
        (code, a, b)
    }

    #[test]
    fn line_records_sort_by_current_offset() {
        let (code, a, b) = two_insn_code();
        let table = LineNumberTable {
            entries: vec![
                LineNumber {
                    target: InsnPtr::Insn(b),
                    line: 20,
                },
                LineNumber {
                    target: InsnPtr::Insn(a),
                    line: 10,
                },
            ],
        };

        let lines: Vec<u16> = table
            .sorted_entries(&code)
            .unwrap()
            .iter()
            .map(|entry| entry.line)
            .collect();
        assert_eq!(lines, vec![10, 20]);
    }

    #[test]
    fn local_variable_records_sort_on_write() {
        let (code, a, b) = two_insn_code();
        let table = LocalVariableTable {
            entries: vec![
                LocalVariable {
                    start: InsnPtr::Insn(b),
                    end: InsnPtr::Insn(b),
                    name_index: 2,
                    descriptor_index: 3,
                    slot: 1,
                },
                LocalVariable {
                    start: InsnPtr::Insn(a),
                    end: InsnPtr::Insn(b),
                    name_index: 4,
                    descriptor_index: 5,
                    slot: 0,
                },
            ],
        };

        let slots: Vec<u16> = table
            .sorted_entries(&code)
            .unwrap()
            .iter()
            .map(|entry| entry.slot)
            .collect();
        assert_eq!(slots, vec![0, 1]);

        let mut bytes = vec![];
        table.write(&mut bytes, &code).unwrap();
        // First emitted record is the one starting at pc 0, slot 0
        assert_eq!(&bytes[2..4], &[0, 0]);
        assert_eq!(&bytes[10..12], &[0, 0]);
        // Then the slot-1 record starting at pc 1
        assert_eq!(&bytes[12..14], &[0, 1]);
        assert_eq!(&bytes[20..22], &[0, 1]);
    }
}
