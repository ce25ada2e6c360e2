use crate::code::{Code, TargetResolver};
use crate::errors::Error;

/// Stable handle to an instruction within one code block
///
/// Handles index into the block's slot arena and are never reused, so a
/// handle to a removed instruction stays invalid forever instead of silently
/// aliasing a newcomer.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct InsnId(pub(crate) usize);

/// Pointer to an instruction, in one of two modes
///
/// Freshly decoded pointers hold the raw byte offset their encoding carried.
/// Once resolved against a code block they hold an [`InsnId`] instead, and
/// from then on follow the instruction through inserts, removals, and
/// re-encodings around it. Resolution is one-way: a pointer never falls back
/// to offset mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InsnPtr {
    /// Unresolved byte offset from the start of the code array
    Offset(u32),
    /// Resolved instruction handle
    Insn(InsnId),
}

impl InsnPtr {
    /// Point at a raw byte offset, dropping back to offset mode
    pub fn set_byte_index(&mut self, offset: u32) {
        *self = InsnPtr::Offset(offset);
    }

    /// Point directly at an instruction
    pub fn set_target(&mut self, id: InsnId) {
        *self = InsnPtr::Insn(id);
    }

    /// Handle of the pointed-at instruction
    ///
    /// An offset-mode pointer is resolved on the fly (without changing mode);
    /// an offset that is not an instruction boundary, or a handle whose
    /// instruction was removed, is a dangling target.
    pub fn target(&self, code: &Code) -> Result<InsnId, Error> {
        match self {
            InsnPtr::Offset(offset) => code.instruction_at(*offset),
            InsnPtr::Insn(id) => {
                if code.contains(*id) {
                    Ok(*id)
                } else {
                    Err(Error::DanglingTarget { offset: None })
                }
            }
        }
    }

    /// Current byte offset of the pointed-at instruction
    pub fn byte_index(&self, code: &Code) -> Result<u32, Error> {
        match self {
            InsnPtr::Offset(offset) => Ok(*offset),
            InsnPtr::Insn(id) => code.byte_index(*id),
        }
    }

    /// Switch an offset-mode pointer over to instruction mode
    ///
    /// Already-resolved pointers are left alone.
    pub fn resolve(&mut self, resolver: &TargetResolver) -> Result<(), Error> {
        if let InsnPtr::Offset(offset) = self {
            *self = InsnPtr::Insn(resolver.at(*offset)?);
        }
        Ok(())
    }

    /// Redirect this pointer if it points at `from`
    pub fn replace(&mut self, from: InsnId, to: InsnId) {
        if *self == InsnPtr::Insn(from) {
            *self = InsnPtr::Insn(to);
        }
    }
}
