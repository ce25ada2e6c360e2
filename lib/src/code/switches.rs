use crate::code::{Code, InsnPtr};
use crate::errors::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Padding bytes between a switch opcode at `at` and its 4-aligned body
pub fn pad_after(at: u32) -> u32 {
    (4 - ((at + 1) % 4)) % 4
}

/// Dense `tableswitch` instruction
///
/// Covers the contiguous key range `low ..= high`, one target per key, plus a
/// default. All branch offsets are relative to the switch's own byte index,
/// so the encoded size depends on where the instruction lands (the body is
/// padded to a 4-byte boundary).
#[derive(Debug, Clone)]
pub struct TableSwitch {
    pub low: i32,
    pub default_target: InsnPtr,
    pub targets: Vec<InsnPtr>,
}

impl TableSwitch {
    /// Highest matched key
    ///
    /// One target per key, so the high bound is recovered from the target
    /// count rather than stored.
    pub fn high(&self) -> i32 {
        self.low + self.targets.len() as i32 - 1
    }

    pub fn encoded_len(&self, at: u32) -> u32 {
        1 + pad_after(at) + 12 + 4 * self.targets.len() as u32
    }

    /// Read the body following a `tableswitch` opcode found at byte `at`
    pub fn read<R: ReadBytesExt>(reader: &mut R, at: u32) -> Result<TableSwitch, Error> {
        skip_padding(reader, at)?;
        let default_target = read_branch(reader, at)?;
        let low = reader.read_i32::<BigEndian>()?;
        let high = reader.read_i32::<BigEndian>()?;
        if high < low {
            return Err(Error::MalformedFormat(format!(
                "tableswitch bounds out of order ({} > {})",
                low, high
            )));
        }
        let count = (high as i64 - low as i64 + 1) as usize;
        let mut targets = Vec::with_capacity(count);
        for _ in 0..count {
            targets.push(read_branch(reader, at)?);
        }
        Ok(TableSwitch {
            low,
            default_target,
            targets,
        })
    }

    /// Write the body (padding included) for a `tableswitch` opcode already
    /// emitted at byte `at`
    pub fn write<W: WriteBytesExt>(&self, writer: &mut W, at: u32, code: &Code) -> Result<(), Error> {
        write_padding(writer, at)?;
        write_branch(writer, at, &self.default_target, code)?;
        writer.write_i32::<BigEndian>(self.low)?;
        writer.write_i32::<BigEndian>(self.high())?;
        for target in &self.targets {
            write_branch(writer, at, target, code)?;
        }
        Ok(())
    }
}

/// Sparse `lookupswitch` instruction
///
/// Matched keys are explicit, paired with their targets. The encoded form
/// requires pairs sorted ascending by key; the in-memory order is free, and
/// sorting happens on write.
#[derive(Debug, Clone)]
pub struct LookupSwitch {
    pub default_target: InsnPtr,
    pub cases: Vec<(i32, InsnPtr)>,
}

impl LookupSwitch {
    pub fn encoded_len(&self, at: u32) -> u32 {
        1 + pad_after(at) + 8 + 8 * self.cases.len() as u32
    }

    /// Read the body following a `lookupswitch` opcode found at byte `at`
    pub fn read<R: ReadBytesExt>(reader: &mut R, at: u32) -> Result<LookupSwitch, Error> {
        skip_padding(reader, at)?;
        let default_target = read_branch(reader, at)?;
        let npairs = reader.read_i32::<BigEndian>()?;
        if npairs < 0 {
            return Err(Error::MalformedFormat(format!(
                "negative lookupswitch pair count {}",
                npairs
            )));
        }
        let mut cases = Vec::with_capacity(npairs as usize);
        for _ in 0..npairs {
            let key = reader.read_i32::<BigEndian>()?;
            cases.push((key, read_branch(reader, at)?));
        }
        Ok(LookupSwitch {
            default_target,
            cases,
        })
    }

    /// Write the body (padding included) for a `lookupswitch` opcode already
    /// emitted at byte `at`
    pub fn write<W: WriteBytesExt>(&self, writer: &mut W, at: u32, code: &Code) -> Result<(), Error> {
        write_padding(writer, at)?;
        write_branch(writer, at, &self.default_target, code)?;
        writer.write_i32::<BigEndian>(self.cases.len() as i32)?;

        let mut sorted: Vec<&(i32, InsnPtr)> = self.cases.iter().collect();
        sorted.sort_by_key(|(key, _)| *key);
        for (key, target) in sorted {
            writer.write_i32::<BigEndian>(*key)?;
            write_branch(writer, at, target, code)?;
        }
        Ok(())
    }
}

fn skip_padding<R: ReadBytesExt>(reader: &mut R, at: u32) -> Result<(), Error> {
    for _ in 0..pad_after(at) {
        reader.read_u8()?;
    }
    Ok(())
}

fn write_padding<W: WriteBytesExt>(writer: &mut W, at: u32) -> Result<(), Error> {
    for _ in 0..pad_after(at) {
        writer.write_u8(0)?;
    }
    Ok(())
}

fn read_branch<R: ReadBytesExt>(reader: &mut R, at: u32) -> Result<InsnPtr, Error> {
    let relative = reader.read_i32::<BigEndian>()?;
    match u32::try_from(at as i64 + relative as i64) {
        Ok(absolute) => Ok(InsnPtr::Offset(absolute)),
        Err(_) => Err(Error::MalformedFormat(format!(
            "branch offset {} escapes the code array",
            relative
        ))),
    }
}

fn write_branch<W: WriteBytesExt>(
    writer: &mut W,
    at: u32,
    target: &InsnPtr,
    code: &Code,
) -> Result<(), Error> {
    let absolute = target.byte_index(code)?;
    let relative = absolute as i64 - at as i64;
    match i32::try_from(relative) {
        Ok(relative) => writer.write_i32::<BigEndian>(relative)?,
        Err(_) => return Err(Error::JumpOffsetOverflow(relative)),
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn padding_aligns_the_body() {
        assert_eq!(pad_after(0), 3);
        assert_eq!(pad_after(1), 2);
        assert_eq!(pad_after(2), 1);
        assert_eq!(pad_after(3), 0);
        assert_eq!(pad_after(4), 3);
    }

    #[test]
    fn table_switch_body_round_trip() {
        // Opcode at byte 2, so one pad byte before the body
        let at = 2;
        let mut bytes = vec![0u8]; // padding
        for word in [10i32, 5, 7, 20, 24, 28] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        let switch = TableSwitch::read(&mut std::io::Cursor::new(&bytes), at).unwrap();
        assert_eq!(switch.low, 5);
        assert_eq!(switch.high(), 7);
        assert_eq!(switch.default_target, InsnPtr::Offset(12));
        assert_eq!(
            switch.targets,
            vec![InsnPtr::Offset(22), InsnPtr::Offset(26), InsnPtr::Offset(30)]
        );
        assert_eq!(switch.encoded_len(at), 1 + bytes.len() as u32);
    }

    #[test]
    fn table_switch_rejects_inverted_bounds() {
        let mut bytes = vec![0u8, 0, 0]; // padding for at == 0
        for word in [0i32, 9, 3] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        assert!(matches!(
            TableSwitch::read(&mut std::io::Cursor::new(&bytes), 0),
            Err(Error::MalformedFormat(_))
        ));
    }

    #[test]
    fn lookup_switch_body_round_trip() {
        let at = 3; // already aligned, no padding
        let mut bytes = vec![];
        for word in [40i32, 2, -5, 8, 100, 16] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        let switch = LookupSwitch::read(&mut std::io::Cursor::new(&bytes), at).unwrap();
        assert_eq!(switch.default_target, InsnPtr::Offset(43));
        assert_eq!(
            switch.cases,
            vec![(-5, InsnPtr::Offset(11)), (100, InsnPtr::Offset(19))]
        );
        assert_eq!(switch.encoded_len(at), 1 + bytes.len() as u32);
    }

    #[test]
    fn branch_escaping_the_array_rejected() {
        let mut bytes = vec![];
        bytes.extend_from_slice(&(-100i32).to_be_bytes());
        assert!(matches!(
            read_branch(&mut std::io::Cursor::new(&bytes), 3),
            Err(Error::MalformedFormat(_))
        ));
    }
}
