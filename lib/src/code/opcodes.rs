//! Opcode byte values and mnemonics
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-6.html

pub const NOP: u8 = 0;
pub const ACONST_NULL: u8 = 1;
pub const ICONST_M1: u8 = 2;
pub const ICONST_0: u8 = 3;
pub const ICONST_1: u8 = 4;
pub const ICONST_2: u8 = 5;
pub const ICONST_3: u8 = 6;
pub const ICONST_4: u8 = 7;
pub const ICONST_5: u8 = 8;
pub const LCONST_0: u8 = 9;
pub const LCONST_1: u8 = 10;
pub const FCONST_0: u8 = 11;
pub const FCONST_1: u8 = 12;
pub const FCONST_2: u8 = 13;
pub const DCONST_0: u8 = 14;
pub const DCONST_1: u8 = 15;
pub const BIPUSH: u8 = 16;
pub const SIPUSH: u8 = 17;
pub const LDC: u8 = 18;
pub const LDC_W: u8 = 19;
pub const LDC2_W: u8 = 20;
pub const ILOAD: u8 = 21;
pub const LLOAD: u8 = 22;
pub const FLOAD: u8 = 23;
pub const DLOAD: u8 = 24;
pub const ALOAD: u8 = 25;
pub const ILOAD_0: u8 = 26;
pub const ALOAD_0: u8 = 42;
pub const ISTORE: u8 = 54;
pub const LSTORE: u8 = 55;
pub const FSTORE: u8 = 56;
pub const DSTORE: u8 = 57;
pub const ASTORE: u8 = 58;
pub const ISTORE_0: u8 = 59;
pub const ASTORE_0: u8 = 75;
pub const IASTORE: u8 = 79;
pub const POP: u8 = 87;
pub const POP2: u8 = 88;
pub const DUP: u8 = 89;
pub const DUP_X1: u8 = 90;
pub const DUP_X2: u8 = 91;
pub const DUP2: u8 = 92;
pub const DUP2_X1: u8 = 93;
pub const DUP2_X2: u8 = 94;
pub const SWAP: u8 = 95;
pub const IINC: u8 = 132;
pub const IFEQ: u8 = 153;
pub const IFNE: u8 = 154;
pub const IFLT: u8 = 155;
pub const IFGE: u8 = 156;
pub const IFGT: u8 = 157;
pub const IFLE: u8 = 158;
pub const IF_ICMPEQ: u8 = 159;
pub const IF_ICMPNE: u8 = 160;
pub const IF_ICMPLT: u8 = 161;
pub const IF_ICMPGE: u8 = 162;
pub const IF_ICMPGT: u8 = 163;
pub const IF_ICMPLE: u8 = 164;
pub const IF_ACMPEQ: u8 = 165;
pub const IF_ACMPNE: u8 = 166;
pub const GOTO: u8 = 167;
pub const JSR: u8 = 168;
pub const RET: u8 = 169;
pub const TABLESWITCH: u8 = 170;
pub const LOOKUPSWITCH: u8 = 171;
pub const IRETURN: u8 = 172;
pub const LRETURN: u8 = 173;
pub const FRETURN: u8 = 174;
pub const DRETURN: u8 = 175;
pub const ARETURN: u8 = 176;
pub const RETURN: u8 = 177;
pub const GETSTATIC: u8 = 178;
pub const PUTSTATIC: u8 = 179;
pub const GETFIELD: u8 = 180;
pub const PUTFIELD: u8 = 181;
pub const INVOKEVIRTUAL: u8 = 182;
pub const INVOKESPECIAL: u8 = 183;
pub const INVOKESTATIC: u8 = 184;
pub const INVOKEINTERFACE: u8 = 185;
pub const INVOKEDYNAMIC: u8 = 186;
pub const NEW: u8 = 187;
pub const NEWARRAY: u8 = 188;
pub const ANEWARRAY: u8 = 189;
pub const ARRAYLENGTH: u8 = 190;
pub const ATHROW: u8 = 191;
pub const CHECKCAST: u8 = 192;
pub const INSTANCEOF: u8 = 193;
pub const MONITORENTER: u8 = 194;
pub const MONITOREXIT: u8 = 195;
pub const WIDE: u8 = 196;
pub const MULTIANEWARRAY: u8 = 197;
pub const IFNULL: u8 = 198;
pub const IFNONNULL: u8 = 199;
pub const GOTO_W: u8 = 200;
pub const JSR_W: u8 = 201;

/// Mnemonic for an opcode, or `None` for bytes outside the instruction set
pub fn name(opcode: u8) -> Option<&'static str> {
    NAMES.get(opcode as usize).copied()
}

#[rustfmt::skip]
static NAMES: [&str; 202] = [
    "nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2",
    "iconst_3", "iconst_4", "iconst_5", "lconst_0", "lconst_1", "fconst_0",
    "fconst_1", "fconst_2", "dconst_0", "dconst_1", "bipush", "sipush", "ldc",
    "ldc_w", "ldc2_w", "iload", "lload", "fload", "dload", "aload", "iload_0",
    "iload_1", "iload_2", "iload_3", "lload_0", "lload_1", "lload_2",
    "lload_3", "fload_0", "fload_1", "fload_2", "fload_3", "dload_0",
    "dload_1", "dload_2", "dload_3", "aload_0", "aload_1", "aload_2",
    "aload_3", "iaload", "laload", "faload", "daload", "aaload", "baload",
    "caload", "saload", "istore", "lstore", "fstore", "dstore", "astore",
    "istore_0", "istore_1", "istore_2", "istore_3", "lstore_0", "lstore_1",
    "lstore_2", "lstore_3", "fstore_0", "fstore_1", "fstore_2", "fstore_3",
    "dstore_0", "dstore_1", "dstore_2", "dstore_3", "astore_0", "astore_1",
    "astore_2", "astore_3", "iastore", "lastore", "fastore", "dastore",
    "aastore", "bastore", "castore", "sastore", "pop", "pop2", "dup",
    "dup_x1", "dup_x2", "dup2", "dup2_x1", "dup2_x2", "swap", "iadd", "ladd",
    "fadd", "dadd", "isub", "lsub", "fsub", "dsub", "imul", "lmul", "fmul",
    "dmul", "idiv", "ldiv", "fdiv", "ddiv", "irem", "lrem", "frem", "drem",
    "ineg", "lneg", "fneg", "dneg", "ishl", "lshl", "ishr", "lshr", "iushr",
    "lushr", "iand", "land", "ior", "lor", "ixor", "lxor", "iinc", "i2l",
    "i2f", "i2d", "l2i", "l2f", "l2d", "f2i", "f2l", "f2d", "d2i", "d2l",
    "d2f", "i2b", "i2c", "i2s", "lcmp", "fcmpl", "fcmpg", "dcmpl", "dcmpg",
    "ifeq", "ifne", "iflt", "ifge", "ifgt", "ifle", "if_icmpeq", "if_icmpne",
    "if_icmplt", "if_icmpge", "if_icmpgt", "if_icmple", "if_acmpeq",
    "if_acmpne", "goto", "jsr", "ret", "tableswitch", "lookupswitch",
    "ireturn", "lreturn", "freturn", "dreturn", "areturn", "return",
    "getstatic", "putstatic", "getfield", "putfield", "invokevirtual",
    "invokespecial", "invokestatic", "invokeinterface", "invokedynamic",
    "new", "newarray", "anewarray", "arraylength", "athrow", "checkcast",
    "instanceof", "monitorenter", "monitorexit", "wide", "multianewarray",
    "ifnull", "ifnonnull", "goto_w", "jsr_w",
];

/// Net operand stack effect of a simple (no-operand-dependent) opcode
///
/// Opcodes whose effect depends on a descriptor in the constant pool (field
/// accesses, invocations) or on an unresolved operand return `None`.
#[rustfmt::skip]
pub fn stack_delta(opcode: u8) -> Option<i32> {
    let delta = match opcode {
        NOP => 0,
        ACONST_NULL..=ICONST_5 => 1,
        LCONST_0 | LCONST_1 => 2,
        FCONST_0..=FCONST_2 => 1,
        DCONST_0 | DCONST_1 => 2,
        BIPUSH | SIPUSH => 1,
        LDC | LDC_W => 1,
        LDC2_W => 2,
        ILOAD | FLOAD | ALOAD => 1,
        LLOAD | DLOAD => 2,
        26..=29 | 34..=37 | 42..=45 => 1, // iload_<n>, fload_<n>, aload_<n>
        30..=33 | 38..=41 => 2,        // lload_<n>, dload_<n>
        46 | 48 | 50..=53 => -1,       // iaload, faload, aaload, baload, caload, saload
        47 | 49 => 0,                  // laload, daload
        ISTORE | FSTORE | ASTORE => -1,
        LSTORE | DSTORE => -2,
        59..=62 | 67..=70 | 75..=78 => -1, // istore_<n>, fstore_<n>, astore_<n>
        63..=66 | 71..=74 => -2,       // lstore_<n>, dstore_<n>
        79 | 81 | 83..=86 => -3,       // iastore, fastore, aastore, bastore, castore, sastore
        80 | 82 => -4,                 // lastore, dastore
        POP => -1,
        POP2 => -2,
        DUP => 1,
        DUP_X1 | DUP_X2 => 1,
        DUP2 | DUP2_X1 | DUP2_X2 => 2,
        SWAP => 0,
        // Binary arithmetic: int/float forms are even opcodes, long/double odd
        96..=115 if opcode % 2 == 0 => -1,
        96..=115 => -2,
        116..=119 => 0,                // ineg..dneg
        120..=125 => -1,               // shifts (the shift amount is always an int)
        126..=131 if opcode % 2 == 0 => -1, // iand, ior, ixor
        126..=131 => -2,               // land, lor, lxor
        IINC => 0,
        133 | 135 | 140 | 141 => 1,    // i2l, i2d, f2l, f2d
        136 | 137 | 142 | 144 => -1,   // l2i, l2f, d2i, d2f
        134 | 138 | 139 | 143 => 0,    // i2f, l2d, f2i, d2l
        145..=147 => 0,                // i2b, i2c, i2s
        148 => -3,                     // lcmp
        149 | 150 => -1,               // fcmpl, fcmpg
        151 | 152 => -3,               // dcmpl, dcmpg
        IFEQ..=IFLE => -1,
        IF_ICMPEQ..=IF_ACMPNE => -2,
        GOTO => 0,
        JSR => 1,
        RET => 0,
        TABLESWITCH | LOOKUPSWITCH => -1,
        IRETURN | FRETURN | ARETURN => -1,
        LRETURN | DRETURN => -2,
        RETURN => 0,
        NEW => 1,
        NEWARRAY | ANEWARRAY => 0,
        ARRAYLENGTH => 0,
        ATHROW => -1,
        CHECKCAST | INSTANCEOF => 0,
        MONITORENTER | MONITOREXIT => -1,
        IFNULL | IFNONNULL => -1,
        GOTO_W => 0,
        JSR_W => 1,
        _ => return None,
    };
    Some(delta)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names_match_values() {
        assert_eq!(name(NOP), Some("nop"));
        assert_eq!(name(LDC2_W), Some("ldc2_w"));
        assert_eq!(name(IINC), Some("iinc"));
        assert_eq!(name(TABLESWITCH), Some("tableswitch"));
        assert_eq!(name(JSR_W), Some("jsr_w"));
        assert_eq!(name(202), None);
    }

    #[test]
    fn stack_deltas() {
        assert_eq!(stack_delta(DUP), Some(1));
        assert_eq!(stack_delta(LCONST_0), Some(2));
        assert_eq!(stack_delta(96), Some(-1)); // iadd
        assert_eq!(stack_delta(97), Some(-2)); // ladd
        assert_eq!(stack_delta(136), Some(-1)); // l2i
        assert_eq!(stack_delta(IF_ICMPEQ), Some(-2));
        assert_eq!(stack_delta(LOOKUPSWITCH), Some(-1));
        assert_eq!(stack_delta(GETFIELD), None);
        assert_eq!(stack_delta(INVOKEVIRTUAL), None);
    }

    #[test]
    fn fast_form_deltas_match_their_kinds() {
        assert_eq!(stack_delta(26), Some(1)); // iload_0
        assert_eq!(stack_delta(30), Some(2)); // lload_0
        assert_eq!(stack_delta(34), Some(1)); // fload_0
        assert_eq!(stack_delta(38), Some(2)); // dload_0
        assert_eq!(stack_delta(41), Some(2)); // dload_3
        assert_eq!(stack_delta(42), Some(1)); // aload_0
        assert_eq!(stack_delta(59), Some(-1)); // istore_0
        assert_eq!(stack_delta(63), Some(-2)); // lstore_0
        assert_eq!(stack_delta(67), Some(-1)); // fstore_0
        assert_eq!(stack_delta(71), Some(-2)); // dstore_0
        assert_eq!(stack_delta(74), Some(-2)); // dstore_3
        assert_eq!(stack_delta(75), Some(-1)); // astore_0
    }
}
