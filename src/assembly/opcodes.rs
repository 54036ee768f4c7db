//! JVM opcode byte constants and the static instruction table (JVMS §6.5).
//!
//! Every opcode is named after its mnemonic in upper case (e.g. [`INVOKESTATIC`] = `0xB8`).
//! [`INSTRUCTIONS`] maps each opcode byte to its [`JvmInstruction`] metadata: mnemonic,
//! operand encoding, control-flow class and stack effect. Stack effects are counted in
//! slots, so `long` and `double` values count twice.
#![allow(missing_docs)]

use crate::assembly::instruction::{FlowType, OperandType, StackEffect};

// Constants
pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_M1: u8 = 0x02;
pub const ICONST_0: u8 = 0x03;
pub const ICONST_1: u8 = 0x04;
pub const ICONST_2: u8 = 0x05;
pub const ICONST_3: u8 = 0x06;
pub const ICONST_4: u8 = 0x07;
pub const ICONST_5: u8 = 0x08;
pub const LCONST_0: u8 = 0x09;
pub const LCONST_1: u8 = 0x0A;
pub const FCONST_0: u8 = 0x0B;
pub const FCONST_1: u8 = 0x0C;
pub const FCONST_2: u8 = 0x0D;
pub const DCONST_0: u8 = 0x0E;
pub const DCONST_1: u8 = 0x0F;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;

// Loads
pub const ILOAD: u8 = 0x15;
pub const LLOAD: u8 = 0x16;
pub const FLOAD: u8 = 0x17;
pub const DLOAD: u8 = 0x18;
pub const ALOAD: u8 = 0x19;
pub const ILOAD_0: u8 = 0x1A;
pub const LLOAD_0: u8 = 0x1E;
pub const FLOAD_0: u8 = 0x22;
pub const DLOAD_0: u8 = 0x26;
pub const ALOAD_0: u8 = 0x2A;
pub const ALOAD_1: u8 = 0x2B;
pub const ALOAD_3: u8 = 0x2D;
pub const IALOAD: u8 = 0x2E;
pub const LALOAD: u8 = 0x2F;
pub const FALOAD: u8 = 0x30;
pub const DALOAD: u8 = 0x31;
pub const AALOAD: u8 = 0x32;
pub const BALOAD: u8 = 0x33;
pub const CALOAD: u8 = 0x34;
pub const SALOAD: u8 = 0x35;

// Stores
pub const ISTORE: u8 = 0x36;
pub const LSTORE: u8 = 0x37;
pub const FSTORE: u8 = 0x38;
pub const DSTORE: u8 = 0x39;
pub const ASTORE: u8 = 0x3A;
pub const ISTORE_0: u8 = 0x3B;
pub const LSTORE_0: u8 = 0x3F;
pub const FSTORE_0: u8 = 0x43;
pub const DSTORE_0: u8 = 0x47;
pub const ASTORE_0: u8 = 0x4B;
pub const ASTORE_3: u8 = 0x4E;
pub const IASTORE: u8 = 0x4F;
pub const LASTORE: u8 = 0x50;
pub const FASTORE: u8 = 0x51;
pub const DASTORE: u8 = 0x52;
pub const AASTORE: u8 = 0x53;
pub const BASTORE: u8 = 0x54;
pub const CASTORE: u8 = 0x55;
pub const SASTORE: u8 = 0x56;

// Stack
pub const POP: u8 = 0x57;
pub const POP2: u8 = 0x58;
pub const DUP: u8 = 0x59;
pub const DUP_X1: u8 = 0x5A;
pub const DUP_X2: u8 = 0x5B;
pub const DUP2: u8 = 0x5C;
pub const DUP2_X1: u8 = 0x5D;
pub const DUP2_X2: u8 = 0x5E;
pub const SWAP: u8 = 0x5F;

// Math
pub const IADD: u8 = 0x60;
pub const LADD: u8 = 0x61;
pub const FADD: u8 = 0x62;
pub const DADD: u8 = 0x63;
pub const ISUB: u8 = 0x64;
pub const LSUB: u8 = 0x65;
pub const FSUB: u8 = 0x66;
pub const DSUB: u8 = 0x67;
pub const IMUL: u8 = 0x68;
pub const LMUL: u8 = 0x69;
pub const FMUL: u8 = 0x6A;
pub const DMUL: u8 = 0x6B;
pub const IDIV: u8 = 0x6C;
pub const LDIV: u8 = 0x6D;
pub const FDIV: u8 = 0x6E;
pub const DDIV: u8 = 0x6F;
pub const IREM: u8 = 0x70;
pub const LREM: u8 = 0x71;
pub const FREM: u8 = 0x72;
pub const DREM: u8 = 0x73;
pub const INEG: u8 = 0x74;
pub const LNEG: u8 = 0x75;
pub const FNEG: u8 = 0x76;
pub const DNEG: u8 = 0x77;
pub const ISHL: u8 = 0x78;
pub const LSHL: u8 = 0x79;
pub const ISHR: u8 = 0x7A;
pub const LSHR: u8 = 0x7B;
pub const IUSHR: u8 = 0x7C;
pub const LUSHR: u8 = 0x7D;
pub const IAND: u8 = 0x7E;
pub const LAND: u8 = 0x7F;
pub const IOR: u8 = 0x80;
pub const LOR: u8 = 0x81;
pub const IXOR: u8 = 0x82;
pub const LXOR: u8 = 0x83;
pub const IINC: u8 = 0x84;

// Conversions
pub const I2L: u8 = 0x85;
pub const I2F: u8 = 0x86;
pub const I2D: u8 = 0x87;
pub const L2I: u8 = 0x88;
pub const L2F: u8 = 0x89;
pub const L2D: u8 = 0x8A;
pub const F2I: u8 = 0x8B;
pub const F2L: u8 = 0x8C;
pub const F2D: u8 = 0x8D;
pub const D2I: u8 = 0x8E;
pub const D2L: u8 = 0x8F;
pub const D2F: u8 = 0x90;
pub const I2B: u8 = 0x91;
pub const I2C: u8 = 0x92;
pub const I2S: u8 = 0x93;

// Comparisons
pub const LCMP: u8 = 0x94;
pub const FCMPL: u8 = 0x95;
pub const FCMPG: u8 = 0x96;
pub const DCMPL: u8 = 0x97;
pub const DCMPG: u8 = 0x98;
pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9A;
pub const IFLT: u8 = 0x9B;
pub const IFGE: u8 = 0x9C;
pub const IFGT: u8 = 0x9D;
pub const IFLE: u8 = 0x9E;
pub const IF_ICMPEQ: u8 = 0x9F;
pub const IF_ICMPNE: u8 = 0xA0;
pub const IF_ICMPLT: u8 = 0xA1;
pub const IF_ICMPGE: u8 = 0xA2;
pub const IF_ICMPGT: u8 = 0xA3;
pub const IF_ICMPLE: u8 = 0xA4;
pub const IF_ACMPEQ: u8 = 0xA5;
pub const IF_ACMPNE: u8 = 0xA6;

// Control
pub const GOTO: u8 = 0xA7;
pub const JSR: u8 = 0xA8;
pub const RET: u8 = 0xA9;
pub const TABLESWITCH: u8 = 0xAA;
pub const LOOKUPSWITCH: u8 = 0xAB;
pub const IRETURN: u8 = 0xAC;
pub const LRETURN: u8 = 0xAD;
pub const FRETURN: u8 = 0xAE;
pub const DRETURN: u8 = 0xAF;
pub const ARETURN: u8 = 0xB0;
pub const RETURN: u8 = 0xB1;

// References
pub const GETSTATIC: u8 = 0xB2;
pub const PUTSTATIC: u8 = 0xB3;
pub const GETFIELD: u8 = 0xB4;
pub const PUTFIELD: u8 = 0xB5;
pub const INVOKEVIRTUAL: u8 = 0xB6;
pub const INVOKESPECIAL: u8 = 0xB7;
pub const INVOKESTATIC: u8 = 0xB8;
pub const INVOKEINTERFACE: u8 = 0xB9;
pub const INVOKEDYNAMIC: u8 = 0xBA;
pub const NEW: u8 = 0xBB;
pub const NEWARRAY: u8 = 0xBC;
pub const ANEWARRAY: u8 = 0xBD;
pub const ARRAYLENGTH: u8 = 0xBE;
pub const ATHROW: u8 = 0xBF;
pub const CHECKCAST: u8 = 0xC0;
pub const INSTANCEOF: u8 = 0xC1;
pub const MONITORENTER: u8 = 0xC2;
pub const MONITOREXIT: u8 = 0xC3;

// Extended
pub const WIDE: u8 = 0xC4;
pub const MULTIANEWARRAY: u8 = 0xC5;
pub const IFNULL: u8 = 0xC6;
pub const IFNONNULL: u8 = 0xC7;
pub const GOTO_W: u8 = 0xC8;
pub const JSR_W: u8 = 0xC9;

/// `newarray` element type codes
pub const T_BOOLEAN: u8 = 4;
pub const T_CHAR: u8 = 5;
pub const T_FLOAT: u8 = 6;
pub const T_DOUBLE: u8 = 7;
pub const T_BYTE: u8 = 8;
pub const T_SHORT: u8 = 9;
pub const T_INT: u8 = 10;
pub const T_LONG: u8 = 11;

/// Static metadata of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JvmInstruction {
    /// Mnemonic, empty for unassigned opcodes
    pub mnemonic: &'static str,
    /// Operand encoding
    pub op_type: OperandType,
    /// Control-flow class
    pub flow: FlowType,
    /// Stack effect in slots
    pub stack: StackEffect,
}

impl JvmInstruction {
    /// `true` if the opcode is assigned
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        !self.mnemonic.is_empty()
    }
}

const UNASSIGNED: JvmInstruction = JvmInstruction {
    mnemonic: "",
    op_type: OperandType::None,
    flow: FlowType::Sequential,
    stack: StackEffect::Fixed { pops: 0, pushes: 0 },
};

const fn op(mnemonic: &'static str, op_type: OperandType, pops: u8, pushes: u8) -> JvmInstruction {
    JvmInstruction {
        mnemonic,
        op_type,
        flow: FlowType::Sequential,
        stack: StackEffect::Fixed { pops, pushes },
    }
}

const fn simple(mnemonic: &'static str, pops: u8, pushes: u8) -> JvmInstruction {
    op(mnemonic, OperandType::None, pops, pushes)
}

const fn flow(
    mnemonic: &'static str,
    op_type: OperandType,
    flow: FlowType,
    pops: u8,
    pushes: u8,
) -> JvmInstruction {
    JvmInstruction {
        mnemonic,
        op_type,
        flow,
        stack: StackEffect::Fixed { pops, pushes },
    }
}

const fn variable(mnemonic: &'static str, op_type: OperandType, flow: FlowType) -> JvmInstruction {
    JvmInstruction {
        mnemonic,
        op_type,
        flow,
        stack: StackEffect::Variable,
    }
}

const fn describe(opcode: u8) -> JvmInstruction {
    use FlowType::{Call, ConditionalBranch, Return, Sequential, Subroutine, SubroutineReturn, Switch, Throw, UnconditionalBranch};
    use OperandType as O;

    match opcode {
        NOP => simple("nop", 0, 0),
        ACONST_NULL => simple("aconst_null", 0, 1),
        0x02 => simple("iconst_m1", 0, 1),
        0x03 => simple("iconst_0", 0, 1),
        0x04 => simple("iconst_1", 0, 1),
        0x05 => simple("iconst_2", 0, 1),
        0x06 => simple("iconst_3", 0, 1),
        0x07 => simple("iconst_4", 0, 1),
        0x08 => simple("iconst_5", 0, 1),
        0x09 => simple("lconst_0", 0, 2),
        0x0A => simple("lconst_1", 0, 2),
        0x0B => simple("fconst_0", 0, 1),
        0x0C => simple("fconst_1", 0, 1),
        0x0D => simple("fconst_2", 0, 1),
        0x0E => simple("dconst_0", 0, 2),
        0x0F => simple("dconst_1", 0, 2),
        BIPUSH => op("bipush", O::Byte, 0, 1),
        SIPUSH => op("sipush", O::Short, 0, 1),
        LDC => op("ldc", O::ConstantByte, 0, 1),
        LDC_W => op("ldc_w", O::Constant, 0, 1),
        LDC2_W => op("ldc2_w", O::Constant, 0, 2),

        ILOAD => op("iload", O::Local, 0, 1),
        LLOAD => op("lload", O::Local, 0, 2),
        FLOAD => op("fload", O::Local, 0, 1),
        DLOAD => op("dload", O::Local, 0, 2),
        ALOAD => op("aload", O::Local, 0, 1),
        0x1A => simple("iload_0", 0, 1),
        0x1B => simple("iload_1", 0, 1),
        0x1C => simple("iload_2", 0, 1),
        0x1D => simple("iload_3", 0, 1),
        0x1E => simple("lload_0", 0, 2),
        0x1F => simple("lload_1", 0, 2),
        0x20 => simple("lload_2", 0, 2),
        0x21 => simple("lload_3", 0, 2),
        0x22 => simple("fload_0", 0, 1),
        0x23 => simple("fload_1", 0, 1),
        0x24 => simple("fload_2", 0, 1),
        0x25 => simple("fload_3", 0, 1),
        0x26 => simple("dload_0", 0, 2),
        0x27 => simple("dload_1", 0, 2),
        0x28 => simple("dload_2", 0, 2),
        0x29 => simple("dload_3", 0, 2),
        0x2A => simple("aload_0", 0, 1),
        0x2B => simple("aload_1", 0, 1),
        0x2C => simple("aload_2", 0, 1),
        0x2D => simple("aload_3", 0, 1),
        IALOAD => simple("iaload", 2, 1),
        LALOAD => simple("laload", 2, 2),
        FALOAD => simple("faload", 2, 1),
        DALOAD => simple("daload", 2, 2),
        AALOAD => simple("aaload", 2, 1),
        BALOAD => simple("baload", 2, 1),
        CALOAD => simple("caload", 2, 1),
        SALOAD => simple("saload", 2, 1),

        ISTORE => op("istore", O::Local, 1, 0),
        LSTORE => op("lstore", O::Local, 2, 0),
        FSTORE => op("fstore", O::Local, 1, 0),
        DSTORE => op("dstore", O::Local, 2, 0),
        ASTORE => op("astore", O::Local, 1, 0),
        0x3B => simple("istore_0", 1, 0),
        0x3C => simple("istore_1", 1, 0),
        0x3D => simple("istore_2", 1, 0),
        0x3E => simple("istore_3", 1, 0),
        0x3F => simple("lstore_0", 2, 0),
        0x40 => simple("lstore_1", 2, 0),
        0x41 => simple("lstore_2", 2, 0),
        0x42 => simple("lstore_3", 2, 0),
        0x43 => simple("fstore_0", 1, 0),
        0x44 => simple("fstore_1", 1, 0),
        0x45 => simple("fstore_2", 1, 0),
        0x46 => simple("fstore_3", 1, 0),
        0x47 => simple("dstore_0", 2, 0),
        0x48 => simple("dstore_1", 2, 0),
        0x49 => simple("dstore_2", 2, 0),
        0x4A => simple("dstore_3", 2, 0),
        0x4B => simple("astore_0", 1, 0),
        0x4C => simple("astore_1", 1, 0),
        0x4D => simple("astore_2", 1, 0),
        0x4E => simple("astore_3", 1, 0),
        IASTORE => simple("iastore", 3, 0),
        LASTORE => simple("lastore", 4, 0),
        FASTORE => simple("fastore", 3, 0),
        DASTORE => simple("dastore", 4, 0),
        AASTORE => simple("aastore", 3, 0),
        BASTORE => simple("bastore", 3, 0),
        CASTORE => simple("castore", 3, 0),
        SASTORE => simple("sastore", 3, 0),

        POP => simple("pop", 1, 0),
        POP2 => simple("pop2", 2, 0),
        DUP => simple("dup", 1, 2),
        DUP_X1 => simple("dup_x1", 2, 3),
        DUP_X2 => simple("dup_x2", 3, 4),
        DUP2 => simple("dup2", 2, 4),
        DUP2_X1 => simple("dup2_x1", 3, 5),
        DUP2_X2 => simple("dup2_x2", 4, 6),
        SWAP => simple("swap", 2, 2),

        IADD => simple("iadd", 2, 1),
        LADD => simple("ladd", 4, 2),
        FADD => simple("fadd", 2, 1),
        DADD => simple("dadd", 4, 2),
        ISUB => simple("isub", 2, 1),
        LSUB => simple("lsub", 4, 2),
        FSUB => simple("fsub", 2, 1),
        DSUB => simple("dsub", 4, 2),
        IMUL => simple("imul", 2, 1),
        LMUL => simple("lmul", 4, 2),
        FMUL => simple("fmul", 2, 1),
        DMUL => simple("dmul", 4, 2),
        IDIV => simple("idiv", 2, 1),
        LDIV => simple("ldiv", 4, 2),
        FDIV => simple("fdiv", 2, 1),
        DDIV => simple("ddiv", 4, 2),
        IREM => simple("irem", 2, 1),
        LREM => simple("lrem", 4, 2),
        FREM => simple("frem", 2, 1),
        DREM => simple("drem", 4, 2),
        INEG => simple("ineg", 1, 1),
        LNEG => simple("lneg", 2, 2),
        FNEG => simple("fneg", 1, 1),
        DNEG => simple("dneg", 2, 2),
        ISHL => simple("ishl", 2, 1),
        LSHL => simple("lshl", 3, 2),
        ISHR => simple("ishr", 2, 1),
        LSHR => simple("lshr", 3, 2),
        IUSHR => simple("iushr", 2, 1),
        LUSHR => simple("lushr", 3, 2),
        IAND => simple("iand", 2, 1),
        LAND => simple("land", 4, 2),
        IOR => simple("ior", 2, 1),
        LOR => simple("lor", 4, 2),
        IXOR => simple("ixor", 2, 1),
        LXOR => simple("lxor", 4, 2),
        IINC => op("iinc", O::Iinc, 0, 0),

        I2L => simple("i2l", 1, 2),
        I2F => simple("i2f", 1, 1),
        I2D => simple("i2d", 1, 2),
        L2I => simple("l2i", 2, 1),
        L2F => simple("l2f", 2, 1),
        L2D => simple("l2d", 2, 2),
        F2I => simple("f2i", 1, 1),
        F2L => simple("f2l", 1, 2),
        F2D => simple("f2d", 1, 2),
        D2I => simple("d2i", 2, 1),
        D2L => simple("d2l", 2, 2),
        D2F => simple("d2f", 2, 1),
        I2B => simple("i2b", 1, 1),
        I2C => simple("i2c", 1, 1),
        I2S => simple("i2s", 1, 1),

        LCMP => simple("lcmp", 4, 1),
        FCMPL => simple("fcmpl", 2, 1),
        FCMPG => simple("fcmpg", 2, 1),
        DCMPL => simple("dcmpl", 4, 1),
        DCMPG => simple("dcmpg", 4, 1),
        IFEQ => flow("ifeq", O::Branch16, ConditionalBranch, 1, 0),
        IFNE => flow("ifne", O::Branch16, ConditionalBranch, 1, 0),
        IFLT => flow("iflt", O::Branch16, ConditionalBranch, 1, 0),
        IFGE => flow("ifge", O::Branch16, ConditionalBranch, 1, 0),
        IFGT => flow("ifgt", O::Branch16, ConditionalBranch, 1, 0),
        IFLE => flow("ifle", O::Branch16, ConditionalBranch, 1, 0),
        IF_ICMPEQ => flow("if_icmpeq", O::Branch16, ConditionalBranch, 2, 0),
        IF_ICMPNE => flow("if_icmpne", O::Branch16, ConditionalBranch, 2, 0),
        IF_ICMPLT => flow("if_icmplt", O::Branch16, ConditionalBranch, 2, 0),
        IF_ICMPGE => flow("if_icmpge", O::Branch16, ConditionalBranch, 2, 0),
        IF_ICMPGT => flow("if_icmpgt", O::Branch16, ConditionalBranch, 2, 0),
        IF_ICMPLE => flow("if_icmple", O::Branch16, ConditionalBranch, 2, 0),
        IF_ACMPEQ => flow("if_acmpeq", O::Branch16, ConditionalBranch, 2, 0),
        IF_ACMPNE => flow("if_acmpne", O::Branch16, ConditionalBranch, 2, 0),

        GOTO => flow("goto", O::Branch16, UnconditionalBranch, 0, 0),
        JSR => flow("jsr", O::Branch16, Subroutine, 0, 1),
        RET => flow("ret", O::Local, SubroutineReturn, 0, 0),
        TABLESWITCH => flow("tableswitch", O::TableSwitch, Switch, 1, 0),
        LOOKUPSWITCH => flow("lookupswitch", O::LookupSwitch, Switch, 1, 0),
        IRETURN => flow("ireturn", O::None, Return, 1, 0),
        LRETURN => flow("lreturn", O::None, Return, 2, 0),
        FRETURN => flow("freturn", O::None, Return, 1, 0),
        DRETURN => flow("dreturn", O::None, Return, 2, 0),
        ARETURN => flow("areturn", O::None, Return, 1, 0),
        RETURN => flow("return", O::None, Return, 0, 0),

        GETSTATIC => variable("getstatic", O::Constant, Sequential),
        PUTSTATIC => variable("putstatic", O::Constant, Sequential),
        GETFIELD => variable("getfield", O::Constant, Sequential),
        PUTFIELD => variable("putfield", O::Constant, Sequential),
        INVOKEVIRTUAL => variable("invokevirtual", O::Constant, Call),
        INVOKESPECIAL => variable("invokespecial", O::Constant, Call),
        INVOKESTATIC => variable("invokestatic", O::Constant, Call),
        INVOKEINTERFACE => variable("invokeinterface", O::InvokeInterface, Call),
        INVOKEDYNAMIC => variable("invokedynamic", O::InvokeDynamic, Call),
        NEW => op("new", O::Constant, 0, 1),
        NEWARRAY => op("newarray", O::NewArray, 1, 1),
        ANEWARRAY => op("anewarray", O::Constant, 1, 1),
        ARRAYLENGTH => simple("arraylength", 1, 1),
        ATHROW => flow("athrow", O::None, Throw, 1, 0),
        CHECKCAST => op("checkcast", O::Constant, 1, 1),
        INSTANCEOF => op("instanceof", O::Constant, 1, 1),
        MONITORENTER => simple("monitorenter", 1, 0),
        MONITOREXIT => simple("monitorexit", 1, 0),

        WIDE => op("wide", O::Wide, 0, 0),
        MULTIANEWARRAY => variable("multianewarray", O::MultiANewArray, Sequential),
        IFNULL => flow("ifnull", O::Branch16, ConditionalBranch, 1, 0),
        IFNONNULL => flow("ifnonnull", O::Branch16, ConditionalBranch, 1, 0),
        GOTO_W => flow("goto_w", O::Branch32, UnconditionalBranch, 0, 0),
        JSR_W => flow("jsr_w", O::Branch32, Subroutine, 0, 1),

        _ => UNASSIGNED,
    }
}

const fn build_table() -> [JvmInstruction; 256] {
    let mut table = [UNASSIGNED; 256];
    let mut opcode = 0;
    while opcode < 256 {
        #[allow(clippy::cast_possible_truncation)]
        {
            table[opcode] = describe(opcode as u8);
        }
        opcode += 1;
    }
    table
}

/// Metadata for every opcode byte, indexed by opcode.
pub static INSTRUCTIONS: [JvmInstruction; 256] = build_table();

/// Look up an assigned opcode.
#[must_use]
pub fn instruction(opcode: u8) -> Option<&'static JvmInstruction> {
    let entry = &INSTRUCTIONS[opcode as usize];
    entry.is_valid().then_some(entry)
}

/// Shorthand opcode (`iload_0` style) for a long-form local access, if `index` fits.
#[must_use]
pub fn local_shorthand(opcode: u8, index: u16) -> Option<u8> {
    if index > 3 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let index = index as u8;
    match opcode {
        ILOAD..=ALOAD => Some(ILOAD_0 + (opcode - ILOAD) * 4 + index),
        ISTORE..=ASTORE => Some(ISTORE_0 + (opcode - ISTORE) * 4 + index),
        _ => None,
    }
}

/// Expand a shorthand local access back to `(long_form_opcode, index)`.
#[must_use]
pub fn expand_shorthand(opcode: u8) -> Option<(u8, u16)> {
    match opcode {
        ILOAD_0..=0x2D => {
            let relative = opcode - ILOAD_0;
            Some((ILOAD + relative / 4, u16::from(relative % 4)))
        }
        ISTORE_0..=ASTORE_3 => {
            let relative = opcode - ISTORE_0;
            Some((ISTORE + relative / 4, u16::from(relative % 4)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_constants() {
        assert_eq!(INSTRUCTIONS[INVOKESTATIC as usize].mnemonic, "invokestatic");
        assert_eq!(INSTRUCTIONS[ALOAD_0 as usize].mnemonic, "aload_0");
        assert_eq!(INSTRUCTIONS[ASTORE_3 as usize].mnemonic, "astore_3");
        assert_eq!(INSTRUCTIONS[JSR_W as usize].mnemonic, "jsr_w");
        assert!(instruction(0xCA).is_none());
        assert!(instruction(0xFF).is_none());
    }

    #[test]
    fn test_assigned_count() {
        let assigned = INSTRUCTIONS.iter().filter(|entry| entry.is_valid()).count();
        // 0x00..=0xC9
        assert_eq!(assigned, 202);
    }

    #[test]
    fn test_shorthand_round_trip() {
        for long_form in [ILOAD, LLOAD, FLOAD, DLOAD, ALOAD, ISTORE, LSTORE, FSTORE, DSTORE, ASTORE] {
            for index in 0..4 {
                let short = local_shorthand(long_form, index).unwrap();
                assert_eq!(expand_shorthand(short), Some((long_form, index)));
            }
            assert!(local_shorthand(long_form, 4).is_none());
        }
        assert_eq!(local_shorthand(ALOAD, 0), Some(ALOAD_0));
    }

    #[test]
    fn test_wide_values_count_two_slots() {
        assert_eq!(
            INSTRUCTIONS[LADD as usize].stack,
            StackEffect::Fixed { pops: 4, pushes: 2 }
        );
        assert_eq!(INSTRUCTIONS[GETFIELD as usize].stack, StackEffect::Variable);
    }
}
