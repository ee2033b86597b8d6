//! Instruction representation

use std::fmt;

use crate::alu::FlagRegister;
use crate::alu::ImmAluOp;
use crate::alu::RegAluOp;
use crate::error::ExecutionError;
use crate::registers::register_name;

pub mod decode_helper;

/// Data type tag of the integer core
pub const DATA_TYPE_INTEGER: u32 = 0b01;

/// HLT: BUNC [r0 - 1]
pub const HALT: u32 = 0xFFFF_E00D;

/// Wrapped instruction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// Raw representation
    pub raw_inst: u32,
    /// Decoded operation
    pub operation: Operation,
}

impl Instruction {
    pub fn new(raw_inst: u32) -> Result<Self, ExecutionError> {
        let operation = decode_helper::parse(raw_inst)?;
        Ok(Self { raw_inst, operation })
    }

    pub fn op_type(&self) -> OpType {
        self.operation.op_type()
    }

    /// The halt sentinel is any control op on r0 with offset -1
    pub fn is_halt(&self) -> bool {
        decode_helper::is_halt_word(self.raw_inst)
    }
}

impl From<Operation> for Instruction {
    fn from(operation: Operation) -> Self {
        Self { raw_inst: operation.encode(), operation }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_halt() {
            return write!(f, "hlt");
        }
        fmt::Display::fmt(&self.operation, f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpType {
    RegImm,
    RegReg,
    LoadStore,
    Control,
}

impl OpType {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0b00 => OpType::RegImm,
            0b01 => OpType::RegReg,
            0b10 => OpType::LoadStore,
            _ => OpType::Control,
        }
    }

    pub fn bits(self) -> u32 {
        self as u32
    }
}

/// Tagged operation, one variant per op type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    RegImm { rd: u8, alu: ImmAluOp, imm: i16 },
    RegReg { rd: u8, alu: RegAluOp, rs: u8 },
    LoadStore { rd: u8, mode: MemMode, rmem: u8, imm: i16 },
    Control { rmem: u8, condition: Condition, imm: i16 },
}

impl Operation {
    pub fn op_type(&self) -> OpType {
        match self {
            Operation::RegImm { .. } => OpType::RegImm,
            Operation::RegReg { .. } => OpType::RegReg,
            Operation::LoadStore { .. } => OpType::LoadStore,
            Operation::Control { .. } => OpType::Control,
        }
    }

    pub fn encode(&self) -> u32 {
        decode_helper::assemble(self)
    }
}

fn fmt_address(f: &mut fmt::Formatter<'_>, base: u8, imm: i16) -> fmt::Result {
    let sign = if imm < 0 { '-' } else { '+' };
    write!(
        f,
        "[{} {} {}]",
        register_name(base),
        sign,
        (imm as i32).unsigned_abs()
    )
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Operation::RegImm { rd, alu, imm } => {
                write!(f, "{} {}, {}", alu.mnemonic(), register_name(rd), imm)
            }
            Operation::RegReg { rd, alu, rs } => write!(
                f,
                "{} {}, {}",
                alu.mnemonic(),
                register_name(rd),
                register_name(rs)
            ),
            Operation::LoadStore { rd, mode, rmem, imm } => match mode {
                MemMode::Push | MemMode::Pop => {
                    write!(f, "{} {}", mode.mnemonic(), register_name(rd))
                }
                MemMode::Ldw | MemMode::Stw => {
                    write!(f, "{} {}, ", mode.mnemonic(), register_name(rd))?;
                    fmt_address(f, rmem, imm)
                }
            },
            Operation::Control { rmem, condition, imm } => {
                write!(f, "{} ", condition.mnemonic())?;
                fmt_address(f, rmem, imm)
            }
        }
    }
}

/// Load/store addressing mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemMode {
    Ldw,
    Pop,
    Push,
    Stw,
}

impl MemMode {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0b00 => MemMode::Ldw,
            0b01 => MemMode::Pop,
            0b10 => MemMode::Push,
            _ => MemMode::Stw,
        }
    }

    pub fn bits(self) -> u32 {
        self as u32
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            MemMode::Ldw => "ldw",
            MemMode::Pop => "pop",
            MemMode::Push => "push",
            MemMode::Stw => "stw",
        }
    }

    /// Whether the loaded value is written back to Rd
    pub fn writes_rd(self) -> bool {
        matches!(self, MemMode::Ldw | MemMode::Pop)
    }

    pub fn uses_stack(self) -> bool {
        matches!(self, MemMode::Push | MemMode::Pop)
    }
}

/// Branch conditions, keyed by their (CtrlMode, CtrlFlag) encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Lu,
    Ae,
    A,
    Of,
    Nf,
    Unc,
    Call,
}

impl Condition {
    pub fn from_fields(mode: u32, flag: u32) -> Option<Self> {
        use Condition::*;
        Some(match (mode, flag) {
            (0b000, 0b0001) => Eq,
            (0b000, 0b0000) => Ne,
            (0b001, 0b0110) => Lt,
            (0b011, 0b0110) => Ge,
            (0b100, 0b1000) => Lu,
            (0b000, 0b1000) => Ae,
            (0b010, 0b1000) => A,
            (0b100, 0b0100) => Of,
            (0b000, 0b0100) => Nf,
            (0b111, 0b0000) => Unc,
            (0b111, 0b1111) => Call,
            _ => return None,
        })
    }

    /// Returns (CtrlMode, CtrlFlag)
    pub fn fields(self) -> (u32, u32) {
        use Condition::*;
        match self {
            Eq => (0b000, 0b0001),
            Ne => (0b000, 0b0000),
            Lt => (0b001, 0b0110),
            Ge => (0b011, 0b0110),
            Lu => (0b100, 0b1000),
            Ae => (0b000, 0b1000),
            A => (0b010, 0b1000),
            Of => (0b100, 0b0100),
            Nf => (0b000, 0b0100),
            Unc => (0b111, 0b0000),
            Call => (0b111, 0b1111),
        }
    }

    pub fn is_taken(self, flags: FlagRegister) -> bool {
        use Condition::*;
        match self {
            Eq => flags.zf(),
            Ne => !flags.zf(),
            Lt => flags.sf() != flags.ovf(),
            Ge => flags.sf() == flags.ovf(),
            Lu => flags.cf(),
            Ae => !flags.cf(),
            A => !flags.cf() && !flags.zf(),
            Of => flags.ovf(),
            Nf => !flags.ovf(),
            Unc | Call => true,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        use Condition::*;
        match self {
            Eq => "beq",
            Ne => "bne",
            Lt => "blt",
            Ge => "bge",
            Lu => "blu",
            Ae => "bae",
            A => "ba",
            Of => "bof",
            Nf => "bnf",
            Unc => "bunc",
            Call => "call",
        }
    }
}
