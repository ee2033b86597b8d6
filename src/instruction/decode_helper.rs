//! Decoding helper functions.
//! Field layout, bit 0 being the LSB:
//!
//! | op type   | fields                                                    |
//! |-----------|-----------------------------------------------------------|
//! | RegImm    | Rd 8..4, ALU 12..9, reserved 15..13, Imm 31..16           |
//! | RegReg    | Rd 8..4, ALU 12..9, Rs 17..13, unused 31..18              |
//!
//! Reserved and unused bits must be zero, so every word that decodes
//! re-encodes to itself.
//! | LoadStore | Rd 8..4, MemMode 10..9, RMem 15..11, Imm 31..16           |
//! | Control   | RMem 8..4, CtrlFlag 12..9, CtrlMode 15..13, Imm 31..16    |

use super::Condition;
use super::MemMode;
use super::OpType;
use super::Operation;
use super::DATA_TYPE_INTEGER;
use crate::alu::ImmAluOp;
use crate::alu::RegAluOp;
use crate::error::ExecutionError;

fn field(raw: u32, low: u32, width: u32) -> u32 {
    (raw >> low) & ((1 << width) - 1)
}

fn place(value: u32, low: u32, width: u32) -> u32 {
    (value & ((1 << width) - 1)) << low
}

pub fn get_data_type(raw: u32) -> u32 {
    field(raw, 0, 2)
}

pub fn get_op_type(raw: u32) -> OpType {
    OpType::from_bits(field(raw, 2, 2))
}

pub fn get_rd(raw: u32) -> u8 {
    field(raw, 4, 5) as u8
}

pub fn get_alu(raw: u32) -> u32 {
    field(raw, 9, 4)
}

pub fn get_rs(raw: u32) -> u8 {
    field(raw, 13, 5) as u8
}

pub fn get_mem_mode(raw: u32) -> MemMode {
    MemMode::from_bits(field(raw, 9, 2))
}

pub fn get_mem_base(raw: u32) -> u8 {
    field(raw, 11, 5) as u8
}

pub fn get_ctrl_base(raw: u32) -> u8 {
    field(raw, 4, 5) as u8
}

pub fn get_ctrl_flag(raw: u32) -> u32 {
    field(raw, 9, 4)
}

pub fn get_ctrl_mode(raw: u32) -> u32 {
    field(raw, 13, 3)
}

pub fn get_imm(raw: u32) -> i16 {
    (raw >> 16) as u16 as i16
}

/// HLT is any control word on r0 with offset -1, whatever its condition bits
pub fn is_halt_word(raw: u32) -> bool {
    get_data_type(raw) == DATA_TYPE_INTEGER
        && get_op_type(raw) == OpType::Control
        && get_ctrl_base(raw) == 0
        && get_imm(raw) == -1
}

pub fn sign_extend(imm: i16) -> u32 {
    imm as i32 as u32
}

fn malformed(raw: u32, reason: &'static str) -> ExecutionError {
    ExecutionError::MalformedInstruction { raw, reason }
}

/// Decodes a raw word into its tagged operation
pub fn parse(raw: u32) -> Result<Operation, ExecutionError> {
    if get_data_type(raw) != DATA_TYPE_INTEGER {
        return Err(malformed(raw, "unsupported data type"));
    }

    let op_type = get_op_type(raw);
    match op_type {
        OpType::RegImm if field(raw, 13, 3) != 0 => {
            return Err(malformed(raw, "reserved bits set"));
        }
        OpType::RegReg if field(raw, 18, 14) != 0 => {
            return Err(malformed(raw, "unused bits set"));
        }
        _ => {}
    }

    Ok(match op_type {
        OpType::RegImm => Operation::RegImm {
            rd: get_rd(raw),
            alu: ImmAluOp::from_bits(get_alu(raw))
                .ok_or_else(|| malformed(raw, "undefined immediate ALU operation"))?,
            imm: get_imm(raw),
        },
        OpType::RegReg => Operation::RegReg {
            rd: get_rd(raw),
            alu: RegAluOp::from_bits(get_alu(raw))
                .ok_or_else(|| malformed(raw, "undefined register ALU operation"))?,
            rs: get_rs(raw),
        },
        OpType::LoadStore => Operation::LoadStore {
            rd: get_rd(raw),
            mode: get_mem_mode(raw),
            rmem: get_mem_base(raw),
            imm: get_imm(raw),
        },
        OpType::Control => Operation::Control {
            rmem: get_ctrl_base(raw),
            condition: Condition::from_fields(
                get_ctrl_mode(raw),
                get_ctrl_flag(raw),
            )
            .ok_or_else(|| malformed(raw, "undefined branch condition"))?,
            imm: get_imm(raw),
        },
    })
}

/// Encodes a tagged operation; reserved and unused bits are zero
pub fn assemble(operation: &Operation) -> u32 {
    let header = |op_type: OpType| {
        DATA_TYPE_INTEGER | place(op_type.bits(), 2, 2)
    };
    let imm_bits = |imm: i16| place(imm as u16 as u32, 16, 16);

    match *operation {
        Operation::RegImm { rd, alu, imm } => {
            header(OpType::RegImm)
                | place(rd as u32, 4, 5)
                | place(alu.bits(), 9, 4)
                | imm_bits(imm)
        }
        Operation::RegReg { rd, alu, rs } => {
            header(OpType::RegReg)
                | place(rd as u32, 4, 5)
                | place(alu.bits(), 9, 4)
                | place(rs as u32, 13, 5)
        }
        Operation::LoadStore { rd, mode, rmem, imm } => {
            header(OpType::LoadStore)
                | place(rd as u32, 4, 5)
                | place(mode.bits(), 9, 2)
                | place(rmem as u32, 11, 5)
                | imm_bits(imm)
        }
        Operation::Control { rmem, condition, imm } => {
            let (mode, flag) = condition.fields();
            header(OpType::Control)
                | place(rmem as u32, 4, 5)
                | place(flag, 9, 4)
                | place(mode, 13, 3)
                | imm_bits(imm)
        }
    }
}
