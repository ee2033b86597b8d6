//! ALU implementation

use std::fmt;

use crate::error::ExecutionError;

/// Carry flag
pub const CF: u32 = 0b1000;
/// Signed overflow flag
pub const OVF: u32 = 0b0100;
/// Sign flag
pub const SF: u32 = 0b0010;
/// Zero flag
pub const ZF: u32 = 0b0001;

/// The flag register consumed by control operations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlagRegister {
    bits: u32,
}

impl FlagRegister {
    pub fn new(bits: u32) -> Self {
        Self { bits: bits & (CF | OVF | SF | ZF) }
    }

    /// ZF and SF derived from a result, CF and OVF clear
    pub fn from_result(result: u32) -> Self {
        let mut flags = Self::default();
        flags.set(ZF, result == 0);
        flags.set(SF, result & 0x8000_0000 != 0);
        flags
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn get(&self, flag: u32) -> bool {
        self.bits & flag != 0
    }

    pub fn set(&mut self, flag: u32, on: bool) {
        if on {
            self.bits |= flag;
        } else {
            self.bits &= !flag;
        }
    }

    pub fn cf(&self) -> bool {
        self.get(CF)
    }

    pub fn ovf(&self) -> bool {
        self.get(OVF)
    }

    pub fn sf(&self) -> bool {
        self.get(SF)
    }

    pub fn zf(&self) -> bool {
        self.get(ZF)
    }
}

impl fmt::Display for FlagRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CF={} OVF={} SF={} ZF={}",
            self.cf() as u8,
            self.ovf() as u8,
            self.sf() as u8,
            self.zf() as u8
        )
    }
}

/// Register-immediate ALU operations, numbered as encoded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ImmAluOp {
    #[default]
    Add,
    Sub,
    Mul,
    And,
    Xor,
    Or,
    Not,
    Neg,
    Shr,
    Sar,
    Shl,
    Rol,
    Ldi,
    Ldx,
    Cmp,
}

impl ImmAluOp {
    pub fn from_bits(bits: u32) -> Option<Self> {
        use ImmAluOp::*;
        Some(match bits {
            0 => Add,
            1 => Sub,
            2 => Mul,
            3 => And,
            4 => Xor,
            5 => Or,
            6 => Not,
            7 => Neg,
            8 => Shr,
            9 => Sar,
            10 => Shl,
            11 => Rol,
            12 => Ldi,
            13 => Ldx,
            14 => Cmp,
            _ => return None,
        })
    }

    pub fn bits(self) -> u32 {
        self as u32
    }

    pub fn mnemonic(self) -> &'static str {
        use ImmAluOp::*;
        match self {
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            And => "and",
            Xor => "xor",
            Or => "or",
            Not => "not",
            Neg => "neg",
            Shr => "shr",
            Sar => "sar",
            Shl => "shl",
            Rol => "rol",
            Ldi => "ldi",
            Ldx => "ldx",
            Cmp => "cmp",
        }
    }
}

/// Register-register ALU operations, numbered as encoded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RegAluOp {
    #[default]
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Or,
    Xor,
    And,
    Not,
    Shl,
    Shr,
    Sar,
    Rol,
    Cmp,
    Cpy,
    Nsa,
}

impl RegAluOp {
    pub fn from_bits(bits: u32) -> Option<Self> {
        use RegAluOp::*;
        Some(match bits {
            0 => Add,
            1 => Sub,
            2 => Mul,
            3 => Div,
            4 => Rem,
            5 => Or,
            6 => Xor,
            7 => And,
            8 => Not,
            9 => Shl,
            10 => Shr,
            11 => Sar,
            12 => Rol,
            13 => Cmp,
            14 => Cpy,
            15 => Nsa,
            _ => return None,
        })
    }

    pub fn bits(self) -> u32 {
        self as u32
    }

    pub fn mnemonic(self) -> &'static str {
        use RegAluOp::*;
        match self {
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Rem => "rem",
            Or => "or",
            Xor => "xor",
            And => "and",
            Not => "not",
            Shl => "shl",
            Shr => "shr",
            Sar => "sar",
            Rol => "rol",
            Cmp => "cmp",
            Cpy => "cpy",
            Nsa => "nsa",
        }
    }
}

/// Outcome of one ALU evaluation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AluOutput {
    pub result: u32,
    /// New flag value, if the operation defines one
    pub flags: Option<FlagRegister>,
    /// Whether the result is written to Rd
    pub write_back: bool,
}

impl AluOutput {
    fn flagged((result, flags): (u32, FlagRegister)) -> Self {
        Self { result, flags: Some(flags), write_back: true }
    }

    fn plain(result: u32) -> Self {
        Self { result, flags: None, write_back: true }
    }

    fn compare(op1: u32, (_, flags): (u32, FlagRegister)) -> Self {
        Self { result: op1, flags: Some(flags), write_back: false }
    }
}

/// Performs a register-immediate operation, op1 being the old Rd value
pub fn alu_imm(op: ImmAluOp, op1: u32, op2: u32) -> AluOutput {
    use ImmAluOp::*;
    match op {
        Add => AluOutput::flagged(add(op1, op2)),
        Sub => AluOutput::flagged(sub(op1, op2)),
        Mul => AluOutput::flagged(mul(op1, op2)),
        And => AluOutput::flagged(logic(op1 & op2)),
        Xor => AluOutput::flagged(logic(op1 ^ op2)),
        Or => AluOutput::flagged(logic(op1 | op2)),
        Not => AluOutput::flagged(logic(!op1)),
        Neg => AluOutput::flagged(sub(0, op1)),
        Shr => AluOutput::flagged(shr(op1, op2)),
        Sar => AluOutput::flagged(sar(op1, op2)),
        Shl => AluOutput::flagged(shl(op1, op2)),
        Rol => AluOutput::flagged(rol(op1, op2)),
        Ldi => AluOutput::plain(op2 & 0xFFFF),
        Ldx => AluOutput::plain(op2),
        Cmp => AluOutput::compare(op1, sub(op1, op2)),
    }
}

/// Performs a register-register operation, op2 being the Rs value
pub fn alu_reg(
    op: RegAluOp,
    op1: u32,
    op2: u32,
) -> Result<AluOutput, ExecutionError> {
    use RegAluOp::*;
    Ok(match op {
        Add => AluOutput::flagged(add(op1, op2)),
        Sub => AluOutput::flagged(sub(op1, op2)),
        Mul => AluOutput::flagged(mul(op1, op2)),
        Div => {
            let quotient = op1
                .checked_div(op2)
                .ok_or(ExecutionError::DivisionByZero)?;
            AluOutput::flagged(logic(quotient))
        }
        Rem => {
            let remainder = op1
                .checked_rem(op2)
                .ok_or(ExecutionError::DivisionByZero)?;
            AluOutput::flagged(logic(remainder))
        }
        Or => AluOutput::flagged(logic(op1 | op2)),
        Xor => AluOutput::flagged(logic(op1 ^ op2)),
        And => AluOutput::flagged(logic(op1 & op2)),
        Not => AluOutput::flagged(logic(!op1)),
        Shl => AluOutput::flagged(shl(op1, op2)),
        Shr => AluOutput::flagged(shr(op1, op2)),
        Sar => AluOutput::flagged(sar(op1, op2)),
        Rol => AluOutput::flagged(rol(op1, op2)),
        Cmp => AluOutput::compare(op1, sub(op1, op2)),
        Cpy => AluOutput::plain(op2),
        Nsa => AluOutput::plain(op2.count_ones()),
    })
}

fn add(augend: u32, addend: u32) -> (u32, FlagRegister) {
    let (sum, carry) = augend.overflowing_add(addend);
    let mut flags = FlagRegister::from_result(sum);
    flags.set(CF, carry);
    flags.set(OVF, ((augend ^ sum) & (addend ^ sum)) >> 31 == 1);
    (sum, flags)
}

fn sub(minuend: u32, subtrahend: u32) -> (u32, FlagRegister) {
    let (diff, borrow) = minuend.overflowing_sub(subtrahend);
    let mut flags = FlagRegister::from_result(diff);
    flags.set(CF, borrow);
    flags.set(OVF, ((minuend ^ subtrahend) & (minuend ^ diff)) >> 31 == 1);
    (diff, flags)
}

fn mul(multiplicand: u32, multiplier: u32) -> (u32, FlagRegister) {
    let full = multiplicand as u64 * multiplier as u64;
    let lo = full as u32;
    let hi = (full >> 32) as u32;
    let mut flags = FlagRegister::from_result(lo);
    flags.set(ZF, full == 0);
    flags.set(CF, hi != 0);
    flags.set(OVF, lo as i32 as i64 != full as i64);
    (lo, flags)
}

fn logic(result: u32) -> (u32, FlagRegister) {
    (result, FlagRegister::from_result(result))
}

fn shifted(result: u32, carry: bool) -> (u32, FlagRegister) {
    let mut flags = FlagRegister::from_result(result);
    flags.set(CF, carry);
    (result, flags)
}

fn shl(value: u32, amount: u32) -> (u32, FlagRegister) {
    let amount = amount % 32;
    let carry = amount != 0 && (value >> (32 - amount)) & 1 == 1;
    shifted(value << amount, carry)
}

fn shr(value: u32, amount: u32) -> (u32, FlagRegister) {
    let amount = amount % 32;
    let carry = amount != 0 && (value >> (amount - 1)) & 1 == 1;
    shifted(value >> amount, carry)
}

fn sar(value: u32, amount: u32) -> (u32, FlagRegister) {
    let amount = amount % 32;
    let carry = amount != 0 && (value >> (amount - 1)) & 1 == 1;
    shifted(((value as i32) >> amount) as u32, carry)
}

// Negative amounts rotate right
fn rol(value: u32, amount: u32) -> (u32, FlagRegister) {
    let amount = (amount as i32).rem_euclid(32) as u32;
    logic(value.rotate_left(amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_flags() {
        let out = alu_imm(ImmAluOp::Add, 0xFFFF_FFFF, 1);
        assert_eq!(out.result, 0);
        assert_eq!(out.flags, Some(FlagRegister::new(CF | ZF)));

        let out = alu_imm(ImmAluOp::Add, 0x7FFF_FFFF, 1);
        assert_eq!(out.result, 0x8000_0000);
        assert_eq!(out.flags, Some(FlagRegister::new(OVF | SF)));

        let out = alu_reg(RegAluOp::Add, 16, 32).unwrap();
        assert_eq!(out.result, 48);
        assert_eq!(out.flags, Some(FlagRegister::default()));
    }

    #[test]
    fn test_sub_and_cmp_flags() {
        let out = alu_imm(ImmAluOp::Sub, 1, 2);
        assert_eq!(out.result, 0xFFFF_FFFF);
        assert_eq!(out.flags, Some(FlagRegister::new(CF | SF)));

        let out = alu_imm(ImmAluOp::Sub, 0x8000_0000, 1);
        assert_eq!(out.flags, Some(FlagRegister::new(OVF)));

        let out = alu_imm(ImmAluOp::Cmp, 512, 0x200);
        assert_eq!(out.result, 512);
        assert_eq!(out.write_back, false);
        assert_eq!(out.flags, Some(FlagRegister::new(ZF)));
    }

    #[test]
    fn test_mul_flags() {
        let out = alu_reg(RegAluOp::Mul, 16, 32).unwrap();
        assert_eq!(out.result, 512);
        assert_eq!(out.flags, Some(FlagRegister::default()));

        let out = alu_imm(ImmAluOp::Mul, 0x1_0000, 0x1_0000);
        assert_eq!(out.result, 0);
        assert_eq!(out.flags, Some(FlagRegister::new(CF | OVF)));

        let out = alu_imm(ImmAluOp::Mul, 0, 1234);
        assert_eq!(out.flags, Some(FlagRegister::new(ZF)));
    }

    #[test]
    fn test_shifts_modulo_32() {
        let out = alu_imm(ImmAluOp::Shl, 0x8000_0001, 1);
        assert_eq!(out.result, 2);
        assert!(out.flags.unwrap().cf());

        // 33 % 32 == 1
        let out = alu_imm(ImmAluOp::Shr, 0b11, 33);
        assert_eq!(out.result, 1);
        assert!(out.flags.unwrap().cf());

        let out = alu_imm(ImmAluOp::Sar, 0x8000_0000, 4);
        assert_eq!(out.result, 0xF800_0000);
        assert!(out.flags.unwrap().sf());
        assert!(!out.flags.unwrap().cf());

        let out = alu_reg(RegAluOp::Shl, 5, 0).unwrap();
        assert_eq!(out.result, 5);
        assert!(!out.flags.unwrap().cf());
    }

    #[test]
    fn test_rotate() {
        let out = alu_imm(ImmAluOp::Rol, 0x8000_0001, 1);
        assert_eq!(out.result, 3);
        let out = alu_imm(ImmAluOp::Rol, 0b1000, (-3i32) as u32);
        assert_eq!(out.result, 1);
    }

    #[test]
    fn test_moves_leave_flags() {
        let out = alu_imm(ImmAluOp::Ldi, 0xAAAA_AAAA, 0xFFFF_BEEF);
        assert_eq!(out.result, 0xBEEF);
        assert_eq!(out.flags, None);

        let out = alu_imm(ImmAluOp::Ldx, 0, 0xFFFF_BEEF);
        assert_eq!(out.result, 0xFFFF_BEEF);

        let out = alu_reg(RegAluOp::Cpy, 1, 7).unwrap();
        assert_eq!(out.result, 7);
        assert_eq!(out.flags, None);

        let out = alu_reg(RegAluOp::Nsa, 0, 0xF0F0).unwrap();
        assert_eq!(out.result, 8);
    }

    #[test]
    fn test_unsigned_division() {
        let out = alu_reg(RegAluOp::Div, 0xFFFF_FFFE, 2).unwrap();
        assert_eq!(out.result, 0x7FFF_FFFF);
        let out = alu_reg(RegAluOp::Rem, 17, 5).unwrap();
        assert_eq!(out.result, 2);
        assert_eq!(
            alu_reg(RegAluOp::Div, 1, 0),
            Err(ExecutionError::DivisionByZero)
        );
        assert_eq!(
            alu_reg(RegAluOp::Rem, 1, 0),
            Err(ExecutionError::DivisionByZero)
        );
    }

    #[test]
    fn test_negate_and_not() {
        let out = alu_imm(ImmAluOp::Neg, 1, 0);
        assert_eq!(out.result, 0xFFFF_FFFF);
        let out = alu_imm(ImmAluOp::Not, 0, 0);
        assert_eq!(out.result, 0xFFFF_FFFF);
        assert_eq!(out.flags, Some(FlagRegister::new(SF)));
    }

    #[test]
    fn test_opcode_numbering() {
        assert_eq!(ImmAluOp::from_bits(12), Some(ImmAluOp::Ldi));
        assert_eq!(ImmAluOp::from_bits(15), None);
        assert_eq!(RegAluOp::from_bits(15), Some(RegAluOp::Nsa));
        assert_eq!(ImmAluOp::Cmp.bits(), 14);
        assert_eq!(RegAluOp::Cmp.bits(), 13);
    }
}
