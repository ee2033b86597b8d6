//! Integer register file with hazard interlock enables

use std::fmt;

pub const REGISTER_COUNT: usize = 32;

/// Hard-wired zero register
pub const ZERO: u8 = 0;
/// Base pointer
pub const BP: u8 = 29;
/// Stack pointer
pub const SP: u8 = 30;
/// Link register
pub const LR: u8 = 31;

/// Conventional name of a register
pub fn register_name(r: u8) -> String {
    match r {
        BP => "bp".to_string(),
        SP => "sp".to_string(),
        LR => "lr".to_string(),
        _ => format!("r{}", r),
    }
}

/// A register access refused by the interlock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Blocked(pub u8);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntRegister {
    pub value: u32,
    pub read_enable: bool,
    pub write_enable: bool,
}

impl Default for IntRegister {
    fn default() -> Self {
        Self { value: 0, read_enable: true, write_enable: true }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RegisterFile {
    registers: [IntRegister; REGISTER_COUNT],
}

impl RegisterFile {
    fn check(r: u8) -> usize {
        assert!(
            (r as usize) < REGISTER_COUNT,
            "register index {} out of range",
            r
        );
        r as usize
    }

    /// Reads a register, refusing while it is claimed by an in-flight write
    pub fn read(&self, r: u8) -> Result<u32, Blocked> {
        let i = Self::check(r);
        if r == ZERO {
            return Ok(0);
        }
        let reg = &self.registers[i];
        if !reg.read_enable {
            return Err(Blocked(r));
        }
        Ok(reg.value)
    }

    pub fn read_nonblocking(&self, r: u8) -> u32 {
        let i = Self::check(r);
        if r == ZERO {
            return 0;
        }
        self.registers[i].value
    }

    pub fn write(&mut self, r: u8, value: u32) -> Result<(), Blocked> {
        let i = Self::check(r);
        if r == ZERO {
            return Ok(());
        }
        let reg = &mut self.registers[i];
        if !reg.write_enable {
            return Err(Blocked(r));
        }
        reg.value = value;
        Ok(())
    }

    pub fn write_nonblocking(&mut self, r: u8, value: u32) {
        let i = Self::check(r);
        if r != ZERO {
            self.registers[i].value = value;
        }
    }

    /// Clears both enables
    pub fn block(&mut self, r: u8) {
        let i = Self::check(r);
        if r != ZERO {
            self.registers[i].read_enable = false;
            self.registers[i].write_enable = false;
        }
    }

    /// Sets both enables
    pub fn unblock(&mut self, r: u8) {
        let i = Self::check(r);
        if r != ZERO {
            self.registers[i].read_enable = true;
            self.registers[i].write_enable = true;
        }
    }

    pub fn is_blocked(&self, r: u8) -> bool {
        let i = Self::check(r);
        let reg = &self.registers[i];
        !(reg.read_enable && reg.write_enable)
    }

    pub fn get(&self, r: u8) -> IntRegister {
        self.registers[Self::check(r)]
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..REGISTER_COUNT / 4 {
            for col in 0..4 {
                let r = (row * 4 + col) as u8;
                let reg = &self.registers[r as usize];
                let marker = if self.is_blocked(r) { '*' } else { ' ' };
                write!(
                    f,
                    "{:>3}{}= {:#010x}  ",
                    register_name(r),
                    marker,
                    reg.value
                )?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
