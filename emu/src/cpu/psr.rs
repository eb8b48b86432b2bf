//! # Program Status Registers (CPSR and SPSR)
//!
//! The PSR contains condition flags (N, Z, C, V) and control bits (mode, state, interrupts).
//!
//! ```text
//! 31 30 29 28 27      8 7 6 5 4   0
//! ┌──┬──┬──┬──┬────────┬─┬─┬─┬─────┐
//! │N │Z │C │V │Reserved│I│F│T│Mode │
//! └──┴──┴──┴──┴────────┴─┴─┴─┴─────┘
//! ```
//!
//! - **Flags (28-31)**: tested by [`Psr::can_execute`] against a [`Condition`]
//! - **Mode (0-4)**: see [`cpu_modes`](super::cpu_modes)
//! - **T bit (5)**: ARM (0) or Thumb (1) state; synchronized with the fetch width
//! - **I/F bits (6-7)**: IRQ/FIQ disable
//!
//! Each exception mode has an **SPSR** to save the CPSR on exception entry;
//! the SPSR bank lives in [`registers`](super::registers).

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::alu::ArithmeticOpResult;
use crate::cpu::{condition::Condition, cpu_modes::Mode};

/// Program Status Register (CPSR or SPSR).
///
/// Wraps a raw `u32` and provides type-safe accessors for each field. Used for
/// both the CPSR (current) and the SPSRs (saved per exception mode).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Psr(u32);

impl Psr {
    pub(crate) fn can_execute(self, cond: Condition) -> bool {
        use Condition::{AL, CC, CS, EQ, GE, GT, HI, LE, LS, LT, MI, NE, NV, PL, VC, VS};
        match cond {
            EQ => self.zero_flag(),                         // Equal (Z=1)
            NE => !self.zero_flag(),                        // Not equal (Z=0)
            CS => self.carry_flag(),                        // Unsigned higher or same (C=1)
            CC => !self.carry_flag(),                       // Unsigned lower (C=0)
            MI => self.sign_flag(),                         // Negative (N=1)
            PL => !self.sign_flag(),                        // Positive or zero (N=0)
            VS => self.overflow_flag(),                     // Overflow (V=1)
            VC => !self.overflow_flag(),                    // No overflow (V=0)
            HI => self.carry_flag() && !self.zero_flag(),   // Unsigned higher (C=1 and Z=0)
            LS => !self.carry_flag() || self.zero_flag(),   // Unsigned lower or same (C=0 or Z=1)
            GE => self.sign_flag() == self.overflow_flag(), // Greater or equal (N=V)
            LT => self.sign_flag() != self.overflow_flag(), // Less than (N<>V)
            GT => !self.zero_flag() && (self.sign_flag() == self.overflow_flag()), // Greater than (Z=0 and N=V)
            LE => self.zero_flag() || (self.sign_flag() != self.overflow_flag()), // Less or equal (Z=1 or N<>V)
            AL => true,  // Always (the "AL" suffix can be omitted)
            NV => false, // Never (reserved)
        }
    }

    /// N => Bit 31, (0=Not Signed, 1=Signed)
    #[must_use]
    pub fn sign_flag(self) -> bool {
        self.0.get_bit(31)
    }

    /// Z => Bit 30, (0=Not Zero, 1=Zero)
    #[must_use]
    pub fn zero_flag(self) -> bool {
        self.0.get_bit(30)
    }

    /// C => Bit 29, (0=Borrow/No Carry, 1=Carry/No Borrow)
    #[must_use]
    pub fn carry_flag(self) -> bool {
        self.0.get_bit(29)
    }

    /// V => Bit 28, (0=No Overflow, 1=Overflow)
    #[must_use]
    pub fn overflow_flag(self) -> bool {
        self.0.get_bit(28)
    }

    /// I => Bit 7, (0=Enable, 1=Disable)
    #[must_use]
    pub fn irq_disable(self) -> bool {
        self.0.get_bit(7)
    }

    /// F => Bit 6, (0=Enable, 1=Disable)
    #[must_use]
    pub fn fiq_disable(self) -> bool {
        self.0.get_bit(6)
    }

    /// T => Bit 5, (0=ARM, 1=THUMB)
    #[must_use]
    pub fn state_bit(self) -> bool {
        self.0.get_bit(5)
    }

    /// M4-M0 => Bits 4-0
    ///
    /// NOTE: The BIOS sometimes writes invalid mode values (like 0) to the
    /// SPSR. This method returns Supervisor mode as a safe default if the
    /// mode bits are invalid.
    #[must_use]
    pub fn mode(self) -> Mode {
        let mode_bits = self.0 & 0b11111;
        Mode::try_from(mode_bits).unwrap_or_else(|_| {
            logger::log(format!(
                "invalid mode bits 0b{:05b} in PSR=0x{:08X}, defaulting to Supervisor",
                mode_bits, self.0
            ));
            Mode::Supervisor
        })
    }

    pub fn set_sign_flag(&mut self, value: bool) {
        self.0.set_bit(31, value);
    }

    pub fn set_zero_flag(&mut self, value: bool) {
        self.0.set_bit(30, value);
    }

    pub fn set_carry_flag(&mut self, value: bool) {
        self.0.set_bit(29, value);
    }

    pub fn set_overflow_flag(&mut self, value: bool) {
        self.0.set_bit(28, value);
    }

    /// Commits all four condition flags of an ALU result at once.
    pub fn set_flags(&mut self, op_result: &ArithmeticOpResult) {
        self.set_carry_flag(op_result.carry);
        self.set_zero_flag(op_result.zero);
        self.set_sign_flag(op_result.sign);
        self.set_overflow_flag(op_result.overflow);
    }

    /// The interrupt bit I disables IRQ interrupts when set.
    pub fn set_irq_disable(&mut self, value: bool) {
        self.0.set_bit(7, value);
    }

    /// The interrupt bit F disables FIQ interrupts when set.
    pub fn set_fiq_disable(&mut self, value: bool) {
        self.0.set_bit(6, value);
    }

    /// The T bit selects the current state of the CPU: ARM or THUMB.
    pub fn set_state_bit(&mut self, value: bool) {
        self.0.set_bit(5, value);
    }

    /// The Mode Bits M4-M0 contain the current operating mode.
    pub const fn set_mode(&mut self, m: Mode) {
        self.0 &= !0b11111;
        self.0 |= m as u32;
    }

    /// Replaces the byte selected by `byte_nth` (0 = control, 3 = flags),
    /// used by MSR field-mask writes.
    pub fn set_byte(&mut self, byte_nth: u8, value: u8) {
        debug_assert!(byte_nth < 4);

        let shift = u32::from(byte_nth) * 8;
        self.0 = (self.0 & !(0xFF << shift)) | (u32::from(value) << shift);
    }

    #[must_use]
    pub fn cpu_state(self) -> CpuState {
        self.state_bit().into()
    }

    pub fn set_cpu_state(&mut self, state: CpuState) {
        self.set_state_bit(state.into());
    }
}

impl From<Mode> for Psr {
    fn from(m: Mode) -> Self {
        let mut s = Self(0);

        s.set_mode(m);

        s
    }
}

impl From<u32> for Psr {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<Psr> for u32 {
    fn from(p: Psr) -> Self {
        p.0
    }
}

/// The CPU execution state (ARM or Thumb).
///
/// Controlled by the T bit (bit 5) in CPSR. Switched via `BX Rn` or on
/// exception entry (always back to ARM).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CpuState {
    /// Thumb: 16-bit instructions.
    Thumb,
    /// ARM: 32-bit instructions.
    Arm,
}

impl From<CpuState> for bool {
    fn from(state: CpuState) -> Self {
        match state {
            CpuState::Arm => false,
            CpuState::Thumb => true,
        }
    }
}

impl From<bool> for CpuState {
    fn from(state: bool) -> Self {
        if state {
            Self::Thumb
        } else {
            Self::Arm
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_condition_flags() {
        let mut cpsr = Psr::default();

        cpsr.set_sign_flag(true);
        assert!(cpsr.sign_flag());

        cpsr.set_zero_flag(true);
        assert!(cpsr.zero_flag());

        cpsr.set_carry_flag(true);
        assert!(cpsr.carry_flag());

        cpsr.set_overflow_flag(true);
        assert!(cpsr.overflow_flag());

        assert_eq!(u32::from(cpsr) >> 28, 0b1111);
    }

    #[test]
    fn check_control_bits() {
        let mut cpsr = Psr::default();

        cpsr.set_irq_disable(true);
        assert!(cpsr.irq_disable());

        cpsr.set_fiq_disable(true);
        assert!(cpsr.fiq_disable());

        cpsr.set_state_bit(true);
        assert!(cpsr.state_bit());
        assert_eq!(cpsr.cpu_state(), CpuState::Thumb);
    }

    #[test]
    fn check_can_execute() {
        let mut cpsr = Psr::default();

        assert!(cpsr.can_execute(Condition::AL));
        assert!(!cpsr.can_execute(Condition::NV));
        assert!(!cpsr.can_execute(Condition::EQ));
        assert!(cpsr.can_execute(Condition::NE));

        cpsr.set_zero_flag(true);
        assert!(cpsr.can_execute(Condition::EQ));
        assert!(cpsr.can_execute(Condition::LS));
        assert!(!cpsr.can_execute(Condition::HI));

        cpsr.set_sign_flag(true);
        assert!(!cpsr.can_execute(Condition::GE));
        assert!(cpsr.can_execute(Condition::LT));

        cpsr.set_overflow_flag(true);
        assert!(cpsr.can_execute(Condition::GE));
    }

    #[test]
    fn check_modes() {
        for (bits, mode) in [
            (0b10000, Mode::User),
            (0b10001, Mode::Fiq),
            (0b10010, Mode::Irq),
            (0b10011, Mode::Supervisor),
            (0b10111, Mode::Abort),
            (0b11011, Mode::Undefined),
            (0b11111, Mode::System),
        ] {
            let mut cpsr = Psr::default();
            cpsr.set_mode(mode);
            assert_eq!(u32::from(cpsr) & 0b11111, bits);
            assert_eq!(Psr::from(bits).mode(), mode);
        }
    }

    #[test]
    fn invalid_mode_defaults_to_supervisor() {
        let cpsr = Psr::from(0b00000_u32);
        assert_eq!(cpsr.mode(), Mode::Supervisor);
    }

    #[test]
    fn set_byte_replaces_one_octet() {
        let mut psr = Psr::from(0xFFFF_FFFF_u32);
        psr.set_byte(3, 0x50);
        assert_eq!(u32::from(psr), 0x50FF_FFFF);

        psr.set_byte(0, 0x1F);
        assert_eq!(u32::from(psr), 0x50FF_FF1F);
    }
}
