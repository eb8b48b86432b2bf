//! # Register File with Banked Registers
//!
//! The ARM7TDMI shows 16 general-purpose registers at any time, but some
//! architectural indices resolve to **different physical registers** depending
//! on the operating mode:
//!
//! ```text
//! Register │ User/Sys │  FIQ   │  IRQ   │  SVC   │ Abort  │ Undef  │
//! ─────────┼──────────┼────────┼────────┼────────┼────────┼────────┤
//!   R0-R7  │  R0-R7   │ R0-R7  │ R0-R7  │ R0-R7  │ R0-R7  │ R0-R7  │
//!   R8-R12 │  R8-R12  │ _fiq   │ R8-R12 │ R8-R12 │ R8-R12 │ R8-R12 │
//!   R13/SP │   R13    │R13_fiq │R13_irq │R13_svc │R13_abt │R13_und │
//!   R14/LR │   R14    │R14_fiq │R14_irq │R14_svc │R14_abt │R14_und │
//!   R15/PC │   R15    │  R15   │  R15   │  R15   │  R15   │  R15   │
//!   SPSR   │   ---    │SPSR_fiq│SPSR_irq│SPSR_svc│SPSR_abt│SPSR_und│
//! ```
//!
//! The file is modeled as index-addressed indirection: one flat array of
//! physical cells plus a 16-entry slot table mapping each architectural index
//! to a cell. [`RegisterFile::switch_to_mode`] rewrites the slot table, which
//! makes a mode change an O(1) re-pointing instead of a copy, and makes the
//! "user view" (needed by LDM/STM with the S bit) a plain identity lookup
//! into the USER/SYSTEM cells.

use serde::{Deserialize, Serialize};

use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::Psr;

/// Stack Pointer register index.
pub const REG_SP: usize = 13;

/// Link Register index (return address for subroutines).
pub const REG_LR: usize = 14;

/// Program Counter register index.
pub const REG_PROGRAM_COUNTER: usize = 15;

// Physical cell layout: the USER/SYSTEM set occupies cells 0-15, the banked
// cells follow. R15 and R0-R7 are never banked.
const PHYS_R8_FIQ: usize = 16; // ..=22 for r8_fiq..r14_fiq
const PHYS_R13_SVC: usize = 23;
const PHYS_R13_ABT: usize = 25;
const PHYS_R13_IRQ: usize = 27;
const PHYS_R13_UND: usize = 29;
const PHYS_COUNT: usize = 31;

/// The architectural registers, all banked copies, and the five SPSRs.
#[derive(Serialize, Deserialize)]
pub struct RegisterFile {
    bank: [u32; PHYS_COUNT],
    visible: [usize; 16],
    spsr_bank: [Psr; 5],
    mode: Mode,
}

impl Default for RegisterFile {
    fn default() -> Self {
        let mut file = Self {
            bank: [0; PHYS_COUNT],
            visible: [0; 16],
            spsr_bank: [Psr::default(); 5],
            mode: Mode::System,
        };
        file.switch_to_mode(Mode::System);
        file
    }
}

/// Index into the SPSR bank, `None` for the modes without an SPSR.
const fn spsr_slot(mode: Mode) -> Option<usize> {
    match mode {
        Mode::Fiq => Some(0),
        Mode::Supervisor => Some(1),
        Mode::Abort => Some(2),
        Mode::Irq => Some(3),
        Mode::Undefined => Some(4),
        Mode::User | Mode::System => None,
    }
}

impl RegisterFile {
    /// Repoints the visible slots at the physical cells of `mode`.
    ///
    /// Values are untouched: switching away from a mode and back restores the
    /// previous contents byte for byte.
    pub fn switch_to_mode(&mut self, mode: Mode) {
        for (index, slot) in self.visible.iter_mut().enumerate() {
            *slot = index;
        }

        match mode {
            Mode::User | Mode::System => {}
            Mode::Fiq => {
                for index in 8..=14 {
                    self.visible[index] = PHYS_R8_FIQ + (index - 8);
                }
            }
            Mode::Supervisor => {
                self.visible[REG_SP] = PHYS_R13_SVC;
                self.visible[REG_LR] = PHYS_R13_SVC + 1;
            }
            Mode::Abort => {
                self.visible[REG_SP] = PHYS_R13_ABT;
                self.visible[REG_LR] = PHYS_R13_ABT + 1;
            }
            Mode::Irq => {
                self.visible[REG_SP] = PHYS_R13_IRQ;
                self.visible[REG_LR] = PHYS_R13_IRQ + 1;
            }
            Mode::Undefined => {
                self.visible[REG_SP] = PHYS_R13_UND;
                self.visible[REG_LR] = PHYS_R13_UND + 1;
            }
        }

        self.mode = mode;
    }

    #[must_use]
    pub const fn register_at(&self, reg: usize) -> u32 {
        self.bank[self.visible[reg]]
    }

    pub fn set_register_at(&mut self, reg: usize, new_value: u32) {
        assert!(reg <= 15, "Invalid register index: {reg} (0x{reg:X})");
        self.bank[self.visible[reg]] = new_value;
    }

    /// Reads through the USER/SYSTEM view regardless of the current mode.
    #[must_use]
    pub const fn user_register_at(&self, reg: usize) -> u32 {
        self.bank[reg]
    }

    /// Writes through the USER/SYSTEM view regardless of the current mode.
    pub fn set_user_register_at(&mut self, reg: usize, new_value: u32) {
        assert!(reg <= 15, "Invalid register index: {reg} (0x{reg:X})");
        self.bank[reg] = new_value;
    }

    #[must_use]
    pub const fn program_counter(&self) -> u32 {
        self.bank[REG_PROGRAM_COUNTER]
    }

    pub const fn set_program_counter(&mut self, new_value: u32) {
        self.bank[REG_PROGRAM_COUNTER] = new_value;
    }

    pub const fn advance_program_counter(&mut self, bytes: u32) {
        self.bank[REG_PROGRAM_COUNTER] = self.bank[REG_PROGRAM_COUNTER].wrapping_add(bytes);
    }

    /// The SPSR of the current mode, `None` in USER/SYSTEM.
    #[must_use]
    pub fn spsr(&self) -> Option<Psr> {
        spsr_slot(self.mode).map(|slot| self.spsr_bank[slot])
    }

    /// Overwrites the SPSR of the current mode. Ignored in USER/SYSTEM,
    /// which have no SPSR to write.
    pub fn set_spsr(&mut self, psr: Psr) {
        if let Some(slot) = spsr_slot(self.mode) {
            self.spsr_bank[slot] = psr;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_switch_mode_banks_sp_and_lr() {
        let mut registers = RegisterFile::default();

        for i in 0..=15 {
            registers.set_register_at(i, i as u32);
        }

        registers.switch_to_mode(Mode::Irq);

        // IRQ sees fresh R13/R14, everything else unchanged.
        assert_eq!(registers.register_at(REG_SP), 0);
        assert_eq!(registers.register_at(REG_LR), 0);
        assert_eq!(registers.register_at(12), 12);
        assert_eq!(registers.register_at(REG_PROGRAM_COUNTER), 15);

        registers.set_register_at(REG_SP, 100);
        registers.set_register_at(REG_LR, 200);

        // Switching back restores the prior set byte for byte.
        registers.switch_to_mode(Mode::System);
        assert_eq!(registers.register_at(REG_SP), 13);
        assert_eq!(registers.register_at(REG_LR), 14);

        registers.switch_to_mode(Mode::Irq);
        assert_eq!(registers.register_at(REG_SP), 100);
        assert_eq!(registers.register_at(REG_LR), 200);
    }

    #[test]
    fn check_fiq_banks_r8_to_r14() {
        let mut registers = RegisterFile::default();

        for i in 0..=15 {
            registers.set_register_at(i, i as u32);
        }

        registers.switch_to_mode(Mode::Fiq);
        for i in 8..=14 {
            assert_eq!(registers.register_at(i), 0);
            registers.set_register_at(i, 1000 + i as u32);
        }

        // R0-R7 and R15 are shared with every mode.
        assert_eq!(registers.register_at(7), 7);
        assert_eq!(registers.register_at(REG_PROGRAM_COUNTER), 15);

        registers.switch_to_mode(Mode::System);
        for i in 8..=14 {
            assert_eq!(registers.register_at(i), i as u32);
        }

        registers.switch_to_mode(Mode::Fiq);
        for i in 8..=14 {
            assert_eq!(registers.register_at(i), 1000 + i as u32);
        }
    }

    #[test]
    fn check_user_view() {
        let mut registers = RegisterFile::default();

        registers.set_register_at(REG_SP, 0xCAFE);
        registers.switch_to_mode(Mode::Supervisor);
        registers.set_register_at(REG_SP, 0xBEEF);

        // The user view resolves to the USER/SYSTEM cells even from a
        // privileged mode.
        assert_eq!(registers.user_register_at(REG_SP), 0xCAFE);
        assert_eq!(registers.register_at(REG_SP), 0xBEEF);

        registers.set_user_register_at(REG_SP, 0x1234);
        registers.switch_to_mode(Mode::User);
        assert_eq!(registers.register_at(REG_SP), 0x1234);
    }

    #[test]
    fn check_spsr_banking() {
        let mut registers = RegisterFile::default();

        // USER/SYSTEM have no SPSR.
        assert_eq!(registers.spsr(), None);
        registers.set_spsr(Psr::from(Mode::Fiq));
        assert_eq!(registers.spsr(), None);

        registers.switch_to_mode(Mode::Irq);
        let mut saved = Psr::from(Mode::System);
        saved.set_carry_flag(true);
        registers.set_spsr(saved);

        registers.switch_to_mode(Mode::Supervisor);
        assert_eq!(registers.spsr(), Some(Psr::default()));

        registers.switch_to_mode(Mode::Irq);
        assert_eq!(registers.spsr(), Some(saved));
    }
}
