//! THUMB handlers, one per format. THUMB has no S bit: every arithmetic
//! operation commits flags, and r15 reads as the aligned instruction address
//! plus 4.

use crate::bitwise::{sign_extend, Bits};
use crate::bus::{Bus, CycleType, TransferSize};
use crate::cpu::alu::{self, ShiftKind};
use crate::cpu::arm::operations::multiplier_array_cycles;
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::condition::Condition;
use crate::cpu::psr::CpuState;
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER, REG_SP};
use crate::cpu::FetchAccess;

/// The 16 operations of format 4, bits 9-6.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ThumbAluInstruction {
    And = 0x0,
    Eor = 0x1,
    Lsl = 0x2,
    Lsr = 0x3,
    Asr = 0x4,
    Adc = 0x5,
    Sbc = 0x6,
    Ror = 0x7,
    Tst = 0x8,
    Neg = 0x9,
    Cmp = 0xA,
    Cmn = 0xB,
    Orr = 0xC,
    Mul = 0xD,
    Bic = 0xE,
    Mvn = 0xF,
}

impl From<u16> for ThumbAluInstruction {
    fn from(op_code: u16) -> Self {
        match op_code {
            0x0 => Self::And,
            0x1 => Self::Eor,
            0x2 => Self::Lsl,
            0x3 => Self::Lsr,
            0x4 => Self::Asr,
            0x5 => Self::Adc,
            0x6 => Self::Sbc,
            0x7 => Self::Ror,
            0x8 => Self::Tst,
            0x9 => Self::Neg,
            0xA => Self::Cmp,
            0xB => Self::Cmn,
            0xC => Self::Orr,
            0xD => Self::Mul,
            0xE => Self::Bic,
            0xF => Self::Mvn,
            _ => unreachable!(),
        }
    }
}

impl<B: Bus> Arm7tdmi<B> {
    /// Format 1: LSL/LSR/ASR by a 5-bit immediate.
    pub(crate) fn move_shifted_register(&mut self, instruction: u16) -> FetchAccess {
        let kind = ShiftKind::from(instruction.get_bits(11..=12));
        let offset5 = u32::from(instruction.get_bits(6..=10));
        let rs = usize::from(instruction.get_bits(3..=5));
        let rd = usize::from(instruction.get_bits(0..=2));

        let shifted = alu::shift_immediate(
            kind,
            offset5,
            self.registers.register_at(rs),
            self.cpsr.carry_flag(),
        );

        let outcome = alu::logical(shifted.result, shifted.carry, self.cpsr.overflow_flag());
        self.registers.set_register_at(rd, outcome.result);
        self.cpsr.set_flags(&outcome);

        FetchAccess::Sequential
    }

    /// Format 2: ADD/SUB with a register or 3-bit immediate.
    pub(crate) fn add_subtract(&mut self, instruction: u16) -> FetchAccess {
        let immediate = instruction.get_bit(10);
        let subtract = instruction.get_bit(9);
        let rn_or_imm = instruction.get_bits(6..=8);
        let rs = usize::from(instruction.get_bits(3..=5));
        let rd = usize::from(instruction.get_bits(0..=2));

        let first = self.registers.register_at(rs);
        let second = if immediate {
            u32::from(rn_or_imm)
        } else {
            self.registers.register_at(usize::from(rn_or_imm))
        };

        let outcome = if subtract {
            alu::sub(first, second)
        } else {
            alu::add(first, second)
        };

        self.registers.set_register_at(rd, outcome.result);
        self.cpsr.set_flags(&outcome);

        FetchAccess::Sequential
    }

    /// Format 3: MOV/CMP/ADD/SUB with an 8-bit immediate.
    pub(crate) fn move_compare_add_subtract_imm(&mut self, instruction: u16) -> FetchAccess {
        let operation = instruction.get_bits(11..=12);
        let rd = usize::from(instruction.get_bits(8..=10));
        let offset = u32::from(instruction.get_bits(0..=7));

        let rd_value = self.registers.register_at(rd);

        match operation {
            // MOV: N and Z only, C and V preserved.
            0b00 => {
                let outcome =
                    alu::logical(offset, self.cpsr.carry_flag(), self.cpsr.overflow_flag());
                self.registers.set_register_at(rd, outcome.result);
                self.cpsr.set_flags(&outcome);
            }
            // CMP: flags only.
            0b01 => self.cpsr.set_flags(&alu::sub(rd_value, offset)),
            0b10 => {
                let outcome = alu::add(rd_value, offset);
                self.registers.set_register_at(rd, outcome.result);
                self.cpsr.set_flags(&outcome);
            }
            _ => {
                let outcome = alu::sub(rd_value, offset);
                self.registers.set_register_at(rd, outcome.result);
                self.cpsr.set_flags(&outcome);
            }
        }

        FetchAccess::Sequential
    }

    /// Format 4: the 16 register-to-register ALU operations.
    pub(crate) fn alu_operation(&mut self, instruction: u16) -> FetchAccess {
        let operation = ThumbAluInstruction::from(instruction.get_bits(6..=9));
        let rs = usize::from(instruction.get_bits(3..=5));
        let rd = usize::from(instruction.get_bits(0..=2));

        let rs_value = self.registers.register_at(rs);
        let rd_value = self.registers.register_at(rd);
        let carry = self.cpsr.carry_flag();
        let overflow = self.cpsr.overflow_flag();

        let (outcome, writes_result) = match operation {
            ThumbAluInstruction::And => (alu::logical(rd_value & rs_value, carry, overflow), true),
            ThumbAluInstruction::Eor => (alu::logical(rd_value ^ rs_value, carry, overflow), true),
            ThumbAluInstruction::Lsl
            | ThumbAluInstruction::Lsr
            | ThumbAluInstruction::Asr
            | ThumbAluInstruction::Ror => {
                let kind = match operation {
                    ThumbAluInstruction::Lsl => ShiftKind::Lsl,
                    ThumbAluInstruction::Lsr => ShiftKind::Lsr,
                    ThumbAluInstruction::Asr => ShiftKind::Asr,
                    _ => ShiftKind::Ror,
                };
                // Shift amount from a register costs the extra cycle here
                // too.
                self.bus
                    .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);
                let shifted = alu::shift_register(kind, rs_value & 0xFF, rd_value, carry);
                (alu::logical(shifted.result, shifted.carry, overflow), true)
            }
            ThumbAluInstruction::Adc => (alu::adc(rd_value, rs_value, carry), true),
            ThumbAluInstruction::Sbc => (alu::sbc(rd_value, rs_value, carry), true),
            ThumbAluInstruction::Tst => (alu::logical(rd_value & rs_value, carry, overflow), false),
            ThumbAluInstruction::Neg => (alu::sub(0, rs_value), true),
            ThumbAluInstruction::Cmp => (alu::sub(rd_value, rs_value), false),
            ThumbAluInstruction::Cmn => (alu::add(rd_value, rs_value), false),
            ThumbAluInstruction::Orr => (alu::logical(rd_value | rs_value, carry, overflow), true),
            ThumbAluInstruction::Mul => {
                for _ in 0..multiplier_array_cycles(rd_value) {
                    self.bus
                        .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);
                }
                // The multiplier destroys the carry flag.
                (alu::logical(rd_value.wrapping_mul(rs_value), false, overflow), true)
            }
            ThumbAluInstruction::Bic => (alu::logical(rd_value & !rs_value, carry, overflow), true),
            ThumbAluInstruction::Mvn => (alu::logical(!rs_value, carry, overflow), true),
        };

        if writes_result {
            self.registers.set_register_at(rd, outcome.result);
        }
        self.cpsr.set_flags(&outcome);

        FetchAccess::Sequential
    }

    /// Format 5: ADD/CMP/MOV on high registers and BX.
    pub(crate) fn hi_register_op_bx(&mut self, instruction: u16) -> FetchAccess {
        let operation = instruction.get_bits(8..=9);
        let h1 = instruction.get_bit(7);
        let h2 = instruction.get_bit(6);
        let rs = usize::from(instruction.get_bits(3..=5)) | (usize::from(h2) << 3);
        let rd = usize::from(instruction.get_bits(0..=2)) | (usize::from(h1) << 3);

        let rs_value = self.thumb_operand_value(rs);

        match operation {
            // ADD: no flags.
            0b00 => {
                let result = self.thumb_operand_value(rd).wrapping_add(rs_value);
                if rd == REG_PROGRAM_COUNTER {
                    self.write_program_counter(result);
                    return FetchAccess::Branch;
                }
                self.registers.set_register_at(rd, result);
            }
            // CMP: the only high-register operation that sets flags.
            0b01 => {
                let outcome = alu::sub(self.thumb_operand_value(rd), rs_value);
                self.cpsr.set_flags(&outcome);
            }
            // MOV: no flags.
            0b10 => {
                if rd == REG_PROGRAM_COUNTER {
                    self.write_program_counter(rs_value);
                    return FetchAccess::Branch;
                }
                self.registers.set_register_at(rd, rs_value);
            }
            // BX: bit 0 of the target selects the state.
            _ => {
                let state = CpuState::from(rs_value.get_bit(0));
                self.cpsr.set_cpu_state(state);
                self.write_program_counter(rs_value);
                return FetchAccess::Branch;
            }
        }

        FetchAccess::Sequential
    }

    /// Format 6: PC-relative word load.
    pub(crate) fn pc_relative_load(&mut self, instruction: u16) -> FetchAccess {
        let rd = usize::from(instruction.get_bits(8..=10));
        let offset = u32::from(instruction.get_bits(0..=7)) << 2;

        let address = self
            .thumb_operand_value(REG_PROGRAM_COUNTER)
            .wrapping_add(offset);
        let value = self.bus.read_word(address, CycleType::NonSequential);
        self.bus
            .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);

        self.registers.set_register_at(rd, value);

        FetchAccess::Sequential
    }

    /// Format 7: load/store with register offset.
    pub(crate) fn load_store_register_offset(&mut self, instruction: u16) -> FetchAccess {
        let load = instruction.get_bit(11);
        let byte_transfer = instruction.get_bit(10);
        let ro = usize::from(instruction.get_bits(6..=8));
        let rb = usize::from(instruction.get_bits(3..=5));
        let rd = usize::from(instruction.get_bits(0..=2));

        let address = self
            .registers
            .register_at(rb)
            .wrapping_add(self.registers.register_at(ro));

        self.load_store_common(load, byte_transfer, address, rd);

        FetchAccess::Sequential
    }

    /// Format 8: load/store sign-extended byte and halfword.
    pub(crate) fn load_store_sign_extended(&mut self, instruction: u16) -> FetchAccess {
        let halfword = instruction.get_bit(11);
        let sign_extended = instruction.get_bit(10);
        let ro = usize::from(instruction.get_bits(6..=8));
        let rb = usize::from(instruction.get_bits(3..=5));
        let rd = usize::from(instruction.get_bits(0..=2));

        let address = self
            .registers
            .register_at(rb)
            .wrapping_add(self.registers.register_at(ro));

        match (sign_extended, halfword) {
            // STRH
            (false, false) => {
                let value = self.registers.register_at(rd);
                self.bus.write_half_word(address & !1, value as u16);
                return FetchAccess::Sequential;
            }
            // LDRH, rotating the odd byte into the low lane like LDR.
            (false, true) => {
                let value =
                    u32::from(self.bus.read_half_word(address & !1, CycleType::NonSequential))
                        .rotate_right((address & 1) * 8);
                self.registers.set_register_at(rd, value);
            }
            // LDSB
            (true, false) => {
                let value = u32::from(self.bus.read_byte(address, CycleType::NonSequential));
                self.registers.set_register_at(rd, sign_extend(value, 8));
            }
            // LDSH, degrading to a sign-extended byte on an odd address.
            (true, true) => {
                let value = if address & 1 == 1 {
                    sign_extend(
                        u32::from(self.bus.read_byte(address, CycleType::NonSequential)),
                        8,
                    )
                } else {
                    sign_extend(
                        u32::from(self.bus.read_half_word(address, CycleType::NonSequential)),
                        16,
                    )
                };
                self.registers.set_register_at(rd, value);
            }
        }

        self.bus
            .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);

        FetchAccess::Sequential
    }

    /// Format 9: load/store with a 5-bit immediate offset.
    pub(crate) fn load_store_imm_offset(&mut self, instruction: u16) -> FetchAccess {
        let byte_transfer = instruction.get_bit(12);
        let load = instruction.get_bit(11);
        let offset5 = u32::from(instruction.get_bits(6..=10));
        let rb = usize::from(instruction.get_bits(3..=5));
        let rd = usize::from(instruction.get_bits(0..=2));

        // Word offsets are scaled, byte offsets are not.
        let offset = if byte_transfer { offset5 } else { offset5 << 2 };
        let address = self.registers.register_at(rb).wrapping_add(offset);

        self.load_store_common(load, byte_transfer, address, rd);

        FetchAccess::Sequential
    }

    /// Format 10: load/store halfword with immediate offset.
    pub(crate) fn load_store_halfword(&mut self, instruction: u16) -> FetchAccess {
        let load = instruction.get_bit(11);
        let offset = u32::from(instruction.get_bits(6..=10)) << 1;
        let rb = usize::from(instruction.get_bits(3..=5));
        let rd = usize::from(instruction.get_bits(0..=2));

        let address = self.registers.register_at(rb).wrapping_add(offset);

        if load {
            let value = u32::from(self.bus.read_half_word(address & !1, CycleType::NonSequential))
                .rotate_right((address & 1) * 8);
            self.bus
                .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);
            self.registers.set_register_at(rd, value);
        } else {
            let value = self.registers.register_at(rd);
            self.bus.write_half_word(address & !1, value as u16);
        }

        FetchAccess::Sequential
    }

    /// Format 11: load/store relative to the stack pointer.
    pub(crate) fn sp_relative_load_store(&mut self, instruction: u16) -> FetchAccess {
        let load = instruction.get_bit(11);
        let rd = usize::from(instruction.get_bits(8..=10));
        let offset = u32::from(instruction.get_bits(0..=7)) << 2;

        let address = self.registers.register_at(REG_SP).wrapping_add(offset);

        self.load_store_common(load, false, address, rd);

        FetchAccess::Sequential
    }

    /// Format 12: ADD Rd, PC/SP, #imm.
    pub(crate) fn load_address(&mut self, instruction: u16) -> FetchAccess {
        let from_sp = instruction.get_bit(11);
        let rd = usize::from(instruction.get_bits(8..=10));
        let offset = u32::from(instruction.get_bits(0..=7)) << 2;

        let base = if from_sp {
            self.registers.register_at(REG_SP)
        } else {
            self.thumb_operand_value(REG_PROGRAM_COUNTER)
        };

        self.registers.set_register_at(rd, base.wrapping_add(offset));

        FetchAccess::Sequential
    }

    /// Format 13: adjust the stack pointer by a signed 7-bit word offset.
    pub(crate) fn add_offset_to_sp(&mut self, instruction: u16) -> FetchAccess {
        let negative = instruction.get_bit(7);
        let offset = u32::from(instruction.get_bits(0..=6)) << 2;

        let sp = self.registers.register_at(REG_SP);
        let sp = if negative {
            sp.wrapping_sub(offset)
        } else {
            sp.wrapping_add(offset)
        };
        self.registers.set_register_at(REG_SP, sp);

        FetchAccess::Sequential
    }

    /// Format 14: PUSH/POP, optionally with LR/PC.
    pub(crate) fn push_pop_registers(&mut self, instruction: u16) -> FetchAccess {
        let load = instruction.get_bit(11);
        let store_lr_load_pc = instruction.get_bit(8);
        let register_list = instruction.get_bits(0..=7);

        let count = register_list.count_ones() + u32::from(store_lr_load_pc);
        let sp = self.registers.register_at(REG_SP);

        if load {
            // POP: ascending loads from SP.
            let mut address = sp;
            let mut cycle = CycleType::NonSequential;
            for reg in 0..8 {
                if register_list.get_bit(reg) {
                    let data = self.bus.read_word(address & !3, cycle);
                    cycle = CycleType::Sequential;
                    self.registers.set_register_at(usize::from(reg), data);
                    address = address.wrapping_add(4);
                }
            }
            self.bus
                .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);
            self.registers
                .set_register_at(REG_SP, sp.wrapping_add(4 * count));

            if store_lr_load_pc {
                let target = self.bus.read_word(address & !3, CycleType::Sequential);
                self.write_program_counter(target);
                return FetchAccess::Branch;
            }
        } else {
            // PUSH: the window grows downwards, the words lie ascending.
            let mut address = sp.wrapping_sub(4 * count);
            self.registers.set_register_at(REG_SP, address);
            for reg in 0..8 {
                if register_list.get_bit(reg) {
                    self.bus
                        .write_word(address & !3, self.registers.register_at(usize::from(reg)));
                    address = address.wrapping_add(4);
                }
            }
            if store_lr_load_pc {
                self.bus
                    .write_word(address & !3, self.registers.register_at(REG_LR));
            }
        }

        FetchAccess::Sequential
    }

    /// Format 15: STMIA/LDMIA with writeback.
    pub(crate) fn multiple_load_store(&mut self, instruction: u16) -> FetchAccess {
        let load = instruction.get_bit(11);
        let rb = usize::from(instruction.get_bits(8..=10));
        let register_list = instruction.get_bits(0..=7);

        let count = register_list.count_ones();
        let base = self.registers.register_at(rb);
        let final_base = base.wrapping_add(4 * count);

        let mut address = base;

        if load {
            let mut cycle = CycleType::NonSequential;
            for reg in 0..8 {
                if register_list.get_bit(reg) {
                    let data = self.bus.read_word(address & !3, cycle);
                    cycle = CycleType::Sequential;
                    self.registers.set_register_at(usize::from(reg), data);
                    address = address.wrapping_add(4);
                }
            }
            self.bus
                .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);
            self.registers.set_register_at(rb, final_base);
        } else {
            let first_in_list = usize::from(register_list.trailing_zeros() as u16);
            let mut base_store_address = None;

            for reg in 0..8 {
                if register_list.get_bit(reg) {
                    let reg = usize::from(reg);
                    if reg == rb {
                        base_store_address = Some(address);
                    }
                    self.bus
                        .write_word(address & !3, self.registers.register_at(reg));
                    address = address.wrapping_add(4);
                }
            }

            // Same base-in-list rule as STM: only the first register stores
            // the original base.
            if let Some(slot) = base_store_address {
                if rb != first_in_list {
                    self.bus.write_word(slot & !3, final_base);
                }
            }
            self.registers.set_register_at(rb, final_base);
        }

        FetchAccess::Sequential
    }

    /// Format 16: conditional branch over a signed 8-bit offset.
    pub(crate) fn conditional_branch(&mut self, instruction: u16) -> FetchAccess {
        let condition = Condition::from(instruction.get_bits(8..=11) as u8);
        let offset = sign_extend(u32::from(instruction.get_bits(0..=7)), 8).wrapping_shl(1);

        if !self.cpsr.can_execute(condition) {
            return FetchAccess::Sequential;
        }

        // Branch bases are plain PC + 4, without the word-forcing of r15
        // operand reads; the register is already one fetch ahead.
        let target = self
            .registers
            .program_counter()
            .wrapping_add(2)
            .wrapping_add(offset);
        self.write_program_counter(target);

        FetchAccess::Branch
    }

    /// Format 18: unconditional branch over a signed 11-bit offset.
    pub(crate) fn unconditional_branch(&mut self, instruction: u16) -> FetchAccess {
        let offset = sign_extend(u32::from(instruction.get_bits(0..=10)), 11).wrapping_shl(1);

        let target = self
            .registers
            .program_counter()
            .wrapping_add(2)
            .wrapping_add(offset);
        self.write_program_counter(target);

        FetchAccess::Branch
    }

    /// Format 19: the two-halfword BL/BLX sequence.
    ///
    /// The first half (H=10) stages the upper offset bits in LR; the second
    /// half (H=11 for BL, H=01 for BLX) finishes the branch and swaps the
    /// return address into LR with bit 0 set.
    pub(crate) fn long_branch_with_link(&mut self, instruction: u16) -> FetchAccess {
        let offset = u32::from(instruction.get_bits(0..=10));

        match instruction.get_bits(11..=12) {
            // High half: LR = PC + 4 + (offset << 12).
            0b10 => {
                let staged = self
                    .registers
                    .program_counter()
                    .wrapping_add(2)
                    .wrapping_add(sign_extend(offset, 11).wrapping_shl(12));
                self.registers.set_register_at(REG_LR, staged);
                FetchAccess::Sequential
            }
            // BL low half.
            0b11 => {
                let target = self
                    .registers
                    .register_at(REG_LR)
                    .wrapping_add(offset << 1);
                // The return address is the next halfword, with bit 0 set so
                // a BX comes back to THUMB state.
                self.registers
                    .set_register_at(REG_LR, self.registers.program_counter() | 1);
                self.write_program_counter(target);
                FetchAccess::Branch
            }
            // BLX low half: same sequence, but the target is ARM code.
            0b01 => {
                let target = self
                    .registers
                    .register_at(REG_LR)
                    .wrapping_add(offset << 1);
                self.registers
                    .set_register_at(REG_LR, self.registers.program_counter() | 1);
                self.cpsr.set_cpu_state(CpuState::Arm);
                self.write_program_counter(target);
                FetchAccess::Branch
            }
            _ => self.undefined_thumb(instruction),
        }
    }

    /// Shared body of the word/byte load-store formats.
    fn load_store_common(&mut self, load: bool, byte_transfer: bool, address: u32, rd: usize) {
        if load {
            let value = if byte_transfer {
                u32::from(self.bus.read_byte(address, CycleType::NonSequential))
            } else {
                self.bus
                    .read_word(address, CycleType::NonSequential)
                    .rotate_right((address & 3) * 8)
            };
            self.bus
                .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);
            self.registers.set_register_at(rd, value);
        } else {
            let value = self.registers.register_at(rd);
            if byte_transfer {
                self.bus.write_byte(address, value as u8);
            } else {
                self.bus.write_word(address & !3, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::GbaBus;
    use pretty_assertions::assert_eq;

    fn cpu() -> Arm7tdmi<GbaBus> {
        Arm7tdmi::new(GbaBus::default())
    }

    #[test]
    fn check_move_shifted_register() {
        // LSL R1, R2, #4
        let mut cpu = cpu();
        cpu.registers.set_register_at(2, 0x1800_0001);

        cpu.execute_thumb(0x0111);

        assert_eq!(cpu.registers.register_at(1), 0x8000_0010);
        assert!(cpu.cpsr.sign_flag());
        assert!(cpu.cpsr.carry_flag());
        assert!(!cpu.cpsr.zero_flag());

        // LSR R1, R2, #0 encodes LSR #32.
        cpu.execute_thumb(0x0811);
        assert_eq!(cpu.registers.register_at(1), 0);
        assert!(cpu.cpsr.zero_flag());
        assert!(!cpu.cpsr.carry_flag());
    }

    #[test]
    fn check_add_subtract() {
        // SUB R1, R0, #7 with R0 = 6: borrow clears C.
        {
            let mut cpu = cpu();
            cpu.registers.set_register_at(0, 0b110);

            cpu.execute_thumb(0x1FC1);

            assert_eq!(cpu.registers.register_at(1), -1_i32 as u32);
            assert!(!cpu.cpsr.zero_flag());
            assert!(!cpu.cpsr.carry_flag());
            assert!(cpu.cpsr.sign_flag());
            assert!(!cpu.cpsr.overflow_flag());
        }
        // ADD R1, R0, R1 with R0 = u32::MAX, R1 = 1 wraps to zero.
        {
            let mut cpu = cpu();
            cpu.registers.set_register_at(0, u32::MAX);
            cpu.registers.set_register_at(1, 1);

            cpu.execute_thumb(0x1841);

            assert_eq!(cpu.registers.register_at(1), 0);
            assert!(cpu.cpsr.zero_flag());
            assert!(cpu.cpsr.carry_flag());
            assert!(!cpu.cpsr.sign_flag());
            assert!(!cpu.cpsr.overflow_flag());
        }
    }

    #[test]
    fn check_move_compare_add_subtract_imm() {
        let mut cpu = cpu();

        // MOV R0, #255
        cpu.execute_thumb(0x20FF);
        assert_eq!(cpu.registers.register_at(0), 255);
        assert!(!cpu.cpsr.sign_flag());
        assert!(!cpu.cpsr.zero_flag());

        // CMP R0, #10
        cpu.execute_thumb(0x280A);
        assert_eq!(cpu.registers.register_at(0), 255);
        assert!(cpu.cpsr.carry_flag());
        assert!(!cpu.cpsr.zero_flag());

        // ADD R0, #5 / SUB R0, #5
        cpu.execute_thumb(0x3005);
        assert_eq!(cpu.registers.register_at(0), 260);
        cpu.execute_thumb(0x3805);
        assert_eq!(cpu.registers.register_at(0), 255);
    }

    #[test]
    fn check_alu_and_mul() {
        // AND R0, R3
        {
            let mut cpu = cpu();
            cpu.cpsr.set_sign_flag(true);
            cpu.cpsr.set_zero_flag(true);
            cpu.registers.set_register_at(0, 1000);
            cpu.registers.set_register_at(3, 8);

            cpu.execute_thumb(0x4018);

            assert_eq!(cpu.registers.register_at(0), 8);
            assert!(!cpu.cpsr.sign_flag());
            assert!(!cpu.cpsr.zero_flag());
        }
        // MUL R0, R4 destroys the carry flag.
        {
            let mut cpu = cpu();
            cpu.cpsr.set_sign_flag(true);
            cpu.cpsr.set_zero_flag(true);
            cpu.cpsr.set_carry_flag(true);
            cpu.registers.set_register_at(0, 0xFFFF_FFFF);
            cpu.registers.set_register_at(4, 1);

            cpu.execute_thumb(0x4360);

            assert_eq!(cpu.registers.register_at(0), 0xFFFF_FFFF);
            assert!(cpu.cpsr.sign_flag());
            assert!(!cpu.cpsr.zero_flag());
            assert!(!cpu.cpsr.carry_flag());
        }
    }

    #[test]
    fn check_alu_shift_by_register() {
        // LSL R0, R1 with amount 32: zero result, carry from bit 0.
        let mut cpu = cpu();
        cpu.registers.set_register_at(0, 0x0000_0001);
        cpu.registers.set_register_at(1, 32);

        cpu.execute_thumb(0x4088);

        assert_eq!(cpu.registers.register_at(0), 0);
        assert!(cpu.cpsr.zero_flag());
        assert!(cpu.cpsr.carry_flag());

        // ROR R0, R1 by a multiple of 32 keeps the value.
        cpu.registers.set_register_at(0, 0x8000_0001);
        cpu.registers.set_register_at(1, 64);
        cpu.execute_thumb(0x41C8);
        assert_eq!(cpu.registers.register_at(0), 0x8000_0001);
        assert!(cpu.cpsr.carry_flag());
    }

    #[test]
    fn check_alu_adc_neg_mvn_tst() {
        let mut cpu = cpu();

        // ADC R0, R1 with carry set.
        cpu.cpsr.set_carry_flag(true);
        cpu.registers.set_register_at(0, 5);
        cpu.registers.set_register_at(1, 10);
        cpu.execute_thumb(0x4148);
        assert_eq!(cpu.registers.register_at(0), 16);

        // NEG R0, R1
        cpu.execute_thumb(0x4248);
        assert_eq!(cpu.registers.register_at(0), -10_i32 as u32);
        assert!(cpu.cpsr.sign_flag());

        // TST R0, R1 sets flags without writing.
        cpu.registers.set_register_at(0, 0xF0);
        cpu.registers.set_register_at(1, 0x0F);
        cpu.execute_thumb(0x4208);
        assert_eq!(cpu.registers.register_at(0), 0xF0);
        assert!(cpu.cpsr.zero_flag());

        // MVN R0, R1
        cpu.execute_thumb(0x43C8);
        assert_eq!(cpu.registers.register_at(0), !0x0F);
    }

    #[test]
    fn check_hi_register_operations() {
        // ADD R1, R8
        {
            let mut cpu = cpu();
            cpu.registers.set_register_at(8, 10);
            cpu.registers.set_register_at(1, 10);

            cpu.execute_thumb(0x4441);

            assert_eq!(cpu.registers.register_at(1), 20);
        }
        // CMP R1, R8: flags set, register untouched.
        {
            let mut cpu = cpu();
            cpu.registers.set_register_at(8, 10);
            cpu.registers.set_register_at(1, 10);

            cpu.execute_thumb(0x4541);

            assert!(cpu.cpsr.zero_flag());
            assert!(cpu.cpsr.carry_flag());
            assert_eq!(cpu.registers.register_at(1), 10);
        }
        // MOV R9, R0
        {
            let mut cpu = cpu();
            cpu.registers.set_register_at(0, 10);
            cpu.registers.set_register_at(9, 11);

            cpu.execute_thumb(0x4681);

            assert_eq!(cpu.registers.register_at(9), 10);
        }
    }

    #[test]
    fn check_bx_from_thumb() {
        // BX LR with an odd address stays in THUMB.
        let mut cpu = cpu();
        cpu.cpsr.set_cpu_state(CpuState::Thumb);
        cpu.registers.set_register_at(REG_LR, 123);

        let access = cpu.execute_thumb(0x4770);

        assert_eq!(access, FetchAccess::Branch);
        assert_eq!(cpu.registers.program_counter(), 122);
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Thumb);

        // An even target exchanges back to ARM.
        cpu.registers.set_register_at(REG_LR, 0x0300_0100);
        cpu.execute_thumb(0x4770);
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Arm);
        assert_eq!(cpu.registers.program_counter(), 0x0300_0100);
    }

    #[test]
    fn check_pc_relative_load() {
        // LDR R1, [PC, #0x160]
        let mut cpu = cpu();
        cpu.cpsr.set_cpu_state(CpuState::Thumb);
        cpu.registers.set_program_counter(0x0300_0002);
        cpu.bus.write_word(0x0300_0160 + 4, 99);

        cpu.execute_thumb(0x4958);

        // Base is (PC + 4) & !2 = 0x03000004.
        assert_eq!(cpu.registers.register_at(1), 99);
    }

    #[test]
    fn check_load_store_register_offset() {
        let mut cpu = cpu();
        cpu.registers.set_register_at(0, 0x0300_0064);
        cpu.registers.set_register_at(1, 0x0300_0064);
        cpu.registers.set_register_at(2, 0xFEEF_AC1F);

        // STR R2, [R1, R0] — base + offset lands at twice the base offset.
        cpu.registers.set_register_at(0, 100);
        cpu.registers.set_register_at(1, 0x0300_0000);
        cpu.execute_thumb(0x500A);
        assert_eq!(
            cpu.bus.read_word(0x0300_0064, CycleType::NonSequential),
            0xFEEF_AC1F
        );

        // STRB R2, [R1, R0]
        cpu.execute_thumb(0x540A);
        assert_eq!(cpu.bus.read_byte(0x0300_0064, CycleType::NonSequential), 0x1F);

        // LDR R2, [R1, R0]
        cpu.registers.set_register_at(2, 0);
        cpu.execute_thumb(0x580A);
        assert_eq!(cpu.registers.register_at(2), 0xFEEF_AC1F & 0xFFFF_FF00 | 0x1F);

        // LDRB R2, [R1, R0]
        cpu.execute_thumb(0x5C0A);
        assert_eq!(cpu.registers.register_at(2), 0x1F);
    }

    #[test]
    fn check_load_store_sign_extended() {
        let mut cpu = cpu();
        cpu.registers.set_register_at(0, 4);
        cpu.registers.set_register_at(1, 0x0300_0010);

        // STRH R2, [R1, R0]
        cpu.registers.set_register_at(2, 0xABCD_8001);
        cpu.execute_thumb(0x520A);
        assert_eq!(
            cpu.bus
                .read_half_word(0x0300_0014, CycleType::NonSequential),
            0x8001
        );

        // LDRH zero-extends.
        cpu.registers.set_register_at(2, 0);
        cpu.execute_thumb(0x5A0A);
        assert_eq!(cpu.registers.register_at(2), 0x8001);

        // LDSH sign-extends.
        cpu.execute_thumb(0x5E0A);
        assert_eq!(cpu.registers.register_at(2), 0xFFFF_8001);

        // LDSB sign-extends the byte.
        cpu.execute_thumb(0x560A);
        assert_eq!(cpu.registers.register_at(2), 0x0000_0001);

        cpu.bus.write_byte(0x0300_0014, 0x85);
        cpu.execute_thumb(0x560A);
        assert_eq!(cpu.registers.register_at(2), 0xFFFF_FF85);
    }

    #[test]
    fn check_load_store_imm_offset() {
        let mut cpu = cpu();
        cpu.registers.set_register_at(7, 0x0300_0020);
        cpu.registers.set_register_at(0, 0xFFFF_FFFF);

        // STR R0, [R7, #8]
        cpu.execute_thumb(0x60B8);
        assert_eq!(
            cpu.bus.read_word(0x0300_0028, CycleType::NonSequential),
            0xFFFF_FFFF
        );

        // LDR into another register.
        cpu.registers.set_register_at(0, 0);
        cpu.execute_thumb(0x68B8);
        assert_eq!(cpu.registers.register_at(0), 0xFFFF_FFFF);

        // STRB R0, [R7, #2]: byte offsets are unscaled.
        cpu.registers.set_register_at(0, 0x85);
        cpu.execute_thumb(0x70B8);
        assert_eq!(cpu.bus.read_byte(0x0300_0022, CycleType::NonSequential), 0x85);

        // LDRB
        cpu.registers.set_register_at(0, 0);
        cpu.execute_thumb(0x78B8);
        assert_eq!(cpu.registers.register_at(0), 0x85);
    }

    #[test]
    fn check_load_store_halfword() {
        let mut cpu = cpu();
        cpu.registers.set_register_at(7, 0x0300_0030);
        cpu.registers.set_register_at(0, 0xCAFE);

        // STRH R0, [R7, #4]
        cpu.execute_thumb(0x80B8);
        assert_eq!(
            cpu.bus
                .read_half_word(0x0300_0034, CycleType::NonSequential),
            0xCAFE
        );

        // LDRH R0, [R7, #4]
        cpu.registers.set_register_at(0, 0);
        cpu.execute_thumb(0x88B8);
        assert_eq!(cpu.registers.register_at(0), 0xCAFE);
    }

    #[test]
    fn check_sp_relative_load_store() {
        let mut cpu = cpu();
        cpu.registers.set_register_at(REG_SP, 0x0300_0064);

        // STR R0, [SP, #28]
        cpu.registers.set_register_at(0, 999);
        cpu.execute_thumb(0x9007);
        assert_eq!(
            cpu.bus.read_word(0x0300_0080, CycleType::NonSequential),
            999
        );

        // LDR R0, [SP, #28]
        cpu.registers.set_register_at(0, 0);
        cpu.execute_thumb(0x9807);
        assert_eq!(cpu.registers.register_at(0), 999);
    }

    #[test]
    fn check_load_address() {
        let mut cpu = cpu();
        cpu.cpsr.set_cpu_state(CpuState::Thumb);

        // ADD R0, PC, #4: the PC base is force-aligned.
        cpu.registers.set_program_counter(0x0300_0002);
        cpu.execute_thumb(0xA001);
        assert_eq!(cpu.registers.register_at(0), 0x0300_0008);

        // ADD R0, SP, #8
        cpu.registers.set_register_at(REG_SP, 0x0300_1000);
        cpu.execute_thumb(0xA802);
        assert_eq!(cpu.registers.register_at(0), 0x0300_1008);
    }

    #[test]
    fn check_add_offset_to_sp() {
        let mut cpu = cpu();
        cpu.registers.set_register_at(REG_SP, 1000);

        // ADD SP, #28
        cpu.execute_thumb(0xB007);
        assert_eq!(cpu.registers.register_at(REG_SP), 1000 + 28);

        // SUB SP, #28
        cpu.execute_thumb(0xB087);
        assert_eq!(cpu.registers.register_at(REG_SP), 1000);
    }

    #[test]
    fn check_push_pop() {
        // PUSH {R4-R7, LR}
        let mut cpu = cpu();
        cpu.registers.set_register_at(REG_SP, 0x0300_1000);
        cpu.registers.set_register_at(REG_LR, 1000);
        for reg in 0..8 {
            cpu.registers.set_register_at(reg, reg as u32);
        }

        cpu.execute_thumb(0xB5F0);

        assert_eq!(cpu.registers.register_at(REG_SP), 0x0300_1000 - 20);
        assert_eq!(cpu.bus.read_word(0x0300_0FEC, CycleType::NonSequential), 4);
        assert_eq!(cpu.bus.read_word(0x0300_0FF0, CycleType::NonSequential), 5);
        assert_eq!(cpu.bus.read_word(0x0300_0FF4, CycleType::NonSequential), 6);
        assert_eq!(cpu.bus.read_word(0x0300_0FF8, CycleType::NonSequential), 7);
        assert_eq!(
            cpu.bus.read_word(0x0300_0FFC, CycleType::NonSequential),
            1000
        );

        // POP {R4-R7, PC} restores everything, the PC from the top slot.
        for reg in 4..8 {
            cpu.registers.set_register_at(reg, 0);
        }
        cpu.cpsr.set_cpu_state(CpuState::Thumb);

        let access = cpu.execute_thumb(0xBDF0);

        assert_eq!(access, FetchAccess::Branch);
        for reg in 4..8_usize {
            assert_eq!(cpu.registers.register_at(reg), reg as u32);
        }
        assert_eq!(cpu.registers.program_counter(), 1000);
        assert_eq!(cpu.registers.register_at(REG_SP), 0x0300_1000);
    }

    #[test]
    fn check_multiple_load_store() {
        let mut cpu = cpu();
        cpu.registers.set_register_at(1, 0x0300_2000);
        cpu.registers.set_register_at(0, 0xAA);
        cpu.registers.set_register_at(2, 0xBB);

        // STMIA R1!, {R0, R2}
        cpu.execute_thumb(0xC105);

        assert_eq!(cpu.bus.read_word(0x0300_2000, CycleType::NonSequential), 0xAA);
        assert_eq!(cpu.bus.read_word(0x0300_2004, CycleType::NonSequential), 0xBB);
        assert_eq!(cpu.registers.register_at(1), 0x0300_2008);

        // LDMIA R1!, {R0, R2} from fresh memory.
        cpu.registers.set_register_at(1, 0x0300_2000);
        cpu.registers.set_register_at(0, 0);
        cpu.registers.set_register_at(2, 0);

        cpu.execute_thumb(0xC905);

        assert_eq!(cpu.registers.register_at(0), 0xAA);
        assert_eq!(cpu.registers.register_at(2), 0xBB);
        assert_eq!(cpu.registers.register_at(1), 0x0300_2008);
    }

    #[test]
    fn check_conditional_branch() {
        let mut cpu = cpu();
        cpu.cpsr.set_cpu_state(CpuState::Thumb);
        cpu.registers.set_program_counter(1000);

        // BEQ -8 with Z clear: not taken.
        let access = cpu.execute_thumb(0xD0FC);
        assert_eq!(access, FetchAccess::Sequential);
        assert_eq!(cpu.registers.program_counter(), 1000);

        // Taken once Z is set: target = PC + 4 - 8.
        cpu.cpsr.set_zero_flag(true);
        let access = cpu.execute_thumb(0xD0FC);
        assert_eq!(access, FetchAccess::Branch);
        assert_eq!(cpu.registers.program_counter(), 1000 + 2 - 8);
    }

    #[test]
    fn check_unconditional_branch() {
        let mut cpu = cpu();
        cpu.cpsr.set_cpu_state(CpuState::Thumb);
        cpu.registers.set_program_counter(1000);

        // B +606
        cpu.execute_thumb(0xE12F);

        assert_eq!(cpu.registers.program_counter(), 1000 + 2 + 606);

        // B backwards.
        cpu.registers.set_program_counter(1000);
        cpu.execute_thumb(0xE7FC);
        assert_eq!(cpu.registers.program_counter(), 1000 + 2 - 8);
    }

    #[test]
    fn check_long_branch_with_link() {
        let mut cpu = cpu();
        cpu.cpsr.set_cpu_state(CpuState::Thumb);

        // High half with offset 0: LR = PC + 4.
        cpu.registers.set_program_counter(1000);
        let access = cpu.execute_thumb(0xF000);
        assert_eq!(access, FetchAccess::Sequential);
        assert_eq!(cpu.registers.register_at(REG_LR), 1002);

        // Low half: branch to LR + 2, return address gets bit 0 set.
        cpu.registers.set_program_counter(1002);
        let access = cpu.execute_thumb(0xF801);
        assert_eq!(access, FetchAccess::Branch);
        assert_eq!(cpu.registers.program_counter(), 1004);
        assert_eq!(cpu.registers.register_at(REG_LR), 1003);
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Thumb);
    }

    #[test]
    fn check_long_branch_negative_offset() {
        let mut cpu = cpu();
        cpu.cpsr.set_cpu_state(CpuState::Thumb);

        // High half with offset -1: LR = PC + 4 - 0x1000.
        cpu.registers.set_program_counter(0x0300_2000);
        cpu.execute_thumb(0xF7FF);
        assert_eq!(cpu.registers.register_at(REG_LR), 0x0300_2002 - 0x1000);
    }

    #[test]
    fn check_long_branch_blx_switches_to_arm() {
        let mut cpu = cpu();
        cpu.cpsr.set_cpu_state(CpuState::Thumb);
        cpu.registers.set_register_at(REG_LR, 0x0300_0100);
        cpu.registers.set_program_counter(0x0300_0010);

        // BLX low half with offset 2: target is word-aligned ARM code.
        let access = cpu.execute_thumb(0xE802);

        assert_eq!(access, FetchAccess::Branch);
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Arm);
        assert_eq!(cpu.registers.program_counter(), 0x0300_0104);
        assert_eq!(cpu.registers.register_at(REG_LR), 0x0300_0011);
    }
}
