//! ARM handler families. Each handler takes the raw instruction word (its
//! condition already evaluated by the step loop), mutates CPU and bus state,
//! and reports whether the next fetch is sequential or a branch.

use crate::bitwise::{sign_extend, Bits};
use crate::bus::{Bus, CycleType, TransferSize};
use crate::cpu::alu::{self, ShiftKind};
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::cpu_modes::Mode;
use crate::cpu::flags::{
    HalfwordTransferKind, Indexing, LoadStoreKind, Offsetting, OperandKind, ReadWriteKind,
};
use crate::cpu::psr::{CpuState, Psr};
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER};
use crate::cpu::FetchAccess;

/// The 16 data processing operations, bits 24-21 of the instruction.
///
/// Split into two classes with different carry semantics:
/// - **Logical** (AND, EOR, TST, TEQ, ORR, MOV, BIC, MVN): C comes from the
///   barrel shifter.
/// - **Arithmetic** (SUB, RSB, ADD, ADC, SBC, RSC, CMP, CMN): C comes from
///   the operation itself.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ArmAluInstruction {
    /// Logical AND: `Rd = Rn AND Op2`
    And = 0x0,
    /// Exclusive OR: `Rd = Rn XOR Op2`
    Eor = 0x1,
    /// Subtract: `Rd = Rn - Op2`
    Sub = 0x2,
    /// Reverse Subtract: `Rd = Op2 - Rn`
    Rsb = 0x3,
    /// Add: `Rd = Rn + Op2`
    Add = 0x4,
    /// Add with Carry: `Rd = Rn + Op2 + C`
    Adc = 0x5,
    /// Subtract with Carry: `Rd = Rn - Op2 - !C`
    Sbc = 0x6,
    /// Reverse Subtract with Carry: `Rd = Op2 - Rn - !C`
    Rsc = 0x7,
    /// Test bits (AND, flags only, no result written)
    Tst = 0x8,
    /// Test Equivalence (XOR, flags only, no result written)
    Teq = 0x9,
    /// Compare (SUB, flags only, no result written)
    Cmp = 0xA,
    /// Compare Negative (ADD, flags only, no result written)
    Cmn = 0xB,
    /// Logical OR: `Rd = Rn OR Op2`
    Orr = 0xC,
    /// Move: `Rd = Op2` (Rn is ignored)
    Mov = 0xD,
    /// Bit Clear: `Rd = Rn AND NOT Op2`
    Bic = 0xE,
    /// Move Not: `Rd = NOT Op2` (Rn is ignored)
    Mvn = 0xF,
}

impl From<u32> for ArmAluInstruction {
    fn from(alu_op_code: u32) -> Self {
        match alu_op_code {
            0x0 => Self::And,
            0x1 => Self::Eor,
            0x2 => Self::Sub,
            0x3 => Self::Rsb,
            0x4 => Self::Add,
            0x5 => Self::Adc,
            0x6 => Self::Sbc,
            0x7 => Self::Rsc,
            0x8 => Self::Tst,
            0x9 => Self::Teq,
            0xA => Self::Cmp,
            0xB => Self::Cmn,
            0xC => Self::Orr,
            0xD => Self::Mov,
            0xE => Self::Bic,
            0xF => Self::Mvn,
            _ => unreachable!(),
        }
    }
}

impl ArmAluInstruction {
    /// TST, TEQ, CMP and CMN update flags without writing Rd.
    const fn writes_result(self) -> bool {
        !matches!(self, Self::Tst | Self::Teq | Self::Cmp | Self::Cmn)
    }
}

/// Internal cycles of the multiplier array: the early-out looks at how many
/// significant bytes the multiplier has (all-zeroes and all-ones both
/// terminate a row).
pub(crate) const fn multiplier_array_cycles(rs: u32) -> u32 {
    if rs & 0xFFFF_FF00 == 0 || rs & 0xFFFF_FF00 == 0xFFFF_FF00 {
        1
    } else if rs & 0xFFFF_0000 == 0 || rs & 0xFFFF_0000 == 0xFFFF_0000 {
        2
    } else if rs & 0xFF00_0000 == 0 || rs & 0xFF00_0000 == 0xFF00_0000 {
        3
    } else {
        4
    }
}

impl<B: Bus> Arm7tdmi<B> {
    pub(crate) fn data_processing(&mut self, instruction: u32) -> FetchAccess {
        let set_conditions = instruction.get_bit(20);
        let opcode = ArmAluInstruction::from(instruction.get_bits(21..=24));
        let rn = instruction.get_bits(16..=19) as usize;
        let rd = instruction.get_bits(12..=15) as usize;

        let carry_in = self.cpsr.carry_flag();

        // Operand 2 through the barrel shifter. The register-specified shift
        // amount form takes an extra cycle and reads its operands one fetch
        // later.
        let mut register_shift = false;
        let shifted = match OperandKind::from(instruction.get_bit(25)) {
            OperandKind::Immediate => alu::rotate_immediate(
                instruction.get_bits(0..=7),
                instruction.get_bits(8..=11) * 2,
                carry_in,
            ),
            OperandKind::Register => {
                let rm = instruction.get_bits(0..=3) as usize;
                let shift_kind = ShiftKind::from(instruction.get_bits(5..=6));

                if instruction.get_bit(4) {
                    register_shift = true;

                    let rs = instruction.get_bits(8..=11) as usize;
                    debug_assert!(rs != REG_PROGRAM_COUNTER, "r15 as shift amount register");

                    // Only the low byte of Rs supplies the amount.
                    let amount = self.registers.register_at(rs) & 0xFF;
                    alu::shift_register(shift_kind, amount, self.operand_value_late(rm), carry_in)
                } else {
                    let amount = instruction.get_bits(7..=11);
                    alu::shift_immediate(shift_kind, amount, self.operand_value(rm), carry_in)
                }
            }
        };

        let rn_value = if register_shift {
            self.bus
                .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);
            self.operand_value_late(rn)
        } else {
            self.operand_value(rn)
        };

        let op2 = shifted.result;
        let overflow = self.cpsr.overflow_flag();

        let outcome = match opcode {
            ArmAluInstruction::And | ArmAluInstruction::Tst => {
                alu::logical(rn_value & op2, shifted.carry, overflow)
            }
            ArmAluInstruction::Eor | ArmAluInstruction::Teq => {
                alu::logical(rn_value ^ op2, shifted.carry, overflow)
            }
            ArmAluInstruction::Sub | ArmAluInstruction::Cmp => alu::sub(rn_value, op2),
            ArmAluInstruction::Rsb => alu::sub(op2, rn_value),
            ArmAluInstruction::Add | ArmAluInstruction::Cmn => alu::add(rn_value, op2),
            ArmAluInstruction::Adc => alu::adc(rn_value, op2, carry_in),
            ArmAluInstruction::Sbc => alu::sbc(rn_value, op2, carry_in),
            ArmAluInstruction::Rsc => alu::sbc(op2, rn_value, carry_in),
            ArmAluInstruction::Orr => alu::logical(rn_value | op2, shifted.carry, overflow),
            ArmAluInstruction::Mov => alu::logical(op2, shifted.carry, overflow),
            ArmAluInstruction::Bic => alu::logical(rn_value & !op2, shifted.carry, overflow),
            ArmAluInstruction::Mvn => alu::logical(!op2, shifted.carry, overflow),
        };

        if !opcode.writes_result() {
            if set_conditions {
                self.cpsr.set_flags(&outcome);
            }
            return FetchAccess::Sequential;
        }

        if rd == REG_PROGRAM_COUNTER {
            // S=1 with Rd=r15 restores CPSR from the SPSR instead of
            // touching flags (exception return idiom).
            if set_conditions {
                self.restore_cpsr_from_spsr();
            }
            self.write_program_counter(outcome.result);
            return FetchAccess::Branch;
        }

        self.registers.set_register_at(rd, outcome.result);
        if set_conditions {
            self.cpsr.set_flags(&outcome);
        }

        FetchAccess::Sequential
    }

    pub(crate) fn psr_transfer(&mut self, instruction: u32) -> FetchAccess {
        let use_spsr = instruction.get_bit(22);

        if instruction.get_bit(21) {
            // MSR: write selected fields of the PSR.
            let value = if instruction.get_bit(25) {
                alu::rotate_immediate(
                    instruction.get_bits(0..=7),
                    instruction.get_bits(8..=11) * 2,
                    self.cpsr.carry_flag(),
                )
                .result
            } else {
                let rm = instruction.get_bits(0..=3) as usize;
                debug_assert!(rm != REG_PROGRAM_COUNTER, "r15 as MSR source");
                self.registers.register_at(rm)
            };

            self.transfer_to_psr(value, instruction.get_bits(16..=19), use_spsr);
        } else {
            // MRS: read the PSR into Rd.
            let rd = instruction.get_bits(12..=15) as usize;
            debug_assert!(rd != REG_PROGRAM_COUNTER, "r15 as MRS destination");

            let psr = if use_spsr { self.current_spsr() } else { self.cpsr };
            self.registers.set_register_at(rd, psr.into());
        }

        FetchAccess::Sequential
    }

    /// MSR write path: `field_mask` selects which bytes change (bit 3 =
    /// flags, bit 0 = control). In User mode only the flag byte is writable.
    fn transfer_to_psr(&mut self, value: u32, field_mask: u32, to_spsr: bool) {
        let privileged = self.cpsr.mode() != Mode::User;

        if to_spsr {
            let mut spsr = self.current_spsr();
            for byte in 0..4_u8 {
                if field_mask.get_bit(byte) && (byte != 0 || privileged) {
                    spsr.set_byte(byte, value.get_bits(8 * byte..=8 * byte + 7) as u8);
                }
            }
            // A no-op in USER/SYSTEM, which have no SPSR.
            self.registers.set_spsr(spsr);
            return;
        }

        if field_mask.get_bit(3) {
            self.cpsr.set_byte(3, value.get_bits(24..=31) as u8);
        }
        if field_mask.get_bit(2) && privileged {
            self.cpsr.set_byte(2, value.get_bits(16..=23) as u8);
        }
        if field_mask.get_bit(1) && privileged {
            self.cpsr.set_byte(1, value.get_bits(8..=15) as u8);
        }
        if field_mask.get_bit(0) && privileged {
            // The control byte carries the mode bits: rebank first, then
            // commit the byte, keeping the mode field a recognized encoding.
            let target_mode = Psr::from(value).mode();
            self.registers.switch_to_mode(target_mode);
            self.cpsr.set_byte(0, value.get_bits(0..=7) as u8);
            self.cpsr.set_mode(target_mode);
        }
    }

    pub(crate) fn multiply(&mut self, instruction: u32) -> FetchAccess {
        let accumulate = instruction.get_bit(21);
        let set_conditions = instruction.get_bit(20);
        let rd = instruction.get_bits(16..=19) as usize;
        let rn = instruction.get_bits(12..=15) as usize;
        let rs = instruction.get_bits(8..=11) as usize;
        let rm = instruction.get_bits(0..=3) as usize;

        debug_assert!(rd != rm, "MUL with rd == rm");
        debug_assert!(
            rd != REG_PROGRAM_COUNTER && rm != REG_PROGRAM_COUNTER && rs != REG_PROGRAM_COUNTER,
            "r15 in multiply operands"
        );

        let rs_value = self.registers.register_at(rs);
        let mut result = self.registers.register_at(rm).wrapping_mul(rs_value);
        let mut internal_cycles = multiplier_array_cycles(rs_value);

        if accumulate {
            debug_assert!(rn != REG_PROGRAM_COUNTER, "r15 in multiply operands");
            result = result.wrapping_add(self.registers.register_at(rn));
            internal_cycles += 1;
        }

        self.registers.set_register_at(rd, result);
        for _ in 0..internal_cycles {
            self.bus
                .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);
        }

        if set_conditions {
            self.cpsr.set_sign_flag(result.get_bit(31));
            self.cpsr.set_zero_flag(result == 0);
            // The multiplier destroys the carry flag.
            self.cpsr.set_carry_flag(false);
        }

        FetchAccess::Sequential
    }

    pub(crate) fn multiply_long(&mut self, instruction: u32) -> FetchAccess {
        let signed = instruction.get_bit(22);
        let accumulate = instruction.get_bit(21);
        let set_conditions = instruction.get_bit(20);
        let rdhi = instruction.get_bits(16..=19) as usize;
        let rdlo = instruction.get_bits(12..=15) as usize;
        let rs = instruction.get_bits(8..=11) as usize;
        let rm = instruction.get_bits(0..=3) as usize;

        debug_assert!(rdhi != rdlo && rdhi != rm && rdlo != rm, "overlapping long multiply registers");
        debug_assert!(
            rdhi != REG_PROGRAM_COUNTER
                && rdlo != REG_PROGRAM_COUNTER
                && rs != REG_PROGRAM_COUNTER
                && rm != REG_PROGRAM_COUNTER,
            "r15 in multiply operands"
        );

        let rm_value = self.registers.register_at(rm);
        let rs_value = self.registers.register_at(rs);

        let mut result = if signed {
            (i64::from(rm_value as i32) * i64::from(rs_value as i32)) as u64
        } else {
            u64::from(rm_value) * u64::from(rs_value)
        };

        let mut internal_cycles = multiplier_array_cycles(rs_value) + 1;
        if accumulate {
            let accumulator = (u64::from(self.registers.register_at(rdhi)) << 32)
                | u64::from(self.registers.register_at(rdlo));
            result = result.wrapping_add(accumulator);
            internal_cycles += 1;
        }

        self.registers.set_register_at(rdhi, (result >> 32) as u32);
        self.registers.set_register_at(rdlo, result as u32);
        for _ in 0..internal_cycles {
            self.bus
                .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);
        }

        if set_conditions {
            self.cpsr.set_sign_flag(result >> 63 == 1);
            self.cpsr.set_zero_flag(result == 0);
            self.cpsr.set_carry_flag(false);
        }

        FetchAccess::Sequential
    }

    pub(crate) fn single_data_transfer(&mut self, instruction: u32) -> FetchAccess {
        let indexing = Indexing::from(instruction.get_bit(24));
        let offsetting = Offsetting::from(instruction.get_bit(23));
        let quantity = ReadWriteKind::from(instruction.get_bit(22));
        let write_back = instruction.get_bit(21);
        let load_store = LoadStoreKind::from(instruction.get_bit(20));
        let rn = instruction.get_bits(16..=19) as usize;
        let rd = instruction.get_bits(12..=15) as usize;

        let offset = if instruction.get_bit(25) {
            // Register offset, shifted by an immediate amount only.
            debug_assert!(!instruction.get_bit(4), "register-specified shift in LDR/STR offset");
            let rm = instruction.get_bits(0..=3) as usize;
            debug_assert!(rm != REG_PROGRAM_COUNTER, "r15 as LDR/STR offset register");

            alu::shift_immediate(
                ShiftKind::from(instruction.get_bits(5..=6)),
                instruction.get_bits(7..=11),
                self.registers.register_at(rm),
                self.cpsr.carry_flag(),
            )
            .result
        } else {
            instruction.get_bits(0..=11)
        };

        let base = self.operand_value(rn);
        let offset_address = match offsetting {
            Offsetting::Up => base.wrapping_add(offset),
            Offsetting::Down => base.wrapping_sub(offset),
        };

        let address = match indexing {
            Indexing::Pre => offset_address,
            Indexing::Post => base,
        };

        if indexing == Indexing::Pre && write_back {
            self.registers.set_register_at(rn, offset_address);
        }

        match load_store {
            LoadStoreKind::Load => {
                let value = match quantity {
                    ReadWriteKind::Byte => {
                        u32::from(self.bus.read_byte(address, CycleType::NonSequential))
                    }
                    // A misaligned word load returns the aligned word rotated
                    // so the addressed byte lands in the low lane.
                    ReadWriteKind::Word => self
                        .bus
                        .read_word(address, CycleType::NonSequential)
                        .rotate_right((address & 3) * 8),
                };

                // The merge cycle of every load.
                self.bus
                    .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);

                // Post-indexing always writes the base back; a load of the
                // base register wins over the writeback.
                if indexing == Indexing::Post {
                    self.registers.set_register_at(rn, offset_address);
                }

                if rd == REG_PROGRAM_COUNTER {
                    self.write_program_counter(value);
                    return FetchAccess::Branch;
                }
                self.registers.set_register_at(rd, value);
            }
            LoadStoreKind::Store => {
                let value = self.operand_value_late(rd);
                match quantity {
                    ReadWriteKind::Byte => self.bus.write_byte(address, value as u8),
                    ReadWriteKind::Word => self.bus.write_word(address & !3, value),
                }

                if indexing == Indexing::Post {
                    self.registers.set_register_at(rn, offset_address);
                }
            }
        }

        FetchAccess::Sequential
    }

    pub(crate) fn halfword_data_transfer(&mut self, instruction: u32) -> FetchAccess {
        let indexing = Indexing::from(instruction.get_bit(24));
        let offsetting = Offsetting::from(instruction.get_bit(23));
        let write_back = instruction.get_bit(21);
        let load_store = LoadStoreKind::from(instruction.get_bit(20));
        let rn = instruction.get_bits(16..=19) as usize;
        let rd = instruction.get_bits(12..=15) as usize;
        let transfer_kind = HalfwordTransferKind::from(instruction);

        let offset = if instruction.get_bit(22) {
            (instruction.get_bits(8..=11) << 4) | instruction.get_bits(0..=3)
        } else {
            let rm = instruction.get_bits(0..=3) as usize;
            debug_assert!(rm != REG_PROGRAM_COUNTER, "r15 as halfword offset register");
            self.registers.register_at(rm)
        };

        let base = self.operand_value(rn);
        let offset_address = match offsetting {
            Offsetting::Up => base.wrapping_add(offset),
            Offsetting::Down => base.wrapping_sub(offset),
        };

        let address = match indexing {
            Indexing::Pre => offset_address,
            Indexing::Post => base,
        };

        if indexing == Indexing::Pre && write_back {
            self.registers.set_register_at(rn, offset_address);
        }

        if load_store == LoadStoreKind::Store {
            debug_assert!(
                transfer_kind == HalfwordTransferKind::UnsignedHalfword,
                "signed store encoding"
            );
            let value = self.operand_value_late(rd);
            self.bus.write_half_word(address & !1, value as u16);

            if indexing == Indexing::Post {
                self.registers.set_register_at(rn, offset_address);
            }
            return FetchAccess::Sequential;
        }

        let value = match transfer_kind {
            HalfwordTransferKind::UnsignedHalfword => {
                // Misaligned LDRH rotates like LDR does, by the odd byte.
                u32::from(self.bus.read_half_word(address & !1, CycleType::NonSequential))
                    .rotate_right((address & 1) * 8)
            }
            HalfwordTransferKind::SignedByte => {
                sign_extend(u32::from(self.bus.read_byte(address, CycleType::NonSequential)), 8)
            }
            HalfwordTransferKind::SignedHalfword => {
                if address & 1 == 1 {
                    // A misaligned LDRSH degrades to a sign-extended load of
                    // the addressed byte.
                    sign_extend(
                        u32::from(self.bus.read_byte(address, CycleType::NonSequential)),
                        8,
                    )
                } else {
                    sign_extend(
                        u32::from(self.bus.read_half_word(address, CycleType::NonSequential)),
                        16,
                    )
                }
            }
        };

        self.bus
            .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);

        if indexing == Indexing::Post {
            self.registers.set_register_at(rn, offset_address);
        }

        if rd == REG_PROGRAM_COUNTER {
            self.write_program_counter(value);
            return FetchAccess::Branch;
        }
        self.registers.set_register_at(rd, value);

        FetchAccess::Sequential
    }

    pub(crate) fn single_data_swap(&mut self, instruction: u32) -> FetchAccess {
        let byte_transfer = instruction.get_bit(22);
        let rn = instruction.get_bits(16..=19) as usize;
        let rd = instruction.get_bits(12..=15) as usize;
        let rm = instruction.get_bits(0..=3) as usize;

        debug_assert!(
            rn != REG_PROGRAM_COUNTER && rd != REG_PROGRAM_COUNTER && rm != REG_PROGRAM_COUNTER,
            "r15 in SWP operands"
        );

        let address = self.registers.register_at(rn);

        // Read-then-write, atomic from the CPU's point of view. The load
        // half rotates like LDR, the store half is unrotated.
        if byte_transfer {
            let data = self.bus.read_byte(address, CycleType::NonSequential);
            self.bus
                .write_byte(address, self.registers.register_at(rm) as u8);
            self.registers.set_register_at(rd, u32::from(data));
        } else {
            let data = self
                .bus
                .read_word(address, CycleType::NonSequential)
                .rotate_right((address & 3) * 8);
            self.bus
                .write_word(address & !3, self.registers.register_at(rm));
            self.registers.set_register_at(rd, data);
        }

        self.bus
            .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);

        FetchAccess::Sequential
    }

    pub(crate) fn block_data_transfer(&mut self, instruction: u32) -> FetchAccess {
        let indexing = Indexing::from(instruction.get_bit(24));
        let offsetting = Offsetting::from(instruction.get_bit(23));
        let s_bit = instruction.get_bit(22);
        let write_back = instruction.get_bit(21);
        let load_store = LoadStoreKind::from(instruction.get_bit(20));
        let rn = instruction.get_bits(16..=19) as usize;
        let register_list = instruction.get_bits(0..=15);

        debug_assert!(rn != REG_PROGRAM_COUNTER, "r15 as LDM/STM base");
        if s_bit {
            debug_assert!(self.cpsr.mode() != Mode::User, "S-bit LDM/STM in User mode");
        }

        let count = register_list.count_ones();
        let base = self.registers.register_at(rn);

        // Transfers always walk ascending register numbers over ascending
        // addresses; the direction and indexing bits only pick the window.
        let lowest = match (offsetting, indexing) {
            (Offsetting::Up, Indexing::Post) => base,
            (Offsetting::Up, Indexing::Pre) => base.wrapping_add(4),
            (Offsetting::Down, Indexing::Post) => base.wrapping_sub(4 * count).wrapping_add(4),
            (Offsetting::Down, Indexing::Pre) => base.wrapping_sub(4 * count),
        };
        let final_base = match offsetting {
            Offsetting::Up => base.wrapping_add(4 * count),
            Offsetting::Down => base.wrapping_sub(4 * count),
        };

        let mut address = lowest;
        let mut access = FetchAccess::Sequential;

        match load_store {
            LoadStoreKind::Load => {
                let mut cycle = CycleType::NonSequential;
                let mut loaded_pc = None;
                for reg in 0..16 {
                    if !register_list.get_bit(reg) {
                        continue;
                    }

                    let data = self.bus.read_word(address & !3, cycle);
                    cycle = CycleType::Sequential;
                    address = address.wrapping_add(4);

                    if usize::from(reg) == REG_PROGRAM_COUNTER {
                        loaded_pc = Some(data);
                    } else if s_bit {
                        self.registers.set_user_register_at(usize::from(reg), data);
                    } else {
                        self.registers.set_register_at(usize::from(reg), data);
                    }
                }

                self.bus
                    .add_cycle_to_timeline(CycleType::Internal, 0, TransferSize::Word);

                if write_back {
                    self.registers.set_register_at(rn, final_base);
                }

                if let Some(value) = loaded_pc {
                    // With the S bit, loading r15 additionally restores the
                    // CPSR from the current SPSR.
                    if s_bit {
                        self.restore_cpsr_from_spsr();
                    }
                    self.write_program_counter(value);
                    access = FetchAccess::Branch;
                }
            }
            LoadStoreKind::Store => {
                let first_in_list = register_list.trailing_zeros() as usize;
                let mut base_store_address = None;

                for reg in 0..16 {
                    if !register_list.get_bit(reg) {
                        continue;
                    }

                    let reg = usize::from(reg);
                    let data = if reg == REG_PROGRAM_COUNTER {
                        self.operand_value_late(reg)
                    } else if s_bit {
                        self.registers.user_register_at(reg)
                    } else {
                        self.registers.register_at(reg)
                    };

                    if reg == rn {
                        base_store_address = Some(address);
                    }

                    self.bus.write_word(address & !3, data);
                    address = address.wrapping_add(4);
                }

                if write_back {
                    // A STM whose list contains the base stores the original
                    // base only when the base is the first register stored;
                    // otherwise the written-back value is what lands in
                    // memory.
                    if let Some(slot) = base_store_address {
                        if rn != first_in_list {
                            self.bus.write_word(slot & !3, final_base);
                        }
                    }
                    self.registers.set_register_at(rn, final_base);
                }
            }
        }

        access
    }

    pub(crate) fn branch(&mut self, instruction: u32) -> FetchAccess {
        let link = instruction.get_bit(24);
        let offset = sign_extend(instruction.get_bits(0..=23), 24).wrapping_shl(2);

        let target = self
            .operand_value(REG_PROGRAM_COUNTER)
            .wrapping_add(offset);

        if link {
            // The return address is the instruction after the branch, which
            // the PC register already points at.
            self.registers
                .set_register_at(REG_LR, self.registers.program_counter());
        }

        self.write_program_counter(target);

        FetchAccess::Branch
    }

    pub(crate) fn branch_and_exchange(&mut self, instruction: u32) -> FetchAccess {
        let link = instruction.get_bit(5);
        let rn = instruction.get_bits(0..=3) as usize;
        debug_assert!(rn != REG_PROGRAM_COUNTER, "r15 as BX target register");

        let target = self.registers.register_at(rn);

        if link {
            self.registers
                .set_register_at(REG_LR, self.registers.program_counter());
        }

        // Bit 0 of the target selects the new state, then the PC is forcibly
        // aligned for that state.
        let state = CpuState::from(target.get_bit(0));
        self.cpsr.set_cpu_state(state);
        self.write_program_counter(target);

        FetchAccess::Branch
    }
}
