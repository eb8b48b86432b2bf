//! # Memory Bus Contract
//!
//! The CPU core talks to the outside world exclusively through the [`Bus`]
//! trait: byte/halfword/word reads and writes, a per-step cycle timeline, and
//! the three shared interrupt words (IME, IE, IF).
//!
//! Every access the CPU performs is annotated with a [`CycleType`] so the bus
//! can map it to the right number of wait states:
//!
//! ```text
//! ┌───────────────┬──────────────────────────────────────────────────────────┐
//! │ Cycle type    │ Meaning                                                  │
//! ├───────────────┼──────────────────────────────────────────────────────────┤
//! │ Sequential    │ Access at the address following the previous access (S)  │
//! │ NonSequential │ Access at an unrelated address (N)                       │
//! │ Branch        │ Instruction fetch after a taken branch (charged as N)    │
//! │ Internal      │ CPU-internal cycle, no memory access (I)                 │
//! └───────────────┴──────────────────────────────────────────────────────────┘
//! ```
//!
//! Alignment is split between the two sides: the bus ignores the low address
//! bits (bit 0 for halfwords, bits 1:0 for words), while rotation of
//! misaligned loads is the CPU's responsibility.
//!
//! [`GbaBus`] is a complete reference implementation with the GBA memory
//! regions and their default wait states, usable stand-alone and by the tests.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

/// Classification the CPU attaches to every memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleType {
    /// Access at the address immediately following the previous one.
    Sequential,

    /// Access at an address unrelated to the previous one.
    NonSequential,

    /// Instruction fetch right after a taken branch or exception.
    Branch,

    /// CPU-internal cycle; the bus is idle for one cycle.
    Internal,
}

/// Width of a memory access, used for wait-state accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferSize {
    Byte,
    HalfWord,
    Word,
}

/// The 14 interrupt sources sharing the IE/IF words.
///
/// The discriminant of each variant is its bit mask in IE and IF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Interrupt {
    VBlank = 0x0001,
    HBlank = 0x0002,
    VCount = 0x0004,
    Timer0 = 0x0008,
    Timer1 = 0x0010,
    Timer2 = 0x0020,
    Timer3 = 0x0040,
    Serial = 0x0080,
    Dma0 = 0x0100,
    Dma1 = 0x0200,
    Dma2 = 0x0400,
    Dma3 = 0x0800,
    Keypad = 0x1000,
    GamePak = 0x2000,
}

/// The sole collaborator of the CPU core.
///
/// All functions are total: there are no bus errors, and reads of unmapped
/// space return zero.
pub trait Bus {
    /// Reads a byte and accounts its cycles on the timeline.
    fn read_byte(&mut self, address: u32, cycle: CycleType) -> u8;

    /// Reads a halfword. Bit 0 of the address is ignored.
    fn read_half_word(&mut self, address: u32, cycle: CycleType) -> u16;

    /// Reads a word. Bits 1:0 of the address are ignored.
    fn read_word(&mut self, address: u32, cycle: CycleType) -> u32;

    fn write_byte(&mut self, address: u32, value: u8);

    /// Writes a halfword. Bit 0 of the address is ignored.
    fn write_half_word(&mut self, address: u32, value: u16);

    /// Writes a word. Bits 1:0 of the address are ignored.
    fn write_word(&mut self, address: u32, value: u32);

    /// Clears the cycle timeline. Called by the CPU at the top of every step.
    fn reset_cycle_timeline(&mut self);

    /// Accounts one access on the timeline without performing it.
    ///
    /// The CPU uses this for internal cycles and for the pipeline pre-fill
    /// accesses that are not real reads.
    fn add_cycle_to_timeline(&mut self, cycle: CycleType, address: u32, size: TransferSize);

    /// Cycles accumulated on the timeline since the last reset.
    fn memory_access_cycles(&self) -> u32;

    /// Interrupt master enable (bit 0 of the IME word).
    fn ime(&self) -> bool;

    /// The 14-bit interrupt enable word (IE).
    fn interrupt_enable(&self) -> u16;

    /// The 14-bit pending-interrupt word (IF).
    fn interrupt_flags(&self) -> u16;

    /// Raises one source's bit in IF. Peripherals call this to request
    /// service; the flag stays up until acknowledged with a write-one-to-clear
    /// store to the IF register.
    fn request_interrupt(&mut self, interrupt: Interrupt);
}

const BIOS_SIZE: usize = 16 * 1024;
const BOARD_WRAM_SIZE: usize = 256 * 1024;
const CHIP_WRAM_SIZE: usize = 32 * 1024;

const IE_ADDRESS: u32 = 0x0400_0200;
const IF_ADDRESS: u32 = 0x0400_0202;
const WAITCNT_ADDRESS: u32 = 0x0400_0204;
const IME_ADDRESS: u32 = 0x0400_0208;

/// Mask selecting the 14 defined interrupt sources in IE/IF.
const INTERRUPT_SOURCES_MASK: u16 = 0x3FFF;

/// Reference [`Bus`] implementation with the GBA memory regions.
///
/// ```text
/// 0x0000_0000  BIOS        16 KiB   32-bit bus, 0 waits
/// 0x0200_0000  board WRAM  256 KiB  16-bit bus, 2 waits
/// 0x0300_0000  chip WRAM   32 KiB   32-bit bus, 0 waits
/// 0x0400_0000  I/O words   IE / IF / WAITCNT / IME
/// 0x0800_0000  cartridge   16-bit bus, 4/2 waits (N/S, WAITCNT defaults)
/// ```
///
/// Each region is mirrored across its 24-bit block. Writes to BIOS and
/// cartridge space are ignored, reads of unmapped space return zero.
#[derive(Serialize, Deserialize)]
pub struct GbaBus {
    bios: Vec<u8>,
    board_wram: Vec<u8>,
    chip_wram: Vec<u8>,
    rom: Vec<u8>,

    interrupt_master_enable: u16,
    interrupt_enable: u16,
    interrupt_request: u16,
    wait_control: u16,

    access_cycles: u32,
}

impl Default for GbaBus {
    fn default() -> Self {
        Self {
            bios: vec![0; BIOS_SIZE],
            board_wram: vec![0; BOARD_WRAM_SIZE],
            chip_wram: vec![0; CHIP_WRAM_SIZE],
            rom: Vec::new(),
            interrupt_master_enable: 0,
            interrupt_enable: 0,
            interrupt_request: 0,
            wait_control: 0,
            access_cycles: 0,
        }
    }
}

impl GbaBus {
    pub fn with_rom(rom: Vec<u8>) -> Self {
        Self {
            rom,
            ..Default::default()
        }
    }

    pub fn load_bios(&mut self, bios: Vec<u8>) {
        self.bios = bios;
    }

    fn read_raw(&self, address: u32) -> u8 {
        let offset = address as usize;
        match address >> 24 {
            0x00 => self.bios[offset % BIOS_SIZE],
            0x02 => self.board_wram[offset % BOARD_WRAM_SIZE],
            0x03 => self.chip_wram[offset % CHIP_WRAM_SIZE],
            0x04 => self.read_io(address),
            0x08 | 0x09 => {
                let offset = offset & 0x01FF_FFFF;
                if offset < self.rom.len() {
                    self.rom[offset]
                } else {
                    0
                }
            }
            _ => 0,
        }
    }

    fn write_raw(&mut self, address: u32, value: u8) {
        let offset = address as usize;
        match address >> 24 {
            0x02 => self.board_wram[offset % BOARD_WRAM_SIZE] = value,
            0x03 => self.chip_wram[offset % CHIP_WRAM_SIZE] = value,
            0x04 => self.write_io(address, value),
            // BIOS and cartridge space are read-only, everything else is
            // open bus.
            _ => {}
        }
    }

    fn read_io(&self, address: u32) -> u8 {
        match address {
            IE_ADDRESS => self.interrupt_enable.get_bits(0..=7) as u8,
            0x0400_0201 => self.interrupt_enable.get_bits(8..=15) as u8,
            IF_ADDRESS => self.interrupt_request.get_bits(0..=7) as u8,
            0x0400_0203 => self.interrupt_request.get_bits(8..=15) as u8,
            WAITCNT_ADDRESS => self.wait_control.get_bits(0..=7) as u8,
            0x0400_0205 => self.wait_control.get_bits(8..=15) as u8,
            IME_ADDRESS => self.interrupt_master_enable.get_bits(0..=7) as u8,
            0x0400_0209 => self.interrupt_master_enable.get_bits(8..=15) as u8,
            _ => 0,
        }
    }

    fn write_io(&mut self, address: u32, value: u8) {
        match address {
            IE_ADDRESS => {
                self.interrupt_enable =
                    (self.interrupt_enable & 0xFF00) | u16::from(value);
            }
            0x0400_0201 => {
                self.interrupt_enable =
                    (self.interrupt_enable & 0x00FF) | (u16::from(value) << 8);
            }
            // IF is write-one-to-clear: storing a 1 acknowledges the source.
            IF_ADDRESS => self.interrupt_request &= !u16::from(value),
            0x0400_0203 => self.interrupt_request &= !(u16::from(value) << 8),
            WAITCNT_ADDRESS => {
                self.wait_control = (self.wait_control & 0xFF00) | u16::from(value);
            }
            0x0400_0205 => {
                self.wait_control = (self.wait_control & 0x00FF) | (u16::from(value) << 8);
            }
            IME_ADDRESS => {
                self.interrupt_master_enable =
                    (self.interrupt_master_enable & 0xFF00) | u16::from(value);
            }
            0x0400_0209 => {
                self.interrupt_master_enable =
                    (self.interrupt_master_enable & 0x00FF) | (u16::from(value) << 8);
            }
            _ => {}
        }
    }

    /// Wait states for one physical access in the region of `address`.
    fn wait_states(&self, address: u32, sequential: bool) -> u32 {
        match address >> 24 {
            // Board WRAM sits on a 16-bit bus with 2 wait states.
            0x02 => 2,
            // Cartridge space, WAITCNT defaults: 4 waits non-sequential,
            // 2 sequential.
            0x08 | 0x09 => {
                if sequential {
                    2
                } else {
                    4
                }
            }
            // BIOS, chip WRAM and I/O respond in a single cycle.
            _ => 0,
        }
    }

    /// True for the regions whose data path is 16 bits wide, where a word
    /// access is performed as two halfword accesses.
    fn is_narrow_bus(address: u32) -> bool {
        matches!(address >> 24, 0x02 | 0x08 | 0x09)
    }
}

impl Bus for GbaBus {
    fn read_byte(&mut self, address: u32, cycle: CycleType) -> u8 {
        self.add_cycle_to_timeline(cycle, address, TransferSize::Byte);
        self.read_raw(address)
    }

    fn read_half_word(&mut self, address: u32, cycle: CycleType) -> u16 {
        let address = address & !1;
        self.add_cycle_to_timeline(cycle, address, TransferSize::HalfWord);

        u16::from(self.read_raw(address)) | (u16::from(self.read_raw(address + 1)) << 8)
    }

    fn read_word(&mut self, address: u32, cycle: CycleType) -> u32 {
        let address = address & !3;
        self.add_cycle_to_timeline(cycle, address, TransferSize::Word);

        u32::from(self.read_raw(address))
            | (u32::from(self.read_raw(address + 1)) << 8)
            | (u32::from(self.read_raw(address + 2)) << 16)
            | (u32::from(self.read_raw(address + 3)) << 24)
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        self.add_cycle_to_timeline(CycleType::NonSequential, address, TransferSize::Byte);
        self.write_raw(address, value);
    }

    fn write_half_word(&mut self, address: u32, value: u16) {
        let address = address & !1;
        self.add_cycle_to_timeline(CycleType::NonSequential, address, TransferSize::HalfWord);

        self.write_raw(address, value.get_bits(0..=7) as u8);
        self.write_raw(address + 1, value.get_bits(8..=15) as u8);
    }

    fn write_word(&mut self, address: u32, value: u32) {
        let address = address & !3;
        self.add_cycle_to_timeline(CycleType::NonSequential, address, TransferSize::Word);

        self.write_raw(address, value.get_bits(0..=7) as u8);
        self.write_raw(address + 1, value.get_bits(8..=15) as u8);
        self.write_raw(address + 2, value.get_bits(16..=23) as u8);
        self.write_raw(address + 3, value.get_bits(24..=31) as u8);
    }

    fn reset_cycle_timeline(&mut self) {
        self.access_cycles = 0;
    }

    fn add_cycle_to_timeline(&mut self, cycle: CycleType, address: u32, size: TransferSize) {
        if cycle == CycleType::Internal {
            self.access_cycles += 1;
            return;
        }

        let sequential = cycle == CycleType::Sequential;
        let single_access = 1 + self.wait_states(address, sequential);

        // A word on a 16-bit data path costs a second, sequential access.
        self.access_cycles +=
            if size == TransferSize::Word && Self::is_narrow_bus(address) {
                single_access + 1 + self.wait_states(address, true)
            } else {
                single_access
            };
    }

    fn memory_access_cycles(&self) -> u32 {
        self.access_cycles
    }

    fn ime(&self) -> bool {
        self.interrupt_master_enable.get_bit(0)
    }

    fn interrupt_enable(&self) -> u16 {
        self.interrupt_enable & INTERRUPT_SOURCES_MASK
    }

    fn interrupt_flags(&self) -> u16 {
        self.interrupt_request & INTERRUPT_SOURCES_MASK
    }

    fn request_interrupt(&mut self, interrupt: Interrupt) {
        self.interrupt_request |= interrupt as u16;
    }
}
