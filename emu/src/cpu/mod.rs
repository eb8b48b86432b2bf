//! # ARM7TDMI Processor Core
//!
//! A cycle-stepped interpreter of the ARMv4T instruction set as found in the
//! Game Boy Advance. The CPU owns only its architectural state; everything
//! else lives behind the [`Bus`](crate::bus::Bus) trait.
//!
//! ## ARM vs Thumb
//!
//! The processor runs in one of two states, selected by the T bit of the
//! CPSR:
//!
//! - **ARM** (T=0): 32-bit, word-aligned instructions, each carrying a 4-bit
//!   condition field.
//! - **Thumb** (T=1): 16-bit, halfword-aligned instructions; only branches
//!   are conditional, and arithmetic sets flags unconditionally.
//!
//! The fetch width follows the T bit on every step, and `BX` switches state
//! from the low bit of its target.
//!
//! ## The pipeline, observably
//!
//! The real chip has a three-stage fetch/decode/execute pipeline. The core
//! models the observable part of it: one prefetched instruction word, a PC
//! that is one fetch ahead while an instruction executes, and operand reads
//! of r15 that see the instruction address plus 8 (ARM) or plus 4 (Thumb).
//! On a branch the prefetch slot is discarded and the next fetch is
//! classified as a [`CycleType::Branch`](crate::bus::CycleType) access.
//!
//! ## Module structure
//!
//! - [`arm7tdmi`] - CPU state, the step loop, exception entry
//! - [`alu`] - flag arithmetic and the barrel shifter
//! - [`registers`] - register file with banked registers
//! - [`psr`] - program status registers
//! - [`condition`] / [`cpu_modes`] / [`flags`] - field types
//! - [`arm`] / [`thumb`] - the two decoders and their handler sets

pub mod alu;
pub mod arm;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_lossless)]
#[allow(clippy::module_name_repetitions)]
pub mod arm7tdmi;
pub mod condition;
pub mod cpu_modes;
pub mod flags;
pub mod psr;
pub mod registers;
pub mod thumb;

/// How the next instruction fetch relates to the one that just executed.
///
/// Every handler returns one of these: [`FetchAccess::Branch`] if and only if
/// r15 was written or an exception was taken, [`FetchAccess::Sequential`]
/// otherwise. The execution loop turns it into the cycle classification of
/// the next fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchAccess {
    /// The next instruction follows the previous fetch address.
    Sequential,

    /// The prefetch slot was discarded by a write to r15.
    Branch,
}
