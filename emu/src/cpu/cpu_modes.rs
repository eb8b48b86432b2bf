//! # ARM7TDMI Operating Modes
//!
//! The processor has seven operating modes, encoded in bits 4-0 of the CPSR:
//!
//! ```text
//! ┌─────────────┬──────────┬───────────────────────────────────────────────┐
//! │    Mode     │  Binary  │                  Purpose                      │
//! ├─────────────┼──────────┼───────────────────────────────────────────────┤
//! │ User        │  10000   │ Normal program execution (unprivileged)       │
//! │ FIQ         │  10001   │ Fast interrupt handling                       │
//! │ IRQ         │  10010   │ General interrupt handling                    │
//! │ Supervisor  │  10011   │ Protected mode for OS (software interrupt)    │
//! │ Abort       │  10111   │ Memory access failures                        │
//! │ Undefined   │  11011   │ Undefined instruction handling                │
//! │ System      │  11111   │ Privileged mode sharing User registers        │
//! └─────────────┴──────────┴───────────────────────────────────────────────┘
//! ```
//!
//! Each exception mode sees its own banked copies of some registers, see
//! [`registers`](super::registers). Changing the mode bits atomically
//! reconfigures which physical registers are visible.

use serde::{Deserialize, Serialize};

/// The CPU operating mode, stored in bits 0-4 of the CPSR/SPSR.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Mode {
    /// Normal program execution state (unprivileged).
    User = 0b10000,

    /// Fast Interrupt Request mode. Has the most banked registers (R8-R14)
    /// for minimal context-save overhead.
    Fiq = 0b10001,

    /// Interrupt Request mode, entered through the IRQ vector at 0x18.
    Irq = 0b10010,

    /// Supervisor mode (privileged), entered via Reset or SWI.
    Supervisor = 0b10011,

    /// Abort mode, entered after a data or prefetch abort.
    Abort = 0b10111,

    /// Undefined instruction mode.
    Undefined = 0b11011,

    /// System mode (privileged, but shares User registers).
    System = 0b11111,
}

impl From<Mode> for u32 {
    fn from(m: Mode) -> Self {
        m as Self
    }
}

impl TryFrom<u32> for Mode {
    type Error = String;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            0b10000 => Ok(Self::User),
            0b10001 => Ok(Self::Fiq),
            0b10010 => Ok(Self::Irq),
            0b10011 => Ok(Self::Supervisor),
            0b10111 => Ok(Self::Abort),
            0b11011 => Ok(Self::Undefined),
            0b11111 => Ok(Self::System),
            _ => Err(String::from("Unexpected value for Mode")),
        }
    }
}
