//! # Flag Arithmetic and Barrel Shifter
//!
//! Pure functions only: every operation takes unsigned 32-bit words and
//! returns an [`ArithmeticOpResult`] carrying the result and the four
//! condition flags. Nothing in here touches CPU state, which keeps the flag
//! rules testable in isolation.
//!
//! ## Carry conventions
//!
//! - **Add**: C means the 32-bit sum overflowed.
//! - **Sub**: C means *no borrow* (`a >= b`), the ARM convention.
//! - **With carry**: C is the carry out of the 33-bit sum; SBC is encoded as
//!   `a + NOT b + Cin`.
//! - **Logical**: C comes from the barrel shifter, V is preserved.
//!
//! ## The barrel shifter
//!
//! Operand 2 of a data processing instruction goes through the shifter, which
//! has two distinct operand forms with different corner cases:
//!
//! - [`shift_immediate`]: the 5-bit shift field, where a zero amount encodes
//!   LSR #32, ASR #32 and RRX.
//! - [`shift_register`]: the low byte of Rs, where zero leaves the value and
//!   carry untouched and amounts of 32 and beyond have their own rules.
//! - [`rotate_immediate`]: the 8-bit immediate rotated right by twice the
//!   4-bit rotate field.

use crate::bitwise::Bits;

/// Result of an ALU or shift operation, including flags.
///
/// The shifter entry points only fill `result` and `carry`; the remaining
/// flags stay at their default and are computed by the ALU step.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ArithmeticOpResult {
    pub result: u32,
    /// Carry flag (C): last bit shifted out, or unsigned overflow.
    pub carry: bool,
    /// Overflow flag (V): signed arithmetic overflow.
    pub overflow: bool,
    /// Sign flag (N): bit 31 of result.
    pub sign: bool,
    /// Zero flag (Z): result is zero.
    pub zero: bool,
}

/// `a + b` with the full flag set.
pub fn add(first_op: u32, second_op: u32) -> ArithmeticOpResult {
    // The sum is done in 64 bits so that bit 32 is the carry.
    let wide = u64::from(first_op) + u64::from(second_op);
    let result = wide as u32;

    let sign_op1 = first_op.get_bit(31);
    let sign_op2 = second_op.get_bit(31);
    let sign_r = result.get_bit(31);

    ArithmeticOpResult {
        result,
        carry: wide > u64::from(u32::MAX),
        // Overflow only occurs when the operands have the same sign and the
        // result has the opposite one.
        overflow: (sign_op1 == sign_op2) && (sign_r != sign_op1),
        sign: sign_r,
        zero: result == 0,
    }
}

/// `a - b`. C set means no borrow occurred (`a >= b`).
pub fn sub(first_op: u32, second_op: u32) -> ArithmeticOpResult {
    let result = first_op.wrapping_sub(second_op);

    let sign_op1 = first_op.get_bit(31);
    let sign_op2 = second_op.get_bit(31);
    let sign_r = result.get_bit(31);

    ArithmeticOpResult {
        result,
        carry: first_op >= second_op,
        overflow: (sign_op1 != sign_op2) && (sign_r != sign_op1),
        sign: sign_r,
        zero: result == 0,
    }
}

/// `a + b + Cin`, carry out of the 33-bit sum.
pub fn adc(first_op: u32, second_op: u32, carry_in: bool) -> ArithmeticOpResult {
    let wide = u64::from(first_op) + u64::from(second_op) + u64::from(carry_in);
    let result = wide as u32;

    let sign_op1 = first_op.get_bit(31);
    let sign_op2 = second_op.get_bit(31);
    let sign_r = result.get_bit(31);

    ArithmeticOpResult {
        result,
        carry: wide > u64::from(u32::MAX),
        overflow: (sign_op1 == sign_op2) && (sign_r != sign_op1),
        sign: sign_r,
        zero: result == 0,
    }
}

/// `a - b - (1 - Cin)`, encoded as `a + NOT b + Cin`.
pub fn sbc(first_op: u32, second_op: u32, carry_in: bool) -> ArithmeticOpResult {
    let wide = u64::from(first_op) + u64::from(!second_op) + u64::from(carry_in);
    let result = wide as u32;

    let sign_op1 = first_op.get_bit(31);
    let sign_op2 = second_op.get_bit(31);
    let sign_r = result.get_bit(31);

    ArithmeticOpResult {
        result,
        carry: wide > u64::from(u32::MAX),
        overflow: (sign_op1 != sign_op2) && (sign_r != sign_op1),
        sign: sign_r,
        zero: result == 0,
    }
}

/// Flags for the logical class: N and Z from the result, C from the shifter,
/// V preserved from the caller.
pub fn logical(result: u32, shifter_carry: bool, overflow: bool) -> ArithmeticOpResult {
    ArithmeticOpResult {
        result,
        carry: shifter_carry,
        overflow,
        sign: result.get_bit(31),
        zero: result == 0,
    }
}

/// Shift Type (0=LSL, 1=LSR, 2=ASR, 3=ROR)
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ShiftKind {
    Lsl = 0,
    Lsr = 1,
    Asr = 2,
    Ror = 3,
}

impl From<u32> for ShiftKind {
    fn from(op_code: u32) -> Self {
        match op_code {
            0 => Self::Lsl,
            1 => Self::Lsr,
            2 => Self::Asr,
            3 => Self::Ror,
            _ => unreachable!(),
        }
    }
}

impl From<u16> for ShiftKind {
    fn from(op_code: u16) -> Self {
        u32::from(op_code).into()
    }
}

/// Shifts `rm` by the 5-bit immediate amount of the instruction.
///
/// A zero amount selects the special encodings: LSL #0 leaves the value and
/// carry untouched, LSR #0 means LSR #32, ASR #0 means ASR #32, and ROR #0
/// means RRX (33-bit rotate through the carry flag).
pub fn shift_immediate(kind: ShiftKind, amount: u32, rm: u32, carry: bool) -> ArithmeticOpResult {
    debug_assert!(amount < 32);

    match kind {
        ShiftKind::Lsl => match amount {
            // LSL#0: no shift performed, the C flag is NOT affected.
            0 => ArithmeticOpResult {
                result: rm,
                carry,
                ..Default::default()
            },
            _ => ArithmeticOpResult {
                result: rm << amount,
                carry: rm.get_bit((32 - amount) as u8),
                ..Default::default()
            },
        },
        ShiftKind::Lsr => match amount {
            // LSR#0 encodes LSR#32: zero result, carry is bit 31 of Rm.
            0 => ArithmeticOpResult {
                result: 0,
                carry: rm.get_bit(31),
                ..Default::default()
            },
            _ => ArithmeticOpResult {
                result: rm >> amount,
                carry: rm.get_bit((amount - 1) as u8),
                ..Default::default()
            },
        },
        ShiftKind::Asr => match amount {
            // ASR#0 encodes ASR#32: every result bit equals bit 31 of Rm.
            0 => ArithmeticOpResult {
                result: ((rm as i32) >> 31) as u32,
                carry: rm.get_bit(31),
                ..Default::default()
            },
            _ => ArithmeticOpResult {
                result: ((rm as i32) >> amount) as u32,
                carry: rm.get_bit((amount - 1) as u8),
                ..Default::default()
            },
        },
        ShiftKind::Ror => match amount {
            // ROR#0 encodes RRX: rotate right by one through the carry flag.
            0 => ArithmeticOpResult {
                result: (rm >> 1) | (u32::from(carry) << 31),
                carry: rm.get_bit(0),
                ..Default::default()
            },
            _ => ArithmeticOpResult {
                result: rm.rotate_right(amount),
                carry: rm.get_bit((amount - 1) as u8),
                ..Default::default()
            },
        },
    }
}

/// Shifts `rm` by a register-supplied amount (the low byte of Rs).
///
/// Zero leaves value and carry untouched for every shift type. Amounts of 32
/// and above fall off the end of the datapath and have their own carry rules.
pub fn shift_register(kind: ShiftKind, amount: u32, rm: u32, carry: bool) -> ArithmeticOpResult {
    debug_assert!(amount < 256);

    if amount == 0 {
        return ArithmeticOpResult {
            result: rm,
            carry,
            ..Default::default()
        };
    }

    match kind {
        ShiftKind::Lsl => match amount {
            1..=31 => ArithmeticOpResult {
                result: rm << amount,
                carry: rm.get_bit((32 - amount) as u8),
                ..Default::default()
            },
            // LSL#32: everything shifted out, bit 0 is the last one to leave.
            32 => ArithmeticOpResult {
                result: 0,
                carry: rm.get_bit(0),
                ..Default::default()
            },
            _ => ArithmeticOpResult {
                result: 0,
                carry: false,
                ..Default::default()
            },
        },
        ShiftKind::Lsr => match amount {
            1..=31 => ArithmeticOpResult {
                result: rm >> amount,
                carry: rm.get_bit((amount - 1) as u8),
                ..Default::default()
            },
            32 => ArithmeticOpResult {
                result: 0,
                carry: rm.get_bit(31),
                ..Default::default()
            },
            _ => ArithmeticOpResult {
                result: 0,
                carry: false,
                ..Default::default()
            },
        },
        ShiftKind::Asr => match amount {
            1..=31 => ArithmeticOpResult {
                result: ((rm as i32) >> amount) as u32,
                carry: rm.get_bit((amount - 1) as u8),
                ..Default::default()
            },
            // ASR#32 and beyond: the sign bit floods the result.
            _ => ArithmeticOpResult {
                result: ((rm as i32) >> 31) as u32,
                carry: rm.get_bit(31),
                ..Default::default()
            },
        },
        ShiftKind::Ror => {
            // ROR by n > 32 behaves like ROR by n - 32, so only the amount
            // modulo 32 matters, with multiples of 32 acting as ROR#32.
            let amount = amount % 32;
            if amount == 0 {
                ArithmeticOpResult {
                    result: rm,
                    carry: rm.get_bit(31),
                    ..Default::default()
                }
            } else {
                ArithmeticOpResult {
                    result: rm.rotate_right(amount),
                    carry: rm.get_bit((amount - 1) as u8),
                    ..Default::default()
                }
            }
        }
    }
}

/// Rotates the zero-extended 8-bit immediate right by `rotate` (already
/// doubled from the 4-bit field). A zero rotation preserves the carry flag.
pub fn rotate_immediate(immediate: u32, rotate: u32, carry: bool) -> ArithmeticOpResult {
    debug_assert!(immediate <= 0xFF);
    debug_assert!(rotate < 32 && rotate % 2 == 0);

    if rotate == 0 {
        ArithmeticOpResult {
            result: immediate,
            carry,
            ..Default::default()
        }
    } else {
        ArithmeticOpResult {
            result: immediate.rotate_right(rotate),
            carry: immediate.get_bit((rotate - 1) as u8),
            ..Default::default()
        }
    }
}
