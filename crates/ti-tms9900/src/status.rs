//! Status register bits and flag computation.
//!
//! ST0-ST6 hold the comparison/arithmetic flags, ST7-ST11 are unused on
//! the 9900, and ST12-ST15 hold the interrupt mask.

/// Logical greater than (ST0).
pub const ST_LGT: u16 = 0x8000;
/// Arithmetic greater than (ST1).
pub const ST_AGT: u16 = 0x4000;
/// Equal (ST2).
pub const ST_EQ: u16 = 0x2000;
/// Carry (ST3).
pub const ST_C: u16 = 0x1000;
/// Overflow (ST4).
pub const ST_OV: u16 = 0x0800;
/// Odd parity (ST5, byte operations only).
pub const ST_OP: u16 = 0x0400;
/// XOP in progress (ST6).
pub const ST_X: u16 = 0x0200;
/// Interrupt mask (ST12-ST15).
pub const ST_INT_MASK: u16 = 0x000F;

/// All flag bits cleared by a fresh L>/A>/EQ computation.
pub(crate) const LAE: u16 = ST_LGT | ST_AGT | ST_EQ;

/// L>/A>/EQ for a word result compared against zero.
#[must_use]
pub(crate) fn lae_word(value: u16) -> u16 {
    if value == 0 {
        ST_EQ
    } else if value & 0x8000 == 0 {
        ST_LGT | ST_AGT
    } else {
        ST_LGT
    }
}

/// L>/A>/EQ for a byte result compared against zero.
#[must_use]
pub(crate) fn lae_byte(value: u8) -> u16 {
    if value == 0 {
        ST_EQ
    } else if value & 0x80 == 0 {
        ST_LGT | ST_AGT
    } else {
        ST_LGT
    }
}

/// L>/A>/EQ for a word comparison of source against destination.
#[must_use]
pub(crate) fn compare_word(s: u16, d: u16) -> u16 {
    let mut st = 0;
    if s == d {
        st |= ST_EQ;
    }
    if s > d {
        st |= ST_LGT;
    }
    if (s as i16) > (d as i16) {
        st |= ST_AGT;
    }
    st
}

/// L>/A>/EQ for a byte comparison of source against destination.
#[must_use]
pub(crate) fn compare_byte(s: u8, d: u8) -> u16 {
    let mut st = 0;
    if s == d {
        st |= ST_EQ;
    }
    if s > d {
        st |= ST_LGT;
    }
    if (s as i8) > (d as i8) {
        st |= ST_AGT;
    }
    st
}

/// OP bit for a byte value (set when the number of one bits is odd).
#[must_use]
pub(crate) fn odd_parity(value: u8) -> u16 {
    if value.count_ones() & 1 == 1 { ST_OP } else { 0 }
}
