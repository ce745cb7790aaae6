//! Allocation-free decimal formatting for command serialization.

/// Write a u8 in decimal. Returns the number of bytes written (1-3).
///
/// # Panics
///
/// Panics if `buf` is shorter than the rendered value.
#[inline]
pub fn write_u8(buf: &mut [u8], value: u8) -> usize {
    write_decimal(buf, u32::from(value))
}

/// Write a u16 in decimal. Returns the number of bytes written (1-5).
///
/// # Panics
///
/// Panics if `buf` is shorter than the rendered value.
#[inline]
pub fn write_u16(buf: &mut [u8], value: u16) -> usize {
    write_decimal(buf, u32::from(value))
}

fn write_decimal(buf: &mut [u8], mut value: u32) -> usize {
    // Digits are produced least significant first, then copied out reversed
    let mut digits = [0u8; 10];
    let mut len = 0;
    loop {
        digits[len] = b'0' + (value % 10) as u8;
        value /= 10;
        len += 1;
        if value == 0 {
            break;
        }
    }

    for (slot, digit) in buf[..len].iter_mut().zip(digits[..len].iter().rev()) {
        *slot = *digit;
    }
    len
}
