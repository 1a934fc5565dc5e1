//! Fixed-point arithmetic helpers
//!
//! Amounts, powers, and the reward accumulator are all `u128` in 1e18
//! fixed point, so products routinely exceed 128 bits. Every scaled
//! multiply goes through a 256-bit intermediate and truncates on divide;
//! nothing in the engine ever rounds up.

use alloy_primitives::U256;

/// `a * b / denom` with a 256-bit intermediate, truncating
///
/// A zero denominator yields zero rather than panicking; callers treat an
/// empty pool or window as "nothing owed".
pub fn mul_div(a: u128, b: u128, denom: u128) -> u128 {
    if denom == 0 {
        return 0;
    }
    let wide = U256::from(a) * U256::from(b) / U256::from(denom);
    wide.saturating_to::<u128>()
}
