//! Constant-product AMM math
//!
//! Integer math throughout; the fee is expressed as numerator/denominator
//! (997/1000 for the standard 0.3% fee). These values feed the on-chain
//! minimum-output guard, so rounding always floors.

use ethers::types::U256;

/// Standard Uniswap V2 fee numerator
pub const FEE_NUMERATOR: u32 = 997;
/// Fee denominator
pub const FEE_DENOMINATOR: u32 = 1000;

/// Expected output for an exact input through one pool:
/// `amountOut = (amountIn*fee*reserveOut) / (reserveIn*1000 + amountIn*fee)`
pub fn amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
    if reserve_in.is_zero() || reserve_out.is_zero() || amount_in.is_zero() {
        return U256::zero();
    }

    let amount_in_with_fee = amount_in * U256::from(FEE_NUMERATOR);
    let numerator = amount_in_with_fee * reserve_out;
    let denominator = reserve_in * U256::from(FEE_DENOMINATOR) + amount_in_with_fee;
    numerator / denominator
}

/// Price impact of a trade as a fraction of the no-fee spot output:
/// `1 - amountOutWithFee / amountOutWithoutFee`, in percent
pub fn price_impact_pct(amount_in: U256, reserve_in: U256, reserve_out: U256) -> f64 {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return 100.0;
    }

    let without_fee = to_f64(amount_in) * to_f64(reserve_out) / to_f64(reserve_in);
    if without_fee == 0.0 {
        return 100.0;
    }

    let with_fee = to_f64(amount_out(amount_in, reserve_in, reserve_out));
    ((1.0 - with_fee / without_fee) * 100.0).max(0.0)
}

/// Minimum acceptable output under the slippage tolerance:
/// `floor(expected * (10000 - slippage_bps) / 10000)`
pub fn min_amount_out(expected: U256, slippage_bps: u32) -> U256 {
    let bps = slippage_bps.min(10000);
    expected * U256::from(10000 - bps) / U256::from(10000u64)
}

/// Convert a percentage tolerance to basis points
pub fn pct_to_bps(pct: f64) -> u32 {
    (pct * 100.0).round().clamp(0.0, 10000.0) as u32
}

fn to_f64(value: U256) -> f64 {
    value.to_string().parse().unwrap_or(f64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_out_exact_integers() {
        // reserves (1000, 1000), fee 997/1000, amountIn = 100:
        // floor(100*997*1000 / (1000*1000 + 100*997)) = floor(99700000/1099700)
        let out = amount_out(
            U256::from(100u64),
            U256::from(1000u64),
            U256::from(1000u64),
        );
        assert_eq!(out, U256::from(90u64));
        // Price impact > 0: output strictly below the input on a balanced pool
        assert!(out < U256::from(100u64));
    }

    #[test]
    fn test_amount_out_empty_reserves() {
        assert_eq!(
            amount_out(U256::from(100u64), U256::zero(), U256::from(1000u64)),
            U256::zero()
        );
        assert_eq!(
            amount_out(U256::zero(), U256::from(1000u64), U256::from(1000u64)),
            U256::zero()
        );
    }

    #[test]
    fn test_price_impact_positive_and_bounded() {
        let impact = price_impact_pct(
            U256::from(100u64),
            U256::from(1000u64),
            U256::from(1000u64),
        );
        assert!(impact > 0.0);
        assert!(impact < 100.0);

        // Small trade against deep reserves approaches the bare fee
        let small = price_impact_pct(U256::exp10(6), U256::exp10(12), U256::exp10(12));
        assert!(small < 1.0);

        assert_eq!(
            price_impact_pct(U256::from(100u64), U256::zero(), U256::zero()),
            100.0
        );
    }

    #[test]
    fn test_min_amount_out_five_percent() {
        // expectedOut = 1000, slippage 5% => 950
        assert_eq!(
            min_amount_out(U256::from(1000u64), 500),
            U256::from(950u64)
        );
    }

    #[test]
    fn test_min_amount_out_floors() {
        // 999 * 9950 / 10000 = 994.005 -> 994
        assert_eq!(min_amount_out(U256::from(999u64), 50), U256::from(994u64));
    }

    #[test]
    fn test_pct_to_bps() {
        assert_eq!(pct_to_bps(5.0), 500);
        assert_eq!(pct_to_bps(0.5), 50);
        assert_eq!(pct_to_bps(100.0), 10000);
        assert_eq!(pct_to_bps(200.0), 10000);
    }
}
