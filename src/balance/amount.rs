use std::fmt;

const MAX_DECIMALS: u8 = 38;
const EXACT_FRACTION_DIGITS: u32 = 6;
const MIN_FRACTION_DIGITS: usize = 2;

/// Token balance in base units together with the token's decimals.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TokenAmount {
    raw: u128,
    decimals: u8,
}

impl TokenAmount {
    /// Decimals above 38 cannot be scaled within `u128` and are clamped.
    pub fn new(raw: u128, decimals: u8) -> Self {
        Self {
            raw,
            decimals: decimals.min(MAX_DECIMALS),
        }
    }

    pub fn raw(&self) -> u128 {
        self.raw
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }

    /// Between two and six fraction digits, trailing zeros trimmed.
    pub fn exact(&self) -> String {
        let (whole, fraction) = self.rounded(EXACT_FRACTION_DIGITS);
        let digits = format!("{fraction:0width$}", width = EXACT_FRACTION_DIGITS as usize);
        let trimmed = digits.trim_end_matches('0');
        format!("{whole}.{trimmed:0<width$}", width = MIN_FRACTION_DIGITS)
    }

    /// `1.2M`, `3.4K`, otherwise two fraction digits.
    pub fn compact(&self) -> String {
        let (whole, cents) = self.rounded(2);
        if whole < 1_000 {
            return format!("{whole}.{cents:02}");
        }
        let tenths_of_k = whole.saturating_add(50) / 100;
        if tenths_of_k < 10_000 {
            return format!("{}.{}K", tenths_of_k / 10, tenths_of_k % 10);
        }
        let tenths_of_m = whole.saturating_add(50_000) / 100_000;
        format!("{}.{}M", tenths_of_m / 10, tenths_of_m % 10)
    }

    /// Whole units and the fraction rounded half-up to `digits` places.
    fn rounded(&self, digits: u32) -> (u128, u128) {
        let decimals = u32::from(self.decimals);
        let scale = 10u128.pow(decimals);
        let mut whole = self.raw / scale;
        let remainder = self.raw % scale;
        let fraction = if decimals <= digits {
            remainder * 10u128.pow(digits - decimals)
        } else {
            let divisor = 10u128.pow(decimals - digits);
            let mut fraction = remainder / divisor;
            if (remainder % divisor) * 2 >= divisor {
                fraction += 1;
            }
            if fraction == 10u128.pow(digits) {
                whole = whole.saturating_add(1);
                fraction = 0;
            }
            fraction
        };
        (whole, fraction)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.exact())
    }
}
