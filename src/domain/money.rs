//! Minor-currency-unit money handling.
//!
//! Amounts enter the API as decimal strings (`"100.00"`, `"100,00"`,
//! `"5000"`) and are stored and transmitted as integer cents. No
//! floating-point arithmetic touches currency values.

/// Money parsing failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    /// Empty or whitespace-only input.
    #[error("amount is empty")]
    Empty,
    /// Both `,` and `.` present.
    #[error("use a single decimal separator")]
    MixedSeparators,
    /// More than one separator, or digits missing around it.
    #[error("invalid decimal format")]
    InvalidFormat,
    /// More than two fractional digits.
    #[error("at most 2 decimal places allowed")]
    TooManyDecimals,
    /// Non-digit characters in a numeric part.
    #[error("amount must contain only digits")]
    NotDigits,
    /// Value does not fit the minor-unit integer range.
    #[error("amount too large")]
    TooLarge,
    /// Zero or negative result.
    #[error("amount must be greater than zero")]
    NonPositive,
}

/// Parses a decimal amount string into cents.
///
/// Accepts `,` or `.` as the decimal separator (not both), at most two
/// fractional digits, and plain integers (already whole currency
/// units: `"50"` is 5000 cents).
///
/// # Errors
///
/// Returns a [`MoneyError`] describing the first violation found.
pub fn parse_amount_to_cents(amount: &str) -> Result<i64, MoneyError> {
    let value = amount.trim();
    if value.is_empty() {
        return Err(MoneyError::Empty);
    }

    if value.contains(',') && value.contains('.') {
        return Err(MoneyError::MixedSeparators);
    }
    let value = value.replace(',', ".");

    let cents = if let Some((int_part, frac_part)) = value.split_once('.') {
        if frac_part.contains('.') {
            return Err(MoneyError::InvalidFormat);
        }
        let int_part = if int_part.is_empty() { "0" } else { int_part };
        if !is_digits(int_part) || !(frac_part.is_empty() || is_digits(frac_part)) {
            return Err(MoneyError::NotDigits);
        }
        if frac_part.len() > 2 {
            return Err(MoneyError::TooManyDecimals);
        }
        // Parts are all-digit at this point; parse only fails on overflow.
        let int_val: i64 = int_part.parse().map_err(|_| MoneyError::TooLarge)?;
        let frac_val: i64 = match frac_part.len() {
            0 => 0,
            1 => frac_part.parse::<i64>().map_err(|_| MoneyError::InvalidFormat)? * 10,
            _ => frac_part.parse().map_err(|_| MoneyError::InvalidFormat)?,
        };
        int_val
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac_val))
            .ok_or(MoneyError::TooLarge)?
    } else {
        if !is_digits(&value) {
            return Err(MoneyError::NotDigits);
        }
        let units: i64 = value.parse().map_err(|_| MoneyError::TooLarge)?;
        units.checked_mul(100).ok_or(MoneyError::TooLarge)?
    };

    if cents <= 0 {
        return Err(MoneyError::NonPositive);
    }
    Ok(cents)
}

/// Formats cents as a two-decimal string (`9000` → `"90.00"`), the
/// shape the PIX provider expects for charge values.
#[must_use]
pub fn format_cents(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, (cents % 100).abs())
}

/// Net amount after deducting the platform fee, in cents.
///
/// `fee_bps` is the fee in basis points (1000 = 10%). Integer
/// arithmetic, rounding down.
#[must_use]
pub const fn net_of_fee(gross_cents: i64, fee_bps: u32) -> i64 {
    gross_cents - gross_cents * fee_bps as i64 / 10_000
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parses_dot_and_comma_separators() {
        assert_eq!(parse_amount_to_cents("100.00"), Ok(10_000));
        assert_eq!(parse_amount_to_cents("100,00"), Ok(10_000));
        assert_eq!(parse_amount_to_cents("0.5"), Ok(50));
        assert_eq!(parse_amount_to_cents(".99"), Ok(99));
        assert_eq!(parse_amount_to_cents("12."), Ok(1_200));
    }

    #[test]
    fn plain_integer_is_whole_units() {
        assert_eq!(parse_amount_to_cents("50"), Ok(5_000));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_amount_to_cents(""), Err(MoneyError::Empty));
        assert_eq!(
            parse_amount_to_cents("1.000,00"),
            Err(MoneyError::MixedSeparators)
        );
        assert_eq!(
            parse_amount_to_cents("1.234"),
            Err(MoneyError::TooManyDecimals)
        );
        assert_eq!(parse_amount_to_cents("10a"), Err(MoneyError::NotDigits));
        assert_eq!(parse_amount_to_cents("0"), Err(MoneyError::NonPositive));
        assert_eq!(parse_amount_to_cents("0.00"), Err(MoneyError::NonPositive));
    }

    #[test]
    fn oversized_amounts_are_rejected_not_overflowed() {
        assert_eq!(
            parse_amount_to_cents("100000000000000000.00"),
            Err(MoneyError::TooLarge)
        );
        assert_eq!(
            parse_amount_to_cents("99999999999999999999"),
            Err(MoneyError::TooLarge)
        );
        assert_eq!(
            parse_amount_to_cents("92233720368547758.07"),
            Ok(9_223_372_036_854_775_807)
        );
    }

    #[test]
    fn single_fraction_digit_scales_to_tens() {
        assert_eq!(parse_amount_to_cents("12.3"), Ok(1_230));
    }

    #[test]
    fn format_cents_pads_fraction() {
        assert_eq!(format_cents(9_000), "90.00");
        assert_eq!(format_cents(101), "1.01");
        assert_eq!(format_cents(50), "0.50");
    }

    #[test]
    fn ten_percent_fee_on_hundred() {
        assert_eq!(net_of_fee(10_000, 1_000), 9_000);
        assert_eq!(net_of_fee(101, 1_000), 91);
    }
}
