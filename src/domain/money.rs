use std::fmt;

/// Amounts are integer minor units (sen), so Rp 1.500.000,00 = 150_000_000.
pub type Amount = i64;

/// Number of minor units in one whole currency unit.
pub const MINOR_UNITS: Amount = 100;

/// Largest amount a single entry may hold. Leaves headroom so that
/// per-contract and ledger-wide sums cannot overflow.
pub const MAX_AMOUNT: Amount = i64::MAX / 1024;

/// Convert whole currency units into minor units.
pub const fn whole(units: i64) -> Amount {
    units * MINOR_UNITS
}

/// Format an amount with grouped thousands and two decimals.
/// Example: 150_000_000 -> "1,500,000.00", -1234 -> "-12.34"
pub fn format_amount(amount: Amount) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    let units = (abs / MINOR_UNITS as u64).to_string();
    let fraction = abs % MINOR_UNITS as u64;

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, ch) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}{}.{:02}", sign, grouped, fraction)
}

/// Parse a user-supplied amount into minor units.
/// Grouping separators (`,` and `_`) are ignored; at most two decimals are kept.
/// Example: "1,500,000" -> 150_000_000, "12.5" -> 1250
pub fn parse_amount(input: &str) -> Result<Amount, ParseAmountError> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();
    let negative = cleaned.starts_with('-');
    let digits = cleaned.trim_start_matches('-');

    let (units_str, fraction_str) = match digits.split_once('.') {
        Some((u, f)) if !f.contains('.') => (u, f),
        Some(_) => return Err(ParseAmountError::InvalidFormat),
        None => (digits, ""),
    };

    if units_str.is_empty() && fraction_str.is_empty() {
        return Err(ParseAmountError::InvalidFormat);
    }
    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(units_str) || !is_digits(fraction_str) {
        return Err(ParseAmountError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str
            .parse()
            .map_err(|_| ParseAmountError::InvalidFormat)?
    };

    let fraction: i64 = match fraction_str.len() {
        0 => 0,
        1 => {
            fraction_str
                .parse::<i64>()
                .map_err(|_| ParseAmountError::InvalidFormat)?
                * 10
        }
        _ => fraction_str[..2]
            .parse()
            .map_err(|_| ParseAmountError::InvalidFormat)?,
    };

    let amount = units
        .checked_mul(MINOR_UNITS)
        .and_then(|a| a.checked_add(fraction))
        .ok_or(ParseAmountError::Overflow)?;

    Ok(if negative { -amount } else { amount })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    InvalidFormat,
    Overflow,
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAmountError::InvalidFormat => write!(f, "invalid amount format"),
            ParseAmountError::Overflow => write!(f, "amount is too large"),
        }
    }
}

impl std::error::Error for ParseAmountError {}
