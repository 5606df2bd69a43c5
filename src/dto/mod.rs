use validator::ValidationError;

pub mod auth;
pub mod cart;
pub mod chatbot;
pub mod favorites;
pub mod hometown;
pub mod media;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod products;
pub mod ratings;
pub mod revenue;
pub mod support;
pub mod users;
pub mod vouchers;

/// Upper bound for any order or quote amount, in VND.
pub const MAX_ORDER_AMOUNT: i64 = 10_000_000_000;

/// Rejects strings that are empty once trimmed.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("must not be blank".into()));
    }
    Ok(())
}

/// Vietnamese phone numbers: ten digits starting with `0`, or `+84`
/// followed by nine digits. Spaces are ignored.
pub fn phone_number(value: &str) -> Result<(), ValidationError> {
    let digits: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = match digits.strip_prefix("+84") {
        Some(rest) => format!("0{rest}"),
        None => digits,
    };
    let valid = digits.len() == 10
        && digits.starts_with('0')
        && digits.chars().all(|c| c.is_ascii_digit());
    if !valid {
        return Err(ValidationError::new("phone").with_message("invalid phone number".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_formats() {
        assert!(phone_number("0905123456").is_ok());
        assert!(phone_number("+84 905 123 456").is_ok());
        assert!(phone_number("12345").is_err());
        assert!(phone_number("09051234ab").is_err());
        assert!(phone_number("1905123456").is_err());
    }

    #[test]
    fn blank_strings() {
        assert!(not_blank("  ").is_err());
        assert!(not_blank(" Tuy Hòa ").is_ok());
    }
}
