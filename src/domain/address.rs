/// Rules for turning user-entered phone addresses into the provider's format:
/// digits only, prefixed with a country code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressFormat {
    default_country_code: String,
    national_number_length: usize,
}

impl AddressFormat {
    #[must_use]
    pub fn new(default_country_code: &str, national_number_length: usize) -> Self {
        Self {
            default_country_code: default_country_code.chars().filter(char::is_ascii_digit).collect(),
            national_number_length,
        }
    }

    /// Normalizes an address.
    ///
    /// Addresses written with a `+` or `00` international prefix are taken as already
    /// carrying a country code. Otherwise, numbers no longer than a national number get
    /// the default country code prepended; longer numbers pass through.
    ///
    /// # Errors
    /// Returns a description of the problem if the address contains no digits.
    pub fn normalize(&self, raw: &str) -> Result<String, String> {
        let trimmed = raw.trim();
        let international = trimmed.starts_with('+') || trimmed.starts_with("00");

        let mut digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
        if trimmed.starts_with("00") {
            digits.replace_range(..2, "");
        }

        if digits.is_empty() {
            return Err(format!("Address '{raw}' contains no digits"));
        }

        if international || digits.len() > self.national_number_length {
            return Ok(digits);
        }

        Ok(format!("{}{digits}", self.default_country_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> AddressFormat {
        AddressFormat::new("91", 10)
    }

    #[test]
    fn test_national_number_gets_default_country_code() {
        assert_eq!(format().normalize("98123 45678").unwrap(), "919812345678");
        assert_eq!(format().normalize("(981) 234-5678").unwrap(), "919812345678");
    }

    #[test]
    fn test_prefixed_numbers_pass_through() {
        assert_eq!(format().normalize("+44 20 7946 0958").unwrap(), "442079460958");
        assert_eq!(format().normalize("0044 20 7946 0958").unwrap(), "442079460958");
        assert_eq!(format().normalize("+1 555 0100").unwrap(), "15550100");
    }

    #[test]
    fn test_long_numbers_pass_through() {
        assert_eq!(format().normalize("919812345678").unwrap(), "919812345678");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let once = format().normalize("9812345678").unwrap();
        let twice = format().normalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_country_code_is_configurable() {
        let us = AddressFormat::new("+1", 10);
        assert_eq!(us.normalize("555-010-0199").unwrap(), "15550100199");
    }

    #[test]
    fn test_address_without_digits_is_rejected() {
        assert!(format().normalize("").is_err());
        assert!(format().normalize("+ -").is_err());
    }
}
