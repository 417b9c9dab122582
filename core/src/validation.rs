//! Order form field validators.
//!
//! Validators are pure: they map the current input to a [`Validation`]. The
//! runtime crate applies them behind a debounce so a result is only produced
//! once the user stops typing for [`DEFAULT_DEBOUNCE`].

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// Quiet period before a field is evaluated.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Largest number of tickets in one order.
pub const DEFAULT_MAX_QUANTITY: u32 = 20;

/// Minimum number of characters in a name.
pub const MIN_NAME_LENGTH: usize = 3;

#[allow(clippy::unwrap_used)] // Constant pattern, covered by tests
static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z0-9a-z._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,64}").unwrap());

// Vietnamese mobile numbers: 0 or +84, a carrier digit, then eight digits
#[allow(clippy::unwrap_used)] // Constant pattern, covered by tests
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"((0|\+84)+([3|5|7|8|9]))+([0-9]{8})\b").unwrap());

/// Outcome of validating one field.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Validation {
    /// Nothing entered yet
    #[default]
    Indeterminate,
    /// Input is acceptable
    Success,
    /// Input is rejected, with a message for the user
    Failure(String),
}

impl Validation {
    /// Whether this is [`Validation::Success`]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Failure message, if any
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Failure(reason) => Some(reason),
            _ => None,
        }
    }
}

fn check(input: &str, accept: impl FnOnce(&str) -> bool, reason: &str) -> Validation {
    if input.is_empty() {
        Validation::Indeterminate
    } else if accept(input) {
        Validation::Success
    } else {
        Validation::Failure(reason.to_string())
    }
}

/// Names need at least [`MIN_NAME_LENGTH`] characters.
#[must_use]
pub fn validate_name(name: &str) -> Validation {
    check(
        name,
        |s| s.chars().count() >= MIN_NAME_LENGTH,
        "Name is not valid",
    )
}

/// Phone numbers must contain a mobile number.
#[must_use]
pub fn validate_phone(phone: &str) -> Validation {
    check(phone, |s| PHONE_PATTERN.is_match(s), "Phone is not valid")
}

/// Email addresses must contain `local@domain.tld`.
#[must_use]
pub fn validate_email(email: &str) -> Validation {
    check(email, |s| EMAIL_PATTERN.is_match(s), "Email is not valid")
}

/// Quantity must be in `1..=max`. There is no indeterminate state.
#[must_use]
pub fn validate_quantity(quantity: u32, max: u32) -> Validation {
    if (1..=max).contains(&quantity) {
        Validation::Success
    } else {
        Validation::Failure("Quantity is not valid".to_string())
    }
}

/// The form is valid when every field validated successfully.
#[must_use]
pub fn all_valid<'a>(validations: impl IntoIterator<Item = &'a Validation>) -> bool {
    validations.into_iter().all(Validation::is_success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn name_states() {
        assert_eq!(validate_name(""), Validation::Indeterminate);
        assert_eq!(
            validate_name("ab"),
            Validation::Failure("Name is not valid".to_string())
        );
        assert_eq!(validate_name("abc"), Validation::Success);
    }

    #[test]
    fn name_counts_characters_not_bytes() {
        assert_eq!(validate_name("Hà"), validate_name("ab"));
        assert_eq!(validate_name("Hằng"), Validation::Success);
    }

    #[test]
    fn phone_states() {
        assert_eq!(validate_phone(""), Validation::Indeterminate);
        assert_eq!(validate_phone("0912345678"), Validation::Success);
        assert_eq!(validate_phone("+84912345678"), Validation::Success);
        assert!(validate_phone("12345").failure_reason().is_some());
        assert!(validate_phone("0212345678").failure_reason().is_some());
    }

    #[test]
    fn email_states() {
        assert_eq!(validate_email(""), Validation::Indeterminate);
        assert_eq!(validate_email("ann@example.com"), Validation::Success);
        assert_eq!(
            validate_email("ann@example"),
            Validation::Failure("Email is not valid".to_string())
        );
    }

    #[test]
    fn quantity_bounds() {
        assert!(!validate_quantity(0, DEFAULT_MAX_QUANTITY).is_success());
        assert!(validate_quantity(1, DEFAULT_MAX_QUANTITY).is_success());
        assert!(validate_quantity(20, DEFAULT_MAX_QUANTITY).is_success());
        assert!(!validate_quantity(21, DEFAULT_MAX_QUANTITY).is_success());
    }

    #[test]
    fn all_valid_requires_every_success() {
        let ok = Validation::Success;
        let pending = Validation::Indeterminate;
        assert!(all_valid([&ok, &ok, &ok, &ok]));
        assert!(!all_valid([&ok, &pending, &ok, &ok]));
    }

    proptest! {
        #[test]
        fn empty_input_is_never_judged(max in 1_u32..100) {
            prop_assert_eq!(validate_name(""), Validation::Indeterminate);
            prop_assert_eq!(validate_phone(""), Validation::Indeterminate);
            prop_assert_eq!(validate_email(""), Validation::Indeterminate);
            prop_assert!(!validate_quantity(0, max).is_success());
        }

        #[test]
        fn long_names_pass(name in "[a-zA-Z ]{3,40}") {
            prop_assert_eq!(validate_name(&name), Validation::Success);
        }
    }
}
