use shared::Outcome;

/// Reasons a UI-facing operation is declined. These are answers for the user,
/// not failures; they travel inside an [`Outcome`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Amount must be a non-zero number")]
    InvalidAmount,
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Name cannot be empty")]
    EmptyName,
    #[error("Weekly allowance cannot be negative")]
    NegativeAllowance,
    #[error("Invalid e-mail address")]
    InvalidEmail,
    #[error("An account with this e-mail already exists")]
    DuplicateEmail,
    #[error("E-mail and password are required")]
    MissingCredentials,
    #[error("Kid not found")]
    KidNotFound,
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid password")]
    InvalidCredentials,
}

impl ValidationError {
    pub fn into_outcome<T>(self) -> Outcome<T> {
        Outcome::declined(self.to_string())
    }
}

/// Trimmed, lower-cased e-mail, if it looks like one.
pub fn normalize_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(ValidationError::InvalidEmail),
    }
}

/// Amounts must be finite and non-zero.
pub fn validate_amount(amount: f64) -> Result<f64, ValidationError> {
    let amount = shared::round_cents(amount);
    if !amount.is_finite() || amount == 0.0 {
        return Err(ValidationError::InvalidAmount);
    }
    Ok(amount)
}

pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(name.to_string())
}

pub fn validate_allowance(weekly: f64) -> Result<f64, ValidationError> {
    if !weekly.is_finite() || weekly < 0.0 {
        return Err(ValidationError::NegativeAllowance);
    }
    Ok(shared::round_cents(weekly))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalization() {
        assert_eq!(normalize_email("  Bia@Example.COM "), Ok("bia@example.com".to_string()));
        assert_eq!(normalize_email("bia"), Err(ValidationError::InvalidEmail));
        assert_eq!(normalize_email("@example.com"), Err(ValidationError::InvalidEmail));
    }

    #[test]
    fn test_amount_validation() {
        assert_eq!(validate_amount(15.5), Ok(15.5));
        assert_eq!(validate_amount(-2.0), Ok(-2.0));
        assert_eq!(validate_amount(0.0), Err(ValidationError::InvalidAmount));
        assert_eq!(validate_amount(0.001), Err(ValidationError::InvalidAmount));
        assert_eq!(validate_amount(f64::NAN), Err(ValidationError::InvalidAmount));
        assert_eq!(validate_amount(f64::INFINITY), Err(ValidationError::InvalidAmount));
    }

    #[test]
    fn test_declined_outcome_carries_message() {
        let outcome: Outcome<()> = ValidationError::InsufficientBalance.into_outcome();
        assert!(!outcome.ok);
        assert_eq!(outcome.error.as_deref(), Some("Insufficient balance"));
    }
}
