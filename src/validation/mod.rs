use std::fmt;

pub const EMAIL_MAX_LEN: usize = 254;
pub const CUSTOMER_NAME_MAX_LEN: usize = 120;
pub const PRODUCT_ID_MAX_LEN: usize = 64;
pub const MAX_PRODUCTS_PER_CHECKOUT: usize = 200;
pub const SESSION_ID_MAX_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Emails are compared case-insensitively everywhere; this is the canonical form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_email(email: &str) -> ValidationResult {
    validate_required("customerEmail", email)?;
    validate_max_len("customerEmail", email, EMAIL_MAX_LEN)?;

    if email.chars().any(char::is_whitespace) {
        return Err(ValidationError::new(
            "customerEmail",
            "must not contain whitespace",
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::new("customerEmail", "must contain '@'"));
    };

    if local.is_empty() || domain.contains('@') {
        return Err(ValidationError::new("customerEmail", "is not a valid address"));
    }

    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(ValidationError::new(
            "customerEmail",
            "must have a valid domain",
        ));
    }

    Ok(())
}

pub fn validate_customer_name(name: &str) -> ValidationResult {
    validate_required("customerName", name)?;
    validate_max_len("customerName", name, CUSTOMER_NAME_MAX_LEN)
}

pub fn validate_product_id(product_id: &str) -> ValidationResult {
    validate_required("productIds", product_id)?;
    validate_max_len("productIds", product_id, PRODUCT_ID_MAX_LEN)?;

    if !product_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
    {
        return Err(ValidationError::new(
            "productIds",
            format!("'{}' contains invalid characters", product_id),
        ));
    }

    Ok(())
}

pub fn validate_product_ids(product_ids: &[String]) -> ValidationResult {
    if product_ids.is_empty() {
        return Err(ValidationError::new(
            "productIds",
            "at least one product is required",
        ));
    }

    if product_ids.len() > MAX_PRODUCTS_PER_CHECKOUT {
        return Err(ValidationError::new(
            "productIds",
            format!("at most {} products per checkout", MAX_PRODUCTS_PER_CHECKOUT),
        ));
    }

    product_ids.iter().try_for_each(|id| validate_product_id(id))
}

pub fn validate_session_id(session_id: &str) -> ValidationResult {
    validate_required("sessionId", session_id)?;
    validate_max_len("sessionId", session_id, SESSION_ID_MAX_LEN)
}
