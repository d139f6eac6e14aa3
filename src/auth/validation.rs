use regex::Regex;
use std::sync::LazyLock;

use crate::{
    errors::{ClientError, Result},
    models::{ChangePasswordRequest, LoginRequest, RegisterRequest},
};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;
pub const MIN_NAME_LEN: usize = 2;

/// Raw sign-up form input, before normalization.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: Option<String>,
    pub password: String,
    pub password_confirm: String,
}

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+@\S+\.\S+").expect("email pattern compiles"));

/// Loose shape check; the backend does the real verification.
pub fn is_valid_email(value: &str) -> bool {
    EMAIL_PATTERN.is_match(value)
}

fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(ClientError::validation("email", "Email is required"));
    }
    if !is_valid_email(email) {
        return Err(ClientError::validation("email", "Email is invalid"));
    }
    Ok(())
}

fn validate_name(field: &str, label: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ClientError::validation(field, format!("{} is required", label)));
    }
    if trimmed.chars().count() < MIN_NAME_LEN {
        return Err(ClientError::validation(
            field,
            format!("{} must be at least {} characters", label, MIN_NAME_LEN),
        ));
    }
    Ok(())
}

/// Length and character-class rules shared by sign-up and password change.
pub fn validate_password_strength(field: &str, password: &str) -> Result<()> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(ClientError::validation(
            field,
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }

    if len > MAX_PASSWORD_LEN {
        return Err(ClientError::validation(field, "Password is too long"));
    }

    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !(has_lowercase && has_uppercase && has_digit) {
        return Err(ClientError::validation(
            field,
            "Password must contain at least one lowercase letter, one uppercase letter, and one number",
        ));
    }

    Ok(())
}

pub fn validate_login(request: &LoginRequest) -> Result<()> {
    validate_email(&request.email)?;
    if request.password.is_empty() {
        return Err(ClientError::validation("password", "Password is required"));
    }
    Ok(())
}

/// Checks the form in display order and returns the normalized request:
/// trimmed names, lowercased email, username defaulting to the email's local part.
pub fn validate_registration(form: &Registration) -> Result<RegisterRequest> {
    validate_name("first_name", "First name", &form.first_name)?;
    validate_name("last_name", "Last name", &form.last_name)?;
    validate_email(&form.email)?;

    if form.password.is_empty() {
        return Err(ClientError::validation("password", "Password is required"));
    }
    validate_password_strength("password", &form.password)?;

    if form.password_confirm.is_empty() {
        return Err(ClientError::validation(
            "password_confirm",
            "Please confirm your password",
        ));
    }
    if form.password_confirm != form.password {
        return Err(ClientError::validation(
            "password_confirm",
            "Passwords do not match",
        ));
    }

    let email = form.email.trim().to_lowercase();
    let username = match form.username.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_lowercase(),
        _ => email.split('@').next().unwrap_or_default().to_string(),
    };

    Ok(RegisterRequest {
        email,
        username,
        first_name: form.first_name.trim().to_string(),
        last_name: form.last_name.trim().to_string(),
        password: form.password.clone(),
        password_confirm: form.password_confirm.clone(),
    })
}

pub fn validate_password_change(current: &str, new: &str) -> Result<ChangePasswordRequest> {
    if current.is_empty() {
        return Err(ClientError::validation(
            "current_password",
            "Current password is required",
        ));
    }

    if new.is_empty() {
        return Err(ClientError::validation(
            "new_password",
            "New password is required",
        ));
    }
    validate_password_strength("new_password", new)?;

    if new == current {
        return Err(ClientError::validation(
            "new_password",
            "New password must be different from current password",
        ));
    }

    Ok(ChangePasswordRequest {
        current_password: current.to_string(),
        new_password: new.to_string(),
        new_password_confirm: new.to_string(),
    })
}
