use std::sync::OnceLock;

use regex::Regex;

use crate::error::{AppError, FieldError};

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_POST_LENGTH: usize = 500;
pub const MAX_COMMENT_LENGTH: usize = 300;
pub const MAX_BIO_LENGTH: usize = 160;

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Regex should compile"))
}

fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("Regex should compile"))
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn finish(errors: Vec<FieldError>) -> Result<(), AppError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

fn check_email(email: &str, errors: &mut Vec<FieldError>) {
    if is_blank(email) {
        errors.push(FieldError::new("email", "Email is required"));
    } else if !email_regex().is_match(email) {
        errors.push(FieldError::new("email", "Email is invalid"));
    }
}

pub fn validate_signup(username: &str, email: &str, password: &str, name: &str) -> Result<(), AppError> {
    let mut errors = Vec::new();

    if is_blank(username) {
        errors.push(FieldError::new("username", "Username is required"));
    } else if username.chars().count() < MIN_USERNAME_LENGTH {
        errors.push(FieldError::new("username", "Username must be at least 3 characters long"));
    } else if !username_regex().is_match(username) {
        errors.push(FieldError::new(
            "username",
            "Username can only contain letters, numbers, and underscores",
        ));
    }

    check_email(email, &mut errors);

    if is_blank(password) {
        errors.push(FieldError::new("password", "Password is required"));
    } else if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError::new("password", "Password must be at least 6 characters long"));
    }

    if is_blank(name) {
        errors.push(FieldError::new("name", "Name is required"));
    }

    finish(errors)
}

pub fn validate_login(email: &str, password: &str) -> Result<(), AppError> {
    let mut errors = Vec::new();
    check_email(email, &mut errors);
    if is_blank(password) {
        errors.push(FieldError::new("password", "Password is required"));
    }
    finish(errors)
}

pub fn validate_post_content(content: &str) -> Result<(), AppError> {
    if is_blank(content) {
        return Err(AppError::invalid("content", "Post content is required"));
    }
    if content.chars().count() > MAX_POST_LENGTH {
        return Err(AppError::invalid("content", "Post content cannot exceed 500 characters"));
    }
    Ok(())
}

pub fn validate_comment_content(content: &str) -> Result<(), AppError> {
    if is_blank(content) {
        return Err(AppError::invalid("content", "Comment content is required"));
    }
    if content.chars().count() > MAX_COMMENT_LENGTH {
        return Err(AppError::invalid("content", "Comment content cannot exceed 300 characters"));
    }
    Ok(())
}

pub fn validate_user_update(name: Option<&str>, bio: Option<&str>) -> Result<(), AppError> {
    let mut errors = Vec::new();
    // An empty name means "leave unchanged"; only whitespace is rejected.
    if name.is_some_and(|n| !n.is_empty() && is_blank(n)) {
        errors.push(FieldError::new("name", "Name cannot be empty"));
    }
    if bio.is_some_and(|b| b.chars().count() > MAX_BIO_LENGTH) {
        errors.push(FieldError::new("bio", "Bio cannot exceed 160 characters"));
    }
    finish(errors)
}
