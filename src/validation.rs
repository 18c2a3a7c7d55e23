use crate::errors::{ValidationError, DomainResult, DomainError};
use regex::Regex;
use std::sync::OnceLock;

/// A trait that request types implement for validation.
pub trait Validate {
    /// Validates the value and returns an error if validation fails.
    fn validate(&self) -> DomainResult<()>;
}

fn table_prefix_regex() -> &'static Regex {
    static TABLE_PREFIX_REGEX: OnceLock<Regex> = OnceLock::new();
    TABLE_PREFIX_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]*$").expect("valid table prefix pattern"))
}

/// Struct for configuring string validations in a fluent style
pub struct ValidationBuilder<'a> {
    field_name: String,
    value: Option<&'a str>,
    errors: Vec<ValidationError>,
}

impl<'a> ValidationBuilder<'a> {
    pub fn new(field_name: &str, value: Option<&'a str>) -> Self {
        Self {
            field_name: field_name.to_string(),
            value,
            errors: Vec::new(),
        }
    }

    /// Fails on a missing or whitespace-only value.
    pub fn required(mut self) -> Self {
        if self.value.map(|v| v.trim().is_empty()).unwrap_or(true) {
            self.errors.push(ValidationError::required(&self.field_name));
        }
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        if let Some(value) = self.value {
            if value.chars().count() > max {
                self.errors.push(ValidationError::max_length(&self.field_name, max));
            }
        }
        self
    }

    /// Table prefixes are spliced into identifiers, so only word characters are allowed.
    pub fn table_prefix(mut self) -> Self {
        if let Some(value) = self.value {
            if !table_prefix_regex().is_match(value) {
                self.errors.push(ValidationError::format(
                    &self.field_name,
                    "only letters, digits and underscores are allowed",
                ));
            }
        }
        self
    }

    pub fn validate(self) -> DomainResult<()> {
        match self.errors.into_iter().next() {
            Some(error) => Err(DomainError::Validation(error)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required() {
        assert!(ValidationBuilder::new("objectType", Some("post")).required().validate().is_ok());
        assert!(ValidationBuilder::new("objectType", Some("   ")).required().validate().is_err());
        assert!(ValidationBuilder::new("objectType", None).required().validate().is_err());
    }

    #[test]
    fn test_max_length() {
        let long = "x".repeat(101);
        let result = ValidationBuilder::new("objectType", Some(long.as_str()))
            .required()
            .max_length(100)
            .validate();
        match result {
            Err(DomainError::Validation(ValidationError::MaxLength { field, max })) => {
                assert_eq!(field, "objectType");
                assert_eq!(max, 100);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_table_prefix() {
        assert!(ValidationBuilder::new("tablePrefix", Some("wp_")).table_prefix().validate().is_ok());
        assert!(ValidationBuilder::new("tablePrefix", Some("")).table_prefix().validate().is_ok());
        assert!(ValidationBuilder::new("tablePrefix", Some("wp\";--")).table_prefix().validate().is_err());
    }
}
