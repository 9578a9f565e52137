//! Validation of configuration sections
//!
//! A section lists its rules with [`Checks`]; every broken rule is reported,
//! not just the first one.

use std::fmt;

/// A configuration section that can check its own values
pub trait ConfigSection: Default {
    /// Returns every rule the section breaks, or `Ok(())`
    fn validate(&self) -> Result<(), Vec<ValidationError>>;

    /// Table name in the config file, used to qualify field names
    fn section_name(&self) -> &'static str;
}

/// One broken rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Qualified field name, e.g. `sync.batch_size`
    pub field: String,
    pub message: String,
    /// The rejected value, when there is one to show
    pub value: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(
        field: impl Into<String>,
        message: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self {
            value: Some(value.to_string()),
            ..Self::new(field, message)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} {} (got {})", self.field, self.message, value),
            None => write!(f, "{} {}", self.field, self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Collects rule violations for one section
///
/// ```rust
/// use votesync_config::Checks;
///
/// let result = Checks::new("sync")
///     .range("batch_size", 0usize, 1, 1_000)
///     .at_least("max_storage_size", 4_096u64, 1_024)
///     .finish();
///
/// let errors = result.unwrap_err();
/// assert_eq!(errors.len(), 1);
/// assert_eq!(errors[0].field, "sync.batch_size");
/// ```
#[derive(Debug)]
pub struct Checks {
    section: &'static str,
    errors: Vec<ValidationError>,
}

impl Checks {
    pub fn new(section: &'static str) -> Self {
        Self {
            section,
            errors: Vec::new(),
        }
    }

    fn qualified(&self, field: &str) -> String {
        format!("{}.{}", self.section, field)
    }

    /// Requires `min <= value <= max`
    pub fn range<T>(mut self, field: &str, value: T, min: T, max: T) -> Self
    where
        T: PartialOrd + fmt::Display,
    {
        if value < min || value > max {
            let message = format!("must be between {} and {}", min, max);
            self.errors
                .push(ValidationError::with_value(self.qualified(field), message, value));
        }
        self
    }

    /// Requires `value >= min`
    pub fn at_least<T>(mut self, field: &str, value: T, min: T) -> Self
    where
        T: PartialOrd + fmt::Display,
    {
        if value < min {
            let message = format!("must be at least {}", min);
            self.errors
                .push(ValidationError::with_value(self.qualified(field), message, value));
        }
        self
    }

    /// Records `message` against `field` unless `holds`
    pub fn ensure(mut self, field: &str, holds: bool, message: impl Into<String>) -> Self {
        if !holds {
            self.errors
                .push(ValidationError::new(self.qualified(field), message));
        }
        self
    }

    pub fn finish(self) -> Result<(), Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}
