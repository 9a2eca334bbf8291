//! Environment variable expansion for configuration strings.
//!
//! Supports two forms:
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise the default

use crate::ConfigError;

/// Expand all `${...}` references in `value`.
///
/// `field` names the config field for error messages.
///
/// Returns the original string unchanged if no `${}` patterns are present.
/// Bare `$VAR` syntax is not expanded (only `${VAR}` with braces).
///
/// # Errors
///
/// Returns [`ConfigError::EnvVar`] for an unset variable without a default.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    // Fast path: no expansion needed
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(
        value,
        |reference: &str| -> Result<Option<String>, LookupError> {
            // `${VAR:-default}` arrives as one reference string.
            let (name, default) = match reference.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (reference, None),
            };
            match std::env::var(name) {
                Ok(resolved) => Ok(Some(resolved)),
                Err(_) => match default {
                    Some(default) => Ok(Some(default.to_owned())),
                    None => Err(LookupError {
                        var_name: name.to_owned(),
                    }),
                },
            }
        },
    )
    .map(|cow| cow.into_owned())
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{0}}} not set", e.cause.var_name),
    })
}

/// Error returned when environment variable lookup fails.
struct LookupError {
    var_name: String,
}
