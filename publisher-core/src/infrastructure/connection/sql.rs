// publisher-core/src/infrastructure/connection/sql.rs

// SQL text composition for the embedded engine. DuckDB cannot bind parameters
// inside CREATE SECRET / ATTACH, so every user value goes through one of the
// quoting helpers below.

use regex::Regex;
use std::sync::OnceLock;

use crate::infrastructure::error::InfrastructureError;

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .unwrap_or_else(|_| Regex::new("$^").unwrap_or_else(|_| unreachable!()))
    })
}

/// Whether `name` can be used as a catalog or secret name without quoting
/// surprises.
pub fn is_identifier(name: &str) -> bool {
    identifier_regex().is_match(name)
}

fn reject_nul(value: &str) -> Result<(), InfrastructureError> {
    if value.contains('\0') {
        return Err(InfrastructureError::ConfigError(
            "value contains a NUL byte".to_string(),
        ));
    }
    Ok(())
}

/// `"name"` with embedded double quotes doubled.
pub fn quote_identifier(name: &str) -> Result<String, InfrastructureError> {
    reject_nul(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// `'value'` with embedded single quotes doubled. DuckDB string literals do
/// not interpret backslashes, so nothing else needs escaping.
pub fn quote_literal(value: &str) -> Result<String, InfrastructureError> {
    reject_nul(value)?;
    Ok(format!("'{}'", value.replace('\'', "''")))
}
