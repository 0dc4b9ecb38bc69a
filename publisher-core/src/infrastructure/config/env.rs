// publisher-core/src/infrastructure/config/env.rs

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::infrastructure::error::InfrastructureError;

fn re_env() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap_or_else(|_| {
            // Hardcoded pattern; the fallback never matches anything.
            Regex::new("$^").unwrap_or_else(|_| unreachable!())
        })
    })
}

/// Replaces `${NAME}` and `${NAME:-default}` in every string value of `value`,
/// recursively. Object keys are left alone. Substituted text is not
/// re-scanned.
pub fn substitute_env_vars<F>(value: &mut Value, lookup: &F) -> Result<(), InfrastructureError>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = substitute_str(s, lookup)?;
            }
            Ok(())
        }
        Value::Array(items) => items
            .iter_mut()
            .try_for_each(|item| substitute_env_vars(item, lookup)),
        Value::Object(map) => map
            .values_mut()
            .try_for_each(|item| substitute_env_vars(item, lookup)),
        _ => Ok(()),
    }
}

fn substitute_str<F>(input: &str, lookup: &F) -> Result<String, InfrastructureError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut last = 0;

    for caps in re_env().captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&input[last..whole.start()]);

        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(found), _) => out.push_str(&found),
            (None, Some(default)) => out.push_str(default.as_str()),
            (None, None) => return Err(InfrastructureError::MissingEnvVar(name.to_string())),
        }
        last = whole.end();
    }

    out.push_str(&input[last..]);
    Ok(out)
}
