//! Name syntax for the global endpoint namespace and custom domains.
//!
//! Endpoint names double as subdomains, so they follow DNS label rules:
//! lowercase `a-z0-9` with inner hyphens, no leading or trailing hyphen.
//! Inputs are trimmed and lowercased before validation; anything else is
//! rejected rather than rewritten.

use super::error::PlaneError;

pub(crate) const NAME_MAX: usize = 63;
const DOMAIN_MAX: usize = 253;

/// Returns `true` when `name` is already in canonical endpoint-name form.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= NAME_MAX
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Folds user input into canonical form (trimmed, lowercase).
/// Lookups use the same folding so `API` and `api` address the same endpoint.
#[must_use]
pub fn fold(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}

/// Folds and validates an endpoint name.
///
/// # Errors
/// Returns [`PlaneError::InvalidName`] when the folded name breaks the syntax rules.
pub fn normalize_name(input: &str) -> Result<String, PlaneError> {
    let name = fold(input);
    if is_valid_name(&name) {
        Ok(name)
    } else {
        Err(PlaneError::InvalidName(input.trim().to_string()))
    }
}

/// Folds a custom domain: lowercase, no trailing dot, port stripped.
#[must_use]
pub fn fold_domain(input: &str) -> String {
    let host = input.trim();
    let host = host.rsplit_once(':').map_or(host, |(host, port)| {
        if port.bytes().all(|b| b.is_ascii_digit()) {
            host
        } else {
            input.trim()
        }
    });
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Folds and validates a custom domain (two or more valid labels).
///
/// # Errors
/// Returns [`PlaneError::InvalidName`] when any label is invalid.
pub fn normalize_domain(input: &str) -> Result<String, PlaneError> {
    let domain = fold_domain(input);
    let labels: Vec<&str> = domain.split('.').collect();
    if domain.len() > DOMAIN_MAX || labels.len() < 2 || !labels.iter().all(|l| is_valid_name(l)) {
        return Err(PlaneError::InvalidName(input.trim().to_string()));
    }
    Ok(domain)
}
