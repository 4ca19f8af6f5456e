// SPDX-License-Identifier: GPL-3.0-or-later
//! Normalization of free-form user input into the identifier and hostname grammars.
//!
//! These are pure functions; the entity and device constructors call them as
//! input-sanitizing preconditions. Both normalizers are idempotent: feeding a
//! valid token back through them returns it unchanged.

use crate::error::Error;

/// Normalize a string into a machine identifier.
///
/// Identifiers are lowercase, underscore-separated tokens matching
/// `[a-z0-9]([a-z0-9_]*[a-z0-9])?`. In non-strict mode the input is lowercased,
/// characters outside `[a-z0-9_ -]` are stripped, runs of spaces and hyphens
/// collapse into a single underscore, and leading/trailing underscores are
/// trimmed. In strict mode any input not already in identifier form is rejected.
pub fn normalize_identifier(input: &str, strict: bool) -> Result<String, Error> {
    if strict {
        return if is_identifier(input) {
            Ok(input.to_string())
        } else {
            Err(invalid(input, "identifier"))
        };
    }
    let normalized = collapse(&input.to_lowercase(), Grammar::Identifier);
    let normalized = normalized.trim_matches('_');
    if is_identifier(normalized) {
        Ok(normalized.to_string())
    } else {
        Err(invalid(input, "identifier"))
    }
}

/// Normalize a string into a hostname label.
///
/// Hostnames keep their case and use hyphens as separators, matching
/// `[A-Za-z0-9](-?[A-Za-z0-9])*`. Non-strict normalization strips characters
/// outside `[A-Za-z0-9 -]`, collapses runs of spaces and hyphens into a single
/// hyphen, and trims hyphens from both ends.
pub fn normalize_hostname(input: &str, strict: bool) -> Result<String, Error> {
    if strict {
        return if is_hostname(input) {
            Ok(input.to_string())
        } else {
            Err(invalid(input, "hostname"))
        };
    }
    let normalized = collapse(input, Grammar::Hostname);
    let normalized = normalized.trim_matches('-');
    if is_hostname(normalized) {
        Ok(normalized.to_string())
    } else {
        Err(invalid(input, "hostname"))
    }
}

/// Collapse an optional string so that empty and absent are the same thing.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

enum Grammar {
    Identifier,
    Hostname,
}

impl Grammar {
    fn keeps(&self, c: char) -> bool {
        match self {
            Grammar::Identifier => c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_',
            Grammar::Hostname => c.is_ascii_alphanumeric(),
        }
    }

    fn separator(&self) -> char {
        match self {
            Grammar::Identifier => '_',
            Grammar::Hostname => '-',
        }
    }
}

/// One pass over the input: kept characters are copied through, runs of spaces
/// and hyphens become a single separator, everything else is dropped.
fn collapse(input: &str, grammar: Grammar) -> String {
    let mut output = String::with_capacity(input.len());
    let mut pending_separator = false;
    for c in input.chars() {
        if c == ' ' || c == '-' {
            pending_separator = true;
        } else if grammar.keeps(c) {
            if pending_separator && !output.is_empty() {
                output.push(grammar.separator());
            }
            pending_separator = false;
            output.push(c);
        }
    }
    output
}

fn is_identifier(s: &str) -> bool {
    let inner_alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let first = match s.chars().next() {
        Some(c) => c,
        None => return false,
    };
    let last = s.chars().last().unwrap_or(first);
    inner_alnum(first)
        && inner_alnum(last)
        && s.chars().all(|c| inner_alnum(c) || c == '_')
}

fn is_hostname(s: &str) -> bool {
    let first = match s.chars().next() {
        Some(c) => c,
        None => return false,
    };
    let last = s.chars().last().unwrap_or(first);
    first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && !s.contains("--")
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn invalid(input: &str, target: &'static str) -> Error {
    Error::InvalidFormat {
        input: input.to_string(),
        target,
    }
}
