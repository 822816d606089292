// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! `${{ matrix.<axis> }}` and `${{ env.<NAME> }}` substitution

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::matrix::MatrixAssignment;

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{\{\s*(matrix|env)\.([A-Za-z0-9_\-]+)\s*\}\}")
            .expect("Invalid reference pattern")
    })
}

/// Namespace of a `${{ ... }}` reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Matrix,
    Env,
}

/// A reference found in a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub scope: Scope,
    pub name: String,
}

/// List every reference in `text`, in order of appearance
pub fn references(text: &str) -> Vec<Reference> {
    reference_pattern()
        .captures_iter(text)
        .map(|caps| Reference {
            scope: if &caps[1] == "matrix" {
                Scope::Matrix
            } else {
                Scope::Env
            },
            name: caps[2].to_string(),
        })
        .collect()
}

/// Replace references with values.
///
/// Unknown references are left as written; validation rejects them before
/// a run starts.
pub fn substitute(
    text: &str,
    matrix: &MatrixAssignment,
    env: &BTreeMap<String, String>,
) -> String {
    if !text.contains("${{") {
        return text.to_string();
    }

    reference_pattern()
        .replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[2];
            let value = if &caps[1] == "matrix" {
                matrix.get(name).map(str::to_string)
            } else {
                env.get(name).cloned()
            };
            value.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Layer `overrides` on top of `base`, substituting references in each value
/// against the matrix and the variables merged so far.
pub fn merge_env(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
    matrix: &MatrixAssignment,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    for (key, value) in overrides {
        let resolved = substitute(value, matrix, &merged);
        merged.insert(key.clone(), resolved);
    }
    merged
}
