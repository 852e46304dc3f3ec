/*!
 * Placeholder validation for model output.
 *
 * Checks that every token issued for a chunk comes back exactly once in the
 * raw model answer, that no token from another chunk shows up, and that the
 * model did not invent token-shaped strings of its own.
 */

use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::preservation::{find_tokens, PlaceholderMap, TokenTally};

/// Placeholder validation result
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlaceholderValidationResult {
    /// One tally per expected token, then per unexpected known token
    pub tallies: Vec<TokenTally>,
    /// Token-shaped strings the map does not know
    pub unknown_tokens: Vec<String>,
}

impl PlaceholderValidationResult {
    /// Check if validation passed
    pub fn passed(&self) -> bool {
        self.unknown_tokens.is_empty() && self.tallies.iter().all(TokenTally::matches)
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &TokenTally> {
        self.tallies.iter().filter(|t| !t.matches())
    }
}

/// Validator for placeholder tokens in raw model output
pub struct PlaceholderValidator;

impl PlaceholderValidator {
    /// Count tokens in `response` against the ones expected for this chunk
    pub fn validate(response: &str, expected: &[String], map: &PlaceholderMap) -> PlaceholderValidationResult {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut unknown = Vec::new();

        for found in find_tokens(response) {
            if !map.contains(&found.token) {
                unknown.push(found.token);
                continue;
            }
            let count = counts.entry(found.token.clone()).or_insert(0);
            if *count == 0 {
                order.push(found.token);
            }
            *count += 1;
        }

        let mut tallies: Vec<TokenTally> = expected
            .iter()
            .map(|token| TokenTally {
                token: token.clone(),
                expected: 1,
                found: counts.get(token).copied().unwrap_or(0),
            })
            .collect();
        tallies.extend(order.into_iter().filter(|t| !expected.contains(t)).map(|token| {
            let found = counts.get(&token).copied().unwrap_or(0);
            TokenTally {
                token,
                expected: 0,
                found,
            }
        }));

        let result = PlaceholderValidationResult {
            tallies,
            unknown_tokens: unknown,
        };
        if !result.passed() {
            debug!(
                "Placeholder validation failed: {} mismatched, {} unknown",
                result.mismatches().count(),
                result.unknown_tokens.len()
            );
        }
        result
    }

    /// Token-shaped strings still present after restoration
    pub fn leftovers(restored: &str) -> Vec<String> {
        find_tokens(restored).into_iter().map(|m| m.token).collect()
    }
}
