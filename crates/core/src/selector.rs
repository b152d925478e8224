//! Function selector derivation and selector list parsing.

use alloy_primitives::{Selector, hex, keccak256};
use serde::{Deserialize, Serialize};

use crate::error::SelectorError;

/// A selector together with the signature it was derived from, when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorEntry {
    /// The 4 byte selector.
    pub selector: Selector,
    /// The signature as typed by the user, kept for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Returns `Some(selector)` when `input` is literally `0x` followed by 8 hex characters.
fn literal_selector(input: &str) -> Option<Selector> {
    let digits = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X"))?;
    if digits.len() != 8 {
        return None;
    }
    let mut out = [0u8; 4];
    hex::decode_to_slice(digits, &mut out).ok()?;
    Some(Selector::from(out))
}

/// Strips every whitespace character so `mintTo(address, uint256)` and
/// `mintTo(address,uint256)` hash identically.
fn canonical_signature(signature: &str) -> String {
    signature.chars().filter(|c| !c.is_whitespace()).collect()
}

/// A signature is `name(args)` with balanced parentheses and a non-empty name.
fn is_function_signature(signature: &str) -> bool {
    let Some(open) = signature.find('(') else {
        return false;
    };
    if open == 0 || !signature.ends_with(')') {
        return false;
    }
    let name = &signature[..open];
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        || name.starts_with(|c: char| c.is_ascii_digit())
    {
        return false;
    }
    let mut depth = 0i32;
    for c in signature[open..].chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Derives the 4 byte selector of `signature`.
///
/// A literal `0x` + 8 hex character input is passed through unchanged; anything else is
/// hashed with Keccak-256 after whitespace is removed.
pub fn selector_of(signature: &str) -> Result<Selector, SelectorError> {
    let trimmed = signature.trim();
    if trimmed.is_empty() {
        return Err(SelectorError::InvalidSignature(signature.to_string()));
    }
    if let Some(selector) = literal_selector(trimmed) {
        return Ok(selector);
    }
    let canonical = canonical_signature(trimmed);
    let hash = keccak256(canonical.as_bytes());
    Ok(Selector::from_slice(&hash[..4]))
}

/// Splits `input` on commas that sit outside any parentheses.
fn split_top_level(input: &str) -> Result<Vec<&str>, SelectorError> {
    let mut chunks = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| SelectorError::InvalidSelectorInput(input[start..=idx].to_string()))?;
            }
            ',' if depth == 0 => {
                chunks.push(&input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(SelectorError::InvalidSelectorInput(input[start..].trim().to_string()));
    }
    chunks.push(&input[start..]);
    Ok(chunks)
}

/// Parses a comma separated list of selectors and/or function signatures.
///
/// Commas inside parentheses do not split, so `mint(),mintTo(address,uint256)` yields two
/// entries. Empty chunks (e.g. a trailing comma) are skipped.
pub fn parse_selector_list(input: &str) -> Result<Vec<SelectorEntry>, SelectorError> {
    let mut entries = Vec::new();
    for chunk in split_top_level(input)? {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        if let Some(selector) = literal_selector(chunk) {
            entries.push(SelectorEntry { selector, signature: None });
            continue;
        }
        if !is_function_signature(chunk) {
            return Err(SelectorError::InvalidSelectorInput(chunk.to_string()));
        }
        entries.push(SelectorEntry {
            selector: selector_of(chunk)?,
            signature: Some(chunk.to_string()),
        });
    }
    Ok(entries)
}
