//! Ingredient list tokenization.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches parenthetical asides such as `(aqua)` or `(CI 77891)`.
static PARENTHETICAL: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\(.*?\)").ok());

/// Splits a raw ingredient list into ingredient name tokens.
///
/// Parenthetical asides are removed, the text is split on commas,
/// semicolons and newlines, and each fragment is trimmed. Empty fragments are
/// dropped. Case is preserved; normalization happens at lookup time.
///
/// # Example
///
/// ```
/// use ingrisk::services::tokenize;
///
/// let tokens = tokenize("Water (aqua), Glycerin; Niacinamide\nFragrance");
/// assert_eq!(tokens, vec!["Water", "Glycerin", "Niacinamide", "Fragrance"]);
/// ```
#[must_use]
pub fn tokenize(raw: &str) -> Vec<String> {
    let stripped = PARENTHETICAL
        .as_ref()
        .map_or_else(|| raw.to_string(), |re| re.replace_all(raw, "").into_owned());

    stripped
        .split([',', ';', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToString::to_string)
        .collect()
}
