//! Short, unique target project codes derived from project titles.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::types::ProjectCode;

/// Maximum length of a target project code.
pub const MAX_CODE_LEN: usize = 10;

/// Minimum length of a target project code.
pub const MIN_CODE_LEN: usize = 2;

/// Hands out project codes, never the same one twice within a run.
///
/// Derivation and reservation happen under one lock so concurrent callers
/// cannot both claim a code.
#[derive(Debug, Default)]
pub struct ProjectCodeRegistry {
    taken: Mutex<HashSet<ProjectCode>>,
}

impl ProjectCodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a code for `title` and reserve it.
    pub fn assign(&self, title: &str) -> ProjectCode {
        let base = base_code(title);
        let mut taken = self.taken.lock().unwrap_or_else(|e| e.into_inner());

        let mut code = base.clone();
        let mut postfix = String::new();
        while code.len() < MIN_CODE_LEN || taken.contains(&code) {
            postfix = next_postfix(&postfix);
            let keep = MAX_CODE_LEN.saturating_sub(postfix.len()).min(base.len());
            code = format!("{}{}", &base[..keep], postfix);
        }

        taken.insert(code.clone());
        code
    }

    /// Forget every assigned code.
    pub fn clear(&self) {
        self.taken.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Uppercase initials for multi-word titles, the uppercased word otherwise.
/// Only ASCII letters survive; dashes separate words.
fn base_code(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| if c == '-' { ' ' } else { c })
        .filter(|c| c.is_ascii_alphabetic() || *c == ' ')
        .collect();

    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let code: String = if words.len() > 1 {
        words.iter().filter_map(|w| w.chars().next()).collect()
    } else {
        words.first().copied().unwrap_or_default().to_string()
    };

    code.to_ascii_uppercase().chars().take(MAX_CODE_LEN).collect()
}

/// `"" -> "A"`, `"A" -> "B"`, `"Z" -> "AA"`, `"AZ" -> "BA"`.
fn next_postfix(postfix: &str) -> String {
    match postfix.chars().last() {
        None => "A".to_string(),
        Some('Z') => format!("{}A", next_postfix(&postfix[..postfix.len() - 1])),
        Some(c) => {
            let bumped = char::from(c as u8 + 1);
            format!("{}{}", &postfix[..postfix.len() - 1], bumped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_titles_get_postfixes() {
        let registry = ProjectCodeRegistry::new();
        let codes: Vec<String> = ["Alpha Test", "Alpha Test", "Alpha-Test-2"]
            .iter()
            .map(|t| registry.assign(t))
            .collect();
        assert_eq!(codes, vec!["AT", "ATA", "ATB"]);
    }

    #[test]
    fn cleared_registry_rederives_codes() {
        let registry = ProjectCodeRegistry::new();
        assert_eq!(registry.assign("Alpha Test"), "AT");
        registry.clear();
        assert_eq!(registry.assign("Alpha Test"), "AT");
    }

    #[test]
    fn single_word_is_uppercased_and_truncated() {
        let registry = ProjectCodeRegistry::new();
        assert_eq!(registry.assign("Backoffice2024"), "BACKOFFICE");
        assert_eq!(registry.assign("Backoffice"), "BACKOFFICA");
    }

    #[test]
    fn short_codes_are_padded() {
        let registry = ProjectCodeRegistry::new();
        assert_eq!(registry.assign("x"), "XA");
        assert_eq!(registry.assign("42"), "AA");
    }

    #[test]
    fn postfix_rolls_over() {
        assert_eq!(next_postfix(""), "A");
        assert_eq!(next_postfix("B"), "C");
        assert_eq!(next_postfix("Z"), "AA");
        assert_eq!(next_postfix("AZ"), "BA");
    }
}
