//! Reference extraction and rewriting on formula text.
//!
//! Works on the `{...}` tokens directly so that renames preserve the rest of
//! the formula byte for byte.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use rustc_hash::FxHashSet;

use super::parser::RefToken;

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(.*?)\}").expect("static regex"))
}

/// Extract the distinct reference tokens of a formula, in order of first appearance.
pub fn extract_refs(formula: &str) -> Vec<RefToken> {
    let mut seen = FxHashSet::default();
    let mut refs = Vec::new();
    for caps in token_regex().captures_iter(formula) {
        let token = RefToken::from_inner(&caps[1]);
        if seen.insert(token.clone()) {
            refs.push(token);
        }
    }
    refs
}

/// Rewrite tokens that point at `page:old` so they point at `page:new`.
///
/// `formula_page` is the page the formula lives on: bare `{old}` tokens only
/// match when it equals `page`. Tokens keep their written form (bare or
/// page-qualified). Returns `None` if nothing changed.
pub fn rename_column_refs(
    formula: &str,
    formula_page: &str,
    page: &str,
    old: &str,
    new: &str,
) -> Option<String> {
    rewrite(formula, |token| {
        let target_page = token.page.as_deref().unwrap_or(formula_page);
        if target_page == page && token.column == old {
            Some(RefToken {
                page: token.page.clone(),
                column: new.to_string(),
            })
        } else {
            None
        }
    })
}

/// Rewrite `{old:col}` tokens to `{new:col}`. Bare tokens are untouched.
pub fn rename_page_refs(formula: &str, old: &str, new: &str) -> Option<String> {
    rewrite(formula, |token| match token.page.as_deref() {
        Some(p) if p == old => Some(RefToken {
            page: Some(new.to_string()),
            column: token.column.clone(),
        }),
        _ => None,
    })
}

fn rewrite<F>(formula: &str, map: F) -> Option<String>
where
    F: Fn(&RefToken) -> Option<RefToken>,
{
    let mut changed = false;
    let out = token_regex().replace_all(formula, |caps: &Captures| {
        let token = RefToken::from_inner(&caps[1]);
        match map(&token) {
            Some(replacement) => {
                changed = true;
                replacement.to_string()
            }
            None => caps[0].to_string(),
        }
    });
    changed.then(|| out.into_owned())
}
