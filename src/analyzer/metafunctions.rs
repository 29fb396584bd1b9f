//! Compile-time metafunctions: the template directive and the inline
//! compile-time block's `@emit`/`@print` intrinsics.

use crate::ast::Item;
use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{(\d+)\}").unwrap();
}

/// Expands a template string by substituting `{0}`, `{1}`, ... with the
/// positional arguments. The expansion is a pure function of its inputs;
/// the caller is responsible for re-parsing the result as source text
/// (this crate does not implement a parser, see the `reparse` hook on
/// `CompileOptions`).
pub fn expand_template(name: &str, args: &[String]) -> Result<String> {
    let mut failed = false;
    let expanded = PLACEHOLDER.replace_all(name, |caps: &regex::Captures| {
        let idx: usize = caps[1].parse().unwrap_or(usize::MAX);
        match args.get(idx) {
            Some(a) => a.clone(),
            None => {
                failed = true;
                String::new()
            }
        }
    });
    if failed {
        return Err(Error::TemplateExpansion {
            span: crate::error::Span::default(),
            message: format!("template `{}` references an argument index out of range", name),
        });
    }
    Ok(expanded.into_owned())
}

/// The text a driver-supplied reparse hook must turn back into items; kept
/// as a distinct type so callers don't need to depend on a parser crate to
/// link against this one.
pub type ReparseHook = std::sync::Arc<dyn Fn(&str) -> Result<Vec<Item>> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_positional_placeholders() {
        let out = expand_template("fun {0}() -> u8 {{ return {1}; }}", &["answer".into(), "42".into()]).unwrap();
        assert_eq!(out, "fun answer() -> u8 {{ return 42; }}");
    }

    #[test]
    fn out_of_range_placeholder_errors() {
        let err = expand_template("{5}", &["a".into()]);
        assert!(err.is_err());
    }
}
