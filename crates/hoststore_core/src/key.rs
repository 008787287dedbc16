//! Key construction.
//!
//! Keys are printable strings built from a printf-style template:
//!
//! | Placeholder | Meaning |
//! |---|---|
//! | `%s` | next argument, via `Display` |
//! | `%d` | next argument, via `Display` (documents a numeric slot) |
//! | `%%` | a literal `%` |
//!
//! Arguments are substituted as-is. Callers normalize them first, in
//! particular stripping [`SEPARATOR`], which delimits namespaces.

use crate::error::{CoreError, CoreResult};
use std::fmt::{self, Write};

/// Namespace separator inside keys.
pub const SEPARATOR: char = ':';

/// Builds a key by substituting `args` into `template`.
///
/// # Errors
///
/// Returns a validation error if the template contains an unknown
/// placeholder, or if the number of placeholders and arguments differ.
///
/// # Example
///
/// ```
/// use hoststore_core::format_key;
///
/// let key = format_key("%s:user:security-log:", &[&"u1"]).unwrap();
/// assert_eq!(key, "u1:user:security-log:");
/// ```
pub fn format_key(template: &str, args: &[&dyn fmt::Display]) -> CoreResult<String> {
    let mut out = String::with_capacity(template.len() + 16 * args.len());
    let mut args_iter = args.iter();
    let mut used = 0usize;
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s' | 'd') => {
                let arg = args_iter.next().ok_or_else(|| {
                    CoreError::validation(format!(
                        "key template {template:?} needs more than {} arguments",
                        args.len()
                    ))
                })?;
                write!(out, "{arg}")
                    .map_err(|_| CoreError::validation("key argument failed to format"))?;
                used += 1;
            }
            Some(other) => {
                return Err(CoreError::validation(format!(
                    "unknown placeholder %{other} in key template {template:?}"
                )))
            }
            None => {
                return Err(CoreError::validation(format!(
                    "dangling % in key template {template:?}"
                )))
            }
        }
    }

    if used != args.len() {
        return Err(CoreError::validation(format!(
            "key template {template:?} takes {used} arguments, got {}",
            args.len()
        )));
    }
    Ok(out)
}

/// Builds a key from a template and arguments.
///
/// Shorthand for [`format_key`].
///
/// ```
/// use hoststore_core::key;
///
/// let name = "faq";
/// assert_eq!(key!("page:%s", name).unwrap(), "page:faq");
/// assert_eq!(key!("pages").unwrap(), "pages");
/// ```
#[macro_export]
macro_rules! key {
    ($template:expr) => {
        $crate::format_key($template, &[])
    };
    ($template:expr, $($arg:expr),+ $(,)?) => {
        $crate::format_key($template, &[$(&$arg as &dyn ::std::fmt::Display),+])
    };
}

/// Rejects keys the store will not accept.
///
/// # Errors
///
/// Returns a validation error for an empty key.
pub fn validate_key(key: &str) -> CoreResult<()> {
    if key.is_empty() {
        return Err(CoreError::validation("key is empty"));
    }
    Ok(())
}
