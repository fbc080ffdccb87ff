//! Semicolon stripping
//!
//! A crude guard against stacking several statements into one call.
//! Every `;` is removed, including ones inside string literals and
//! comments. It does not stop other separators or comment tricks.

use std::borrow::Cow;

/// Remove every literal `;` from `sql`.
///
/// Borrows the input unchanged when there is nothing to strip.
pub fn strip_semicolons(sql: &str) -> Cow<'_, str> {
    if sql.contains(';') {
        Cow::Owned(sql.replace(';', ""))
    } else {
        Cow::Borrowed(sql)
    }
}
