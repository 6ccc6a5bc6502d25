//! Accent stripping for locality names used as weather query keys.

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Removes diacritics: canonical decomposition, drop combining marks, recompose.
///
/// There is no failure path; any input yields a value.
pub fn normalize(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).nfc().collect()
}
