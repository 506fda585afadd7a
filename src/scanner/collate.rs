//! Locale-aware ordering for package names and source lines.
//!
//! Follows the multi-level shape of Unicode collation for English text rather
//! than raw byte order:
//!
//! 1. primary: punctuation and symbols sort before digits, digits before
//!    letters, letters compare case-insensitively;
//! 2. tertiary: at the first case difference, lowercase sorts first;
//! 3. finally byte order, so distinct strings never compare equal.
//!
//! Byte order disagrees with this for mixed case (`Zlib` before `apt`) and for
//! characters such as `_` that sit between upper and lower case in ASCII.

use std::cmp::Ordering;

/// Compares two strings in collation order.
///
/// ```
/// use imagemeta::scanner::collate;
/// use std::cmp::Ordering;
///
/// assert_eq!(collate::compare("apt", "Zlib"), Ordering::Less);
/// ```
pub fn compare(a: &str, b: &str) -> Ordering {
    primary(a)
        .cmp(primary(b))
        .then_with(|| tertiary(a, b))
        .then_with(|| a.cmp(b))
}

/// Sorts strings in collation order.
pub fn sort(items: &mut [String]) {
    items.sort_by(|a, b| compare(a, b));
}

fn primary(s: &str) -> impl Iterator<Item = (u8, char)> + '_ {
    s.chars().flat_map(|c| {
        let class = if c.is_alphabetic() {
            2
        } else if c.is_numeric() {
            1
        } else {
            0
        };
        c.to_lowercase().map(move |folded| (class, folded))
    })
}

fn tertiary(a: &str, b: &str) -> Ordering {
    for (x, y) in a.chars().zip(b.chars()) {
        if x != y && x.to_lowercase().eq(y.to_lowercase()) {
            return match (x.is_lowercase(), y.is_lowercase()) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => Ordering::Equal,
            };
        }
    }
    Ordering::Equal
}
