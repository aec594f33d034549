// Copyright 2024 pshell contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Splitting command lines into arguments and classifying/parsing them.
//!
//! The original C implementation hands callers pointers into a static
//! scratch buffer that stays valid only until the next `tokenize` call.
//! Here tokens borrow directly from the input `&str`, so the borrow
//! checker enforces that lifetime instead of a calling convention.

/// The result of [`tokenize`]: a sequence of non-empty substrings borrowed
/// from the original line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens<'a>(Vec<&'a str>);

impl<'a> Tokens<'a> {
    pub fn as_slice(&self) -> &[&'a str] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&'a str> {
        self.0.get(idx).copied()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, &'a str> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for Tokens<'a> {
    type Item = &'a str;
    type IntoIter = std::vec::IntoIter<&'a str>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Split `s` on any character in `delims`, discarding empty tokens between
/// consecutive delimiters.
pub fn tokenize<'a>(s: &'a str, delims: &str) -> Tokens<'a> {
    Tokens(s.split(|c| delims.contains(c)).filter(|t| !t.is_empty()).collect())
}

/// Split on any whitespace. Shorthand for the common case.
pub fn tokenize_whitespace(s: &str) -> Tokens<'_> {
    Tokens(s.split_whitespace().collect())
}

/// Non-empty, optional leading `-`, remaining characters all digits.
pub fn is_decimal(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Optional `0x`/`0X` prefix, remaining characters are hex digits.
/// When `need_hex_prefix` is true the prefix is mandatory.
pub fn is_hex(s: &str, need_hex_prefix: bool) -> bool {
    if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_hexdigit())
    } else {
        !need_hex_prefix && !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

/// Decimal or hex (prefix not required).
pub fn is_numeric(s: &str) -> bool {
    is_decimal(s) || is_hex(s, false)
}

/// Four dotted decimal octets, each in `[0, 255]`.
pub fn is_ipv4_addr(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 4 && parts.iter().all(|p| is_octet(p))
}

fn is_octet(s: &str) -> bool {
    !s.is_empty() && s.len() <= 3 && s.bytes().all(|b| b.is_ascii_digit()) && s.parse::<u16>().is_ok_and(|v| v <= 255)
}

/// An IPv4 address followed by `/` and a decimal mask length in `[0, 32]`.
pub fn is_ipv4_addr_and_mask(s: &str) -> bool {
    match s.split_once('/') {
        Some((addr, mask)) => {
            is_ipv4_addr(addr)
                && !mask.is_empty()
                && mask.bytes().all(|b| b.is_ascii_digit())
                && mask.parse::<u8>().is_ok_and(|v| v <= 32)
        }
        None => false,
    }
}

/// All characters are ASCII letters, non-empty.
pub fn is_alpha(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphabetic())
}

/// All characters are ASCII letters or digits, non-empty.
pub fn is_alphanumeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Optional sign, decimal integer part, mandatory `.`, decimal fraction.
pub fn is_float(s: &str) -> bool {
    let s = s.strip_prefix('-').or_else(|| s.strip_prefix('+')).unwrap_or(s);
    match s.split_once('.') {
        Some((whole, frac)) => {
            !whole.is_empty()
                && !frac.is_empty()
                && whole.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Parse an option in either `-Xvalue` (single letter) or `name=value` form.
///
/// If `name` is empty, extract-any mode is used: the option's name and
/// value are both returned regardless of what they are. Otherwise, the
/// value is returned only if the parsed option name matches `name`.
pub fn get_option<'a>(s: &'a str, name: &str) -> Option<(&'a str, &'a str)> {
    if let Some(rest) = s.strip_prefix('-') {
        if rest.is_empty() {
            return None;
        }
        let (opt, value) = rest.split_at(1);
        if name.is_empty() || name == opt {
            return Some((opt, value));
        }
        return None;
    }

    if let Some((opt, value)) = s.split_once('=') {
        if name.is_empty() || name == opt {
            return Some((opt, value));
        }
    }

    None
}

/// True if `a` is a prefix of `b` of at least `min_chars` characters, with
/// every matched character agreeing. Backs wildcard-style argument
/// matching against a known set of full keywords.
pub fn is_substring(a: &str, b: &str, min_chars: usize) -> bool {
    a.len() >= min_chars && a.len() <= b.len() && b.starts_with(a)
}

/// Typed argument extraction helpers layered over the classifiers above.
///
/// `PshellServer.h` in the original implementation exposes these as
/// `getBool`/`getInt`/`getFloat`/etc. so that a handler can turn a raw
/// `argv` entry into a numeric value without repeating the classify-then-
/// parse dance at every call site.
pub mod extract {
    use std::net::Ipv4Addr;

    pub fn get_bool(s: &str) -> Option<bool> {
        match s {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }

    fn parse_radix(s: &str) -> Option<(&str, u32)> {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some((rest, 16))
        } else {
            Some((s, 10))
        }
    }

    pub fn get_long(s: &str) -> Option<i64> {
        let (digits, neg) = match s.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let (digits, radix) = parse_radix(digits)?;
        let v = i64::from_str_radix(digits, radix).ok()?;
        Some(if neg { -v } else { v })
    }

    pub fn get_int(s: &str) -> Option<i32> {
        get_long(s).and_then(|v| i32::try_from(v).ok())
    }

    pub fn get_short(s: &str) -> Option<i16> {
        get_long(s).and_then(|v| i16::try_from(v).ok())
    }

    pub fn get_char(s: &str) -> Option<char> {
        let mut chars = s.chars();
        let c = chars.next()?;
        if chars.next().is_some() {
            None
        } else {
            Some(c)
        }
    }

    pub fn get_unsigned_long(s: &str) -> Option<u64> {
        let (digits, radix) = parse_radix(s)?;
        u64::from_str_radix(digits, radix).ok()
    }

    pub fn get_unsigned_int(s: &str) -> Option<u32> {
        get_unsigned_long(s).and_then(|v| u32::try_from(v).ok())
    }

    pub fn get_unsigned_short(s: &str) -> Option<u16> {
        get_unsigned_long(s).and_then(|v| u16::try_from(v).ok())
    }

    pub fn get_float(s: &str) -> Option<f32> {
        if super::is_float(s) {
            s.parse().ok()
        } else {
            None
        }
    }

    pub fn get_double(s: &str) -> Option<f64> {
        if super::is_float(s) {
            s.parse().ok()
        } else {
            None
        }
    }

    pub fn get_address(s: &str) -> Option<Ipv4Addr> {
        if super::is_ipv4_addr(s) {
            s.parse().ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tokenize_discards_empty_tokens() {
        let toks = tokenize_whitespace("  foo   bar  baz ");
        assert_eq!(toks.as_slice(), &["foo", "bar", "baz"]);
    }

    #[test]
    fn tokenize_custom_delims() {
        let toks = tokenize("a,,b;c", ",;");
        assert_eq!(toks.as_slice(), &["a", "b", "c"]);
    }

    #[test]
    fn token_borrowing_outlives_classification() {
        let line = String::from("echo hello world");
        let toks = tokenize_whitespace(&line);
        let first: &str = toks.get(0).unwrap();
        assert_eq!(first, "echo");
        // tokens remain valid as long as `line` is alive; this is the
        // borrow-checker equivalent of the "valid until next tokenize
        // call" contract.
        drop(toks);
        assert_eq!(&line[0..4], "echo");
    }

    #[test]
    fn decimal_classifier() {
        assert!(is_decimal("123"));
        assert!(is_decimal("-123"));
        assert!(!is_decimal(""));
        assert!(!is_decimal("-"));
        assert!(!is_decimal("12a"));
    }

    #[test]
    fn hex_classifier() {
        assert!(is_hex("0xFF", false));
        assert!(is_hex("0xFF", true));
        assert!(is_hex("FF", false));
        assert!(!is_hex("FF", true));
        assert!(!is_hex("0x", true));
    }

    #[test]
    fn ipv4_classifier() {
        assert!(is_ipv4_addr("192.168.1.1"));
        assert!(!is_ipv4_addr("192.168.1.256"));
        assert!(!is_ipv4_addr("192.168.1"));
        assert!(is_ipv4_addr_and_mask("10.0.0.0/8"));
        assert!(!is_ipv4_addr_and_mask("10.0.0.0/33"));
    }

    #[test]
    fn float_classifier() {
        assert!(is_float("3.14"));
        assert!(is_float("-3.14"));
        assert!(is_float("+3.0"));
        assert!(!is_float("3"));
        assert!(!is_float("3."));
        assert!(!is_float(".5"));
    }

    #[test]
    fn get_option_short_form() {
        assert_eq!(get_option("-v5", "v"), Some(("v", "5")));
        assert_eq!(get_option("-v5", "x"), None);
        assert_eq!(get_option("-v5", ""), Some(("v", "5")));
    }

    #[test]
    fn get_option_long_form() {
        assert_eq!(get_option("timeout=500", "timeout"), Some(("timeout", "500")));
        assert_eq!(get_option("timeout=500", "port"), None);
        assert_eq!(get_option("timeout=500", ""), Some(("timeout", "500")));
    }

    #[test]
    fn substring_match_respects_min_chars() {
        assert!(is_substring("se", "settings", 2));
        assert!(!is_substring("s", "settings", 2));
        assert!(!is_substring("settingsx", "settings", 2));
    }

    #[test]
    fn extract_helpers() {
        assert_eq!(extract::get_bool("yes"), Some(true));
        assert_eq!(extract::get_long("-42"), Some(-42));
        assert_eq!(extract::get_long("0x2A"), Some(42));
        assert_eq!(extract::get_unsigned_int("0xFF"), Some(255));
        assert_eq!(extract::get_float("1.5"), Some(1.5));
        assert_eq!(extract::get_address("127.0.0.1"), Some("127.0.0.1".parse().unwrap()));
    }
}
