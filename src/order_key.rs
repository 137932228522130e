//! Fractional order keys for ordered siblings.
//!
//! Keys are strings over `0-9a-z` compared byte-wise. A new sibling always
//! gets a key strictly between its neighbours, so inserting never rewrites
//! existing keys. Generated keys never end in `0` (the seed excepted): a key
//! ending in `0` leaves no room directly below-and-after it, since nothing
//! sorts strictly between `k` and `k + "0"`.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ValidationError;

/// Key returned when there are no neighbours at all.
pub const SEED_KEY: &str = "a0";

const KEY_PATTERN: &str = r"^[a-z0-9]+$";
const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const LETTERS: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";

fn key_regex() -> Result<&'static Regex, ValidationError> {
    static KEY_REGEX: OnceLock<Result<Regex, String>> = OnceLock::new();
    KEY_REGEX
        .get_or_init(|| Regex::new(KEY_PATTERN).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| ValidationError::InvalidKey {
            key: String::new(),
            reason: format!("key pattern failed to compile: {e}"),
        })
}

/// Checks that `key` is a well-formed order key.
pub fn validate_key(key: &str) -> Result<(), ValidationError> {
    if key_regex()?.is_match(key) {
        Ok(())
    } else {
        Err(ValidationError::InvalidKey {
            key: key.to_string(),
            reason: format!("must match {KEY_PATTERN}"),
        })
    }
}

/// Produces a key that sorts between `lower` and `upper`.
///
/// - no bounds: [`SEED_KEY`]
/// - only `lower`, or equal bounds: `lower + "a"`
/// - only `upper`: a key below `upper`, letter-first when one exists
/// - both: a key strictly between them
///
/// # Errors
///
/// `InvalidKey` if a bound is malformed, `InvalidBounds` if `lower > upper`,
/// and `NoKeyBetween` when `upper` is `lower` followed only by zeros (no
/// string sorts strictly between those).
pub fn generate_order_key(lower: Option<&str>, upper: Option<&str>) -> Result<String, ValidationError> {
    if let Some(l) = lower {
        validate_key(l)?;
    }
    if let Some(u) = upper {
        validate_key(u)?;
    }

    match (lower, upper) {
        (None, None) => Ok(SEED_KEY.to_string()),
        (Some(l), None) => Ok(format!("{l}a")),
        (Some(l), Some(u)) if l == u => Ok(format!("{l}a")),
        (Some(l), Some(u)) if l > u => Err(ValidationError::InvalidBounds {
            lower: l.to_string(),
            upper: u.to_string(),
        }),
        (Some(l), Some(u)) => between(l.as_bytes(), u.as_bytes())
            .map(into_key)
            .ok_or_else(|| no_key_between(l, u)),
        (None, Some(u)) => {
            let letter_first = if "a" < u { between(b"a", u.as_bytes()) } else { None };
            letter_first
                .or_else(|| between(b"", u.as_bytes()))
                .map(into_key)
                .ok_or_else(|| no_key_between("", u))
        }
    }
}

/// Maps a position to a base-26 letter key: `a..z`, then `za..zz`, `zza`, …
///
/// Keys are strictly increasing in `index`, so a batch of children created
/// together can be keyed without pairwise midpoint calls.
#[must_use]
pub fn generate_order_prefix(index: usize) -> String {
    let mut key = "z".repeat(index / LETTERS.len());
    key.push(char::from(LETTERS[index % LETTERS.len()]));
    key
}

/// Produces `count` increasing keys, all greater than `last`.
///
/// With no `last` these are plain [`generate_order_prefix`] keys; otherwise
/// each is `last` followed by a prefix key, which keeps the first one equal
/// to `generate_order_key(Some(last), None)`.
pub fn generate_order_keys_after(last: Option<&str>, count: usize) -> Result<Vec<String>, ValidationError> {
    if let Some(l) = last {
        validate_key(l)?;
    }
    Ok((0..count)
        .map(|i| {
            let suffix = generate_order_prefix(i);
            match last {
                Some(l) => format!("{l}{suffix}"),
                None => suffix,
            }
        })
        .collect())
}

fn no_key_between(lower: &str, upper: &str) -> ValidationError {
    ValidationError::NoKeyBetween {
        lower: lower.to_string(),
        upper: upper.to_string(),
    }
}

fn into_key(bytes: Vec<u8>) -> String {
    bytes.into_iter().map(char::from).collect()
}

fn digit(c: u8) -> usize {
    if c.is_ascii_digit() {
        usize::from(c - b'0')
    } else {
        usize::from(c - b'a') + 10
    }
}

/// Requires validated `a < b`. Returns `None` only when `b == a + "0…0"`.
fn between(mut a: &[u8], mut b: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(b.len() + 1);
    loop {
        let shared = a.iter().zip(b).take_while(|(x, y)| x == y).count();
        out.extend_from_slice(&b[..shared]);
        a = &a[shared..];
        b = &b[shared..];

        let hi = digit(*b.first()?);
        let Some(&lo) = a.first() else {
            // Lower bound exhausted: any non-empty string below `b` fits.
            if hi >= 2 {
                out.push(DIGITS[hi / 2]);
                return Some(out);
            }
            if hi == 1 {
                out.extend_from_slice(b"0a");
                return Some(out);
            }
            // `b` continues with '0'; the key must too.
            out.push(b'0');
            b = &b[1..];
            continue;
        };

        let lo = digit(lo);
        if hi - lo > 1 {
            out.push(DIGITS[(lo + hi + 1) / 2]);
            return Some(out);
        }
        // Adjacent digits: extend the rest of `a`, which stays below `b`
        // whatever follows `b[0]`.
        out.push(DIGITS[lo]);
        out.extend_from_slice(&a[1..]);
        out.push(b'a');
        return Some(out);
    }
}
