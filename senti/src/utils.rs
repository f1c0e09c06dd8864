use std::io::{Read, Write};

use bincode::{Decode, Encode};

use crate::errors::{Result, SentiError};

/// Writes `magic` followed by the bincode representation of `data`.
pub fn write_with_magic<W, T>(mut wtr: W, magic: &[u8], data: &T) -> Result<()>
where
    W: Write,
    T: Encode,
{
    wtr.write_all(magic)?;
    let config = bincode::config::standard();
    bincode::encode_into_std_write(data, &mut wtr, config)?;
    Ok(())
}

/// Reads the whole of `rdr`, checks the leading `magic`, and decodes the rest.
pub fn read_with_magic<R, T>(mut rdr: R, magic: &[u8], what: &str) -> Result<T>
where
    R: Read,
    T: Decode<()>,
{
    let mut buf = vec![];
    rdr.read_to_end(&mut buf)?;
    if buf.len() < magic.len() || &buf[..magic.len()] != magic {
        return Err(SentiError::invalid_model(format!(
            "the file is not a {what}"
        )));
    }
    let config = bincode::config::standard();
    let (data, size) = bincode::decode_from_slice(&buf[magic.len()..], config)?;
    if magic.len() + size != buf.len() {
        return Err(SentiError::invalid_model(format!(
            "trailing bytes after the {what}"
        )));
    }
    Ok(data)
}

/// Rounds half away from zero to `digits` decimal places.
#[inline]
pub fn round_to(x: f64, digits: i32) -> f64 {
    let p = 10f64.powi(digits);
    (x * p).round() / p
}

/// Returns `true` if `s` has at least one cased character and all of them are upper-case.
pub fn is_upper(s: &str) -> bool {
    let mut has_cased = false;
    for c in s.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            has_cased = true;
        }
    }
    has_cased
}

/// Strips leading and trailing ASCII punctuation, but keeps tokens such as emoticons whose
/// stripped form would have two characters or less.
pub fn strip_punct_if_word(token: &str) -> &str {
    let stripped = token.trim_matches(|c: char| c.is_ascii_punctuation());
    if stripped.chars().count() <= 2 {
        token
    } else {
        stripped
    }
}
