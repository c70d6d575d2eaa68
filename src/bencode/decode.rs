use super::error::BencodeError;
use super::value::Value;
use bytes::Bytes;
use std::collections::BTreeMap;

const MAX_DEPTH: usize = 64;

/// Decodes a single bencode value, requiring the input to be fully consumed.
///
/// Use this for self-contained documents such as `.torrent` files and
/// tracker responses, where trailing bytes indicate corruption.
///
/// # Errors
///
/// Returns [`BencodeError::TrailingData`] if bytes remain after the value,
/// or any decoding error from [`decode_prefix`].
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let (value, rest) = decode_prefix(data)?;

    if !rest.is_empty() {
        return Err(BencodeError::TrailingData);
    }

    Ok(value)
}

/// Decodes a single bencode value from the front of `data`, returning the
/// value together with the unconsumed remainder.
///
/// # Examples
///
/// ```
/// use minnow::bencode::decode_prefix;
///
/// let (value, rest) = decode_prefix(b"4:spam3:egg").unwrap();
/// assert_eq!(value.as_str(), Some("spam"));
/// assert_eq!(rest, b"3:egg");
/// ```
pub fn decode_prefix(data: &[u8]) -> Result<(Value, &[u8]), BencodeError> {
    decode_value(data, 0)
}

fn decode_value(data: &[u8], depth: usize) -> Result<(Value, &[u8]), BencodeError> {
    if depth > MAX_DEPTH {
        return Err(BencodeError::NestingTooDeep);
    }

    match data.first() {
        None => Err(BencodeError::UnexpectedEof),
        Some(b'i') => decode_integer(&data[1..]),
        Some(b'l') => decode_list(&data[1..], depth),
        Some(b'd') => decode_dict(&data[1..], depth),
        Some(b'0'..=b'9') => decode_bytes(data),
        Some(&c) => Err(BencodeError::UnexpectedChar(c as char)),
    }
}

fn decode_integer(data: &[u8]) -> Result<(Value, &[u8]), BencodeError> {
    let end = data
        .iter()
        .position(|&b| b == b'e')
        .ok_or(BencodeError::UnexpectedEof)?;

    let digits = std::str::from_utf8(&data[..end])
        .map_err(|_| BencodeError::InvalidInteger("invalid utf8".into()))?;

    if digits.is_empty() {
        return Err(BencodeError::InvalidInteger("empty".into()));
    }

    if digits.starts_with("-0") || (digits.starts_with('0') && digits.len() > 1) {
        return Err(BencodeError::InvalidInteger("leading zeros".into()));
    }

    let value: i64 = digits
        .parse()
        .map_err(|_| BencodeError::InvalidInteger(digits.into()))?;

    Ok((Value::Integer(value), &data[end + 1..]))
}

fn decode_bytes(data: &[u8]) -> Result<(Value, &[u8]), BencodeError> {
    let sep = data
        .iter()
        .position(|&b| b == b':')
        .ok_or(BencodeError::UnexpectedEof)?;

    let len: usize = std::str::from_utf8(&data[..sep])
        .ok()
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse().ok())
        .ok_or(BencodeError::InvalidStringLength)?;

    let rest = &data[sep + 1..];

    if rest.len() < len {
        return Err(BencodeError::UnexpectedEof);
    }

    let bytes = Bytes::copy_from_slice(&rest[..len]);
    Ok((Value::Bytes(bytes), &rest[len..]))
}

fn decode_list(mut data: &[u8], depth: usize) -> Result<(Value, &[u8]), BencodeError> {
    let mut list = Vec::new();

    loop {
        match data.first() {
            None => return Err(BencodeError::UnexpectedEof),
            Some(b'e') => return Ok((Value::List(list), &data[1..])),
            Some(_) => {
                let (value, rest) = decode_value(data, depth + 1)?;
                list.push(value);
                data = rest;
            }
        }
    }
}

fn decode_dict(mut data: &[u8], depth: usize) -> Result<(Value, &[u8]), BencodeError> {
    let mut dict = BTreeMap::new();

    loop {
        match data.first() {
            None => return Err(BencodeError::UnexpectedEof),
            Some(b'e') => return Ok((Value::Dict(dict), &data[1..])),
            Some(_) => {
                let (key, rest) = match decode_value(data, depth + 1)? {
                    (Value::Bytes(b), rest) => (b, rest),
                    _ => return Err(BencodeError::InvalidDictKey),
                };

                let (value, rest) = decode_value(rest, depth + 1)?;
                dict.insert(key, value);
                data = rest;
            }
        }
    }
}
