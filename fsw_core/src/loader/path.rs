//! Key-path resolution: `a.b[2].c-d`.

use serde_json::Value;

use crate::error::LoaderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'k> {
    Field(&'k str),
    Index(usize),
}

/// Split a key path into field and index segments.
///
/// Each dot-separated part is a field name followed by zero or more `[n]`
/// suffixes. A part may omit the name only when it carries an index.
pub(crate) fn parse(key: &str) -> Option<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    for part in key.split('.') {
        let name_end = part.find('[').unwrap_or(part.len());
        let (name, mut rest) = part.split_at(name_end);
        if name.is_empty() && rest.is_empty() {
            return None;
        }
        if !name.is_empty() {
            segments.push(Segment::Field(name));
        }
        while !rest.is_empty() {
            let inner = rest.strip_prefix('[')?;
            let close = inner.find(']')?;
            let digits = &inner[..close];
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            segments.push(Segment::Index(digits.parse().ok()?));
            rest = &inner[close + 1..];
        }
    }
    Some(segments)
}

/// Walk `root` along `key`. `Ok(None)` if any segment is absent.
pub(crate) fn resolve<'v>(root: &'v Value, key: &str) -> Result<Option<&'v Value>, LoaderError> {
    let segments = parse(key).ok_or_else(|| LoaderError::BadKeyPath {
        key: key.to_owned(),
    })?;
    let mut node = root;
    for segment in segments {
        let next = match segment {
            Segment::Field(name) => node.as_object().and_then(|map| map.get(name)),
            Segment::Index(i) => node.as_array().and_then(|items| items.get(i)),
        };
        match next {
            Some(value) => node = value,
            None => return Ok(None),
        }
    }
    Ok(Some(node))
}
