//! Canonical camera identifiers and photo storage keys.
//!
//! A photo key has the shape
//! `{canonical_terminal}_{canonical_camera}_{YYYY-MM-DD_HH:MM:SS}[_approx]`
//! where the timestamp is the site-local civil time of the capture.
//! Downstream consumers split keys back apart with [`parse_photo_key`].

use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

/// strftime format of the timestamp segment of a photo key.
pub const KEY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// Suffix appended to keys whose timestamp is a now() approximation.
pub const APPROX_SUFFIX: &str = "_approx";

/// Extensions a photo key may already carry.
pub const PHOTO_EXTENSIONS: [&str; 3] = [".png", ".jpg", ".jpeg"];

/// Extension appended to keys that carry none of [`PHOTO_EXTENSIONS`].
pub const DEFAULT_PHOTO_EXTENSION: &str = ".jpg";

/// Length of a formatted [`KEY_TIMESTAMP_FORMAT`] value.
const KEY_TIMESTAMP_LEN: usize = 19;

/// Normalize a display name into a `[a-z0-9_]` identifier.
///
/// Lower-cases, collapses runs of whitespace/underscores into one `_`,
/// drops everything else outside `[a-z0-9_]`, then trims `_` from both ends.
pub fn canonicalize(name: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let separators = SEPARATORS.get_or_init(|| Regex::new(r"[\s_]+").unwrap());

    let lowered = name.to_lowercase();
    let collapsed = separators.replace_all(&lowered, "_");
    let stripped: String = collapsed
        .chars()
        .filter(|c| matches!(c, 'a'..='z' | '0'..='9' | '_'))
        .collect();

    // Stripping can leave underscores adjacent ("a _ b" has none, "a-_ b" does).
    let mut out = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}

/// `{canonical_terminal}_{canonical_camera}`.
pub fn full_name(terminal: &str, camera: &str) -> String {
    format!("{}_{}", canonicalize(terminal), canonicalize(camera))
}

/// Storage key for a capture taken at `timestamp`, rendered in the site zone.
pub fn photo_key(full_name: &str, timestamp: DateTime<Utc>, tz: Tz, approx: bool) -> String {
    let local = timestamp.with_timezone(&tz);
    let mut key = format!("{}_{}", full_name, local.format(KEY_TIMESTAMP_FORMAT));
    if approx {
        key.push_str(APPROX_SUFFIX);
    }
    key
}

/// The instant a key rendered for `timestamp` parses back to.
///
/// Differs from `timestamp` only inside a DST fall-back hour, where the
/// repeated local time resolves to its earlier occurrence.
pub fn key_instant(timestamp: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = timestamp.with_timezone(&tz).naive_local();
    match tz.from_local_datetime(&local).earliest() {
        Some(earliest) => earliest.with_timezone(&Utc),
        None => timestamp,
    }
}

/// Appends [`DEFAULT_PHOTO_EXTENSION`] unless the key already ends in a
/// recognised image extension (case-insensitive).
pub fn with_photo_extension(key: &str) -> String {
    let lowered = key.to_lowercase();
    if PHOTO_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext)) {
        key.to_string()
    } else {
        format!("{}{}", key, DEFAULT_PHOTO_EXTENSION)
    }
}

/// A photo key split back into its parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhotoKey {
    pub full_name: String,
    pub local_time: NaiveDateTime,
    pub timestamp: DateTime<Utc>,
    pub approx: bool,
}

/// Parse a key produced by [`photo_key`] (with or without an extension).
///
/// Local times that fall into a DST overlap resolve to the earlier instant.
pub fn parse_photo_key(key: &str, tz: Tz) -> Result<PhotoKey> {
    let mut rest = key;
    let lowered = rest.to_lowercase();
    if let Some(ext) = PHOTO_EXTENSIONS.iter().find(|ext| lowered.ends_with(*ext)) {
        rest = &rest[..rest.len() - ext.len()];
    }
    let approx = rest.ends_with(APPROX_SUFFIX);
    if approx {
        rest = &rest[..rest.len() - APPROX_SUFFIX.len()];
    }

    if rest.len() < KEY_TIMESTAMP_LEN + 2 || !rest.is_char_boundary(rest.len() - KEY_TIMESTAMP_LEN)
    {
        return Err(anyhow!("photo key '{}' is too short", key));
    }
    let (head, stamp) = rest.split_at(rest.len() - KEY_TIMESTAMP_LEN);
    let full_name = head
        .strip_suffix('_')
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow!("photo key '{}' has no camera name", key))?;

    let (local_time, timestamp) = local_to_utc(stamp, KEY_TIMESTAMP_FORMAT, tz)
        .map_err(|e| anyhow!("photo key '{}': {}", key, e))?;

    Ok(PhotoKey {
        full_name: full_name.to_string(),
        local_time,
        timestamp,
        approx,
    })
}

/// Convert a key-style local time (`YYYY-MM-DD_HH:MM:SS[_approx]`) to an
/// absolute instant; the flag reports the `_approx` suffix.
pub fn key_time_to_utc(stamp: &str, tz: Tz) -> Result<(DateTime<Utc>, bool)> {
    let trimmed = stamp.trim();
    let (stamp, approx) = match trimmed.strip_suffix(APPROX_SUFFIX) {
        Some(rest) => (rest, true),
        None => (trimmed, false),
    };
    let (_, timestamp) = local_to_utc(stamp, KEY_TIMESTAMP_FORMAT, tz)?;
    Ok((timestamp, approx))
}

/// Interpret `text` (formatted with `format`) as civil time in `tz`.
pub(crate) fn local_to_utc(
    text: &str,
    format: &str,
    tz: Tz,
) -> Result<(NaiveDateTime, DateTime<Utc>)> {
    let naive = NaiveDateTime::parse_from_str(text, format)
        .map_err(|e| anyhow!("cannot parse '{}' as {}: {}", text, format, e))?;
    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| anyhow!("{} does not exist in {}", naive, tz.name()))?;
    Ok((naive, local.with_timezone(&Utc)))
}
