//! Serde helpers shared by every record that carries a timestamp or a numeric flag.
//!
//! The remote reports instants as `2024-01-31T12:00:00.000Z`. All record types route
//! their date fields through this module so the format lives in exactly one place.

use chrono::{DateTime, NaiveDateTime, ParseError, Utc};

/// Format used when rendering timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Lenient parse pattern; the fractional part is optional.
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Render a timestamp in the remote's wire format.
#[must_use]
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp in the remote's wire format, falling back to RFC 3339 offsets.
///
/// # Errors
///
/// Returns the parse error of the wire format when neither form matches.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ParseError> {
    let trimmed = raw.trim();
    match NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_PARSE_FORMAT) {
        Ok(naive) => Ok(naive.and_utc()),
        Err(err) => DateTime::parse_from_rfc3339(trimmed)
            .map(|value| value.with_timezone(&Utc))
            .map_err(|_| err),
    }
}

/// `#[serde(with = "codec::timestamp")]` for required timestamps.
pub mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    /// Serialize using [`super::TIMESTAMP_FORMAT`].
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_timestamp(value))
    }

    /// Deserialize from the wire format.
    ///
    /// # Errors
    ///
    /// Fails when the string is not a recognised timestamp.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(D::Error::custom)
    }
}

/// `#[serde(with = "codec::optional_timestamp")]` for nullable timestamps.
///
/// Missing, `null`, and empty strings all decode to `None`.
pub mod optional_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    /// Serialize `Some` with [`super::TIMESTAMP_FORMAT`] and `None` as `null`.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => serializer.serialize_str(&super::format_timestamp(value)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional timestamp.
    ///
    /// # Errors
    ///
    /// Fails when a non-empty string is not a recognised timestamp.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => super::parse_timestamp(value)
                .map(Some)
                .map_err(D::Error::custom),
        }
    }
}

/// `#[serde(with = "codec::flag")]` for booleans the remote encodes as `0` / `1`.
pub mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Number(i64),
        Bool(bool),
    }

    /// Serialize as `1` or `0`.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(u8::from(*value))
    }

    /// Deserialize from an integer (non-zero is `true`) or a JSON boolean.
    ///
    /// # Errors
    ///
    /// Fails for any other JSON type.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Wire::deserialize(deserializer)? {
            Wire::Number(value) => value != 0,
            Wire::Bool(value) => value,
        })
    }
}
