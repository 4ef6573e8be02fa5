// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Escaping of application values into command-safe strings.
//!
//! The CRDTs only ever store and compare escaped strings. The interpreters escape values on the
//! way in and unescape them on the way out, with a [`ValueCodec`] picked by the application.

/// A reversible mapping between application values and the strings carried in commands.
pub trait ValueCodec {
    type Value;

    fn escape(value: &Self::Value) -> String;

    /// Reverses [`ValueCodec::escape`].
    ///
    /// Must accept any string, including ones not produced by `escape` (written by a peer with a
    /// different codec, say).
    fn unescape(escaped: &str) -> Self::Value;
}

/// Stores strings as they are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCodec;

impl ValueCodec for RawCodec {
    type Value = String;

    fn escape(value: &String) -> String {
        value.clone()
    }

    fn unescape(escaped: &str) -> String {
        escaped.to_string()
    }
}

/// Stores arbitrary JSON values in their compact serialization.
///
/// ```rust
/// # use cowrite::codec::{JsonCodec, ValueCodec};
/// # use serde_json::json;
/// assert_eq!(JsonCodec::escape(&json!("snakes")), r#""snakes""#);
/// assert_eq!(JsonCodec::unescape(r#"{"a":[1,2]}"#), json!({ "a": [1, 2] }));
///
/// // anything that isn't JSON is taken to be a bare string
/// assert_eq!(JsonCodec::unescape("snakes"), json!("snakes"));
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl ValueCodec for JsonCodec {
    type Value = serde_json::Value;

    fn escape(value: &serde_json::Value) -> String {
        value.to_string()
    }

    fn unescape(escaped: &str) -> serde_json::Value {
        serde_json::from_str(escaped).unwrap_or_else(|_| {
            tracing::trace!(escaped, "value is not JSON, reading it as a string");
            serde_json::Value::String(escaped.to_string())
        })
    }
}
