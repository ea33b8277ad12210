//! JSON encoding for arbitrarily deep process trees
//!
//! serde_json caps nesting at 128 levels and the derived visitors recurse once
//! per level. Decoding here lifts the cap and lets the stack grow on demand,
//! so a ten-thousand step chain round-trips like a short one.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Headroom below which a nested call moves to a fresh stack segment
const RED_ZONE: usize = 64 * 1024;
/// Size of each fresh segment
const STACK_SEGMENT: usize = 2 * 1024 * 1024;

/// Run `f`, first growing the stack if it is nearly exhausted
pub(crate) fn with_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, f)
}

/// Decode `source` without a depth limit
pub fn from_str<T: DeserializeOwned>(source: &str) -> serde_json::Result<T> {
    let mut de = serde_json::Deserializer::from_str(source);
    de.disable_recursion_limit();
    let value = with_stack(|| T::deserialize(serde_stacker::Deserializer::new(&mut de)))?;
    de.end()?;
    Ok(value)
}

/// Encode `value`; nested processes grow the stack as they go
pub fn to_string<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    with_stack(|| serde_json::to_string(value))
}
