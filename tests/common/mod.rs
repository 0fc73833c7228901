#![allow(dead_code)]

pub mod strategies;

pub use strategies::*;

use maison_core::queue::Payload;
use serde_json::Value;

/// Object payload from a `json!` literal
pub fn payload(value: Value) -> Payload {
    value.as_object().cloned().unwrap_or_default()
}
