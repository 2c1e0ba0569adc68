//! Structural key derivation
//!
//! A structural key is computed solely from an object's field names,
//! nesting, and value kinds; the values themselves never contribute.
//! Two states with the same shape always map to the same key, so a
//! caller can persist a state object without inventing an identifier:
//! the shape *is* the identifier.
//!
//! The key is the canonical shape descriptor itself rather than a hash
//! of it. Descriptors are deterministic across runs and toolchains,
//! which matters because keys end up on disk.

use serde_json::Value;

/// Derive the structural key for a state value.
///
/// Pure and deterministic: object fields are visited in sorted order,
/// so the order in which fields were inserted never changes the key.
///
/// Scalar kinds are `null`, `bool`, `num`, and `str`. Objects recurse
/// into their fields, arrays into the set of shapes of their elements:
///
/// ```
/// use serde_json::json;
/// use keepsake_core::shape_key;
///
/// assert_eq!(shape_key(&json!({"count": 1, "text": "hello"})), "{count:num,text:str}");
/// assert_eq!(shape_key(&json!([1, 2, 3])), "[num]");
/// ```
pub fn shape_key(value: &Value) -> String {
    let mut out = String::new();
    write_shape(value, &mut out);
    out
}

fn write_shape(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(_) => out.push_str("bool"),
        Value::Number(_) => out.push_str("num"),
        Value::String(_) => out.push_str("str"),
        Value::Array(items) => {
            // An array's shape is the set of its element shapes; length
            // and element order are values, not shape.
            let mut shapes: Vec<String> = items.iter().map(shape_key).collect();
            shapes.sort();
            shapes.dedup();
            out.push('[');
            out.push_str(&shapes.join("|"));
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(key);
                out.push(':');
                write_shape(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}
