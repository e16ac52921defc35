//! `JSON` library class, published by `require "json"`.

use std::collections::BTreeMap;

use super::{Methods, check_argc, define_meta, no_new, str_arg};
use crate::vm::{ClassId, ClassTable, ErrorKind, Thread, Value, VmResult};

const CLASS_METHODS: Methods = &[("new", no_new), ("parse", parse)];

pub(super) fn install(classes: &ClassTable, class: ClassId) {
    define_meta(classes, class, CLASS_METHODS);
}

fn parse(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let source = str_arg(t, args, 0)?;
    match serde_json::from_str::<serde_json::Value>(source) {
        Ok(document) => Ok(from_json(document)),
        Err(err) => Err(t.error(
            ErrorKind::InternalError,
            format!("Can't parse string `{source}` as json: {err}"),
        )),
    }
}

/// Integral numbers become `Integer`, other numbers `Float`.
fn from_json(document: serde_json::Value) -> Value {
    match document {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(flag) => Value::Bool(flag),
        serde_json::Value::Number(number) => match number.as_i64() {
            Some(int) => Value::Int(int),
            None => Value::Float(number.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(text) => Value::from(text),
        serde_json::Value::Array(items) => Value::array(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(fields) => Value::hash(
            fields
                .into_iter()
                .map(|(key, value)| (key, from_json(value)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_map_onto_lito_values() {
        let document = serde_json::json!({"a": 1, "b": [true, null, 2.5], "c": "x"});
        let Value::Hash(hash) = from_json(document) else {
            panic!("expected a hash");
        };
        assert_eq!(hash.get("a").and_then(|v| v.as_int()), Some(1));
        assert_eq!(hash.get("c").and_then(|v| v.as_str().map(str::to_string)).as_deref(), Some("x"));
        let Some(Value::Array(list)) = hash.get("b") else {
            panic!("expected an array");
        };
        assert_eq!(list.len(), 3);
        assert!(list.get(1).is_some_and(|v| v.is_nil()));
        assert_eq!(list.get(2).and_then(|v| v.as_number()), Some(2.5));
    }
}
