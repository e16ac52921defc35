use std::sync::Arc;

use super::{Methods, check_argc, define, define_meta, str_arg};
use crate::vm::value::RegexpObject;
use crate::vm::{ClassId, ClassTable, ErrorKind, Thread, Value, VmResult};

const CLASS_METHODS: Methods = &[("new", new)];

const METHODS: Methods = &[("=~", match_index), ("match?", is_match)];

pub(super) fn install(classes: &ClassTable, class: ClassId) {
    define_meta(classes, class, CLASS_METHODS);
    define(classes, class, METHODS);
}

pub(crate) fn compile(source: &str) -> Option<RegexpObject> {
    let regex = regex::Regex::new(source).ok()?;
    Some(RegexpObject {
        source: source.to_string(),
        regex,
    })
}

fn new(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let source = str_arg(t, args, 0)?;
    match compile(source) {
        Some(regexp) => Ok(Value::Regexp(Arc::new(regexp))),
        None => Err(t.error(
            ErrorKind::ArgumentError,
            format!("Invalid regexp: {source}"),
        )),
    }
}

fn regex(receiver: &Value) -> Option<&regex::Regex> {
    match receiver {
        Value::Regexp(regexp) => Some(&regexp.regex),
        _ => None,
    }
}

fn is_match(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let input = str_arg(t, args, 0)?;
    Ok(Value::Bool(regex(receiver).is_some_and(|re| re.is_match(input))))
}

/// Character offset of the first match in the argument, or nil.
fn match_index(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let input = str_arg(t, args, 0)?;
    let found = regex(receiver).and_then(|re| re.find(input));
    Ok(found.map_or(Value::Nil, |found| {
        Value::Int(input[..found.start()].chars().count() as i64)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_patterns_do_not_compile() {
        assert!(compile("a(").is_none());
        let regexp = compile("^h.l+o$").expect("valid pattern");
        assert!(regexp.regex.is_match("hello"));
        assert_eq!(regexp.source, "^h.l+o$");
    }
}
