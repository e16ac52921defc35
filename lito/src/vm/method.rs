use std::sync::Arc;

use super::error::VmResult;
use super::thread::Thread;
use super::value::Value;
use crate::bytecode::{ArgSet, ArgType, InstructionSet};

pub type NativeFn = fn(&mut Thread, &Value, &[Value]) -> VmResult<Value>;

#[derive(Clone, Debug)]
pub enum BuiltinBody {
    Native(NativeFn),
    /// Generated by `property`/`get`: reads `@name`.
    Getter(String),
    /// Generated by `property`/`set`: writes `@name`.
    Setter(String),
}

#[derive(Debug)]
pub struct BuiltinMethod {
    pub name: Arc<str>,
    pub body: BuiltinBody,
}

impl BuiltinMethod {
    pub fn native(name: &str, func: NativeFn) -> Self {
        Self {
            name: Arc::from(name),
            body: BuiltinBody::Native(func),
        }
    }
}

/// Method defined in Lito source.
#[derive(Debug)]
pub struct MethodObject {
    pub name: String,
    pub set: Arc<InstructionSet>,
    pub argc: usize,
}

impl MethodObject {
    pub fn params(&self) -> &ArgSet {
        &self.set.arg_types
    }

    pub fn has_splat(&self) -> bool {
        self.params().types.contains(&ArgType::Splat)
    }

    pub fn normal_param_count(&self) -> usize {
        self.params().count(ArgType::Normal)
    }
}

#[derive(Clone, Debug)]
pub enum Callable {
    Lito(Arc<MethodObject>),
    Builtin(Arc<BuiltinMethod>),
}

impl Callable {
    pub fn builtin(name: &str, func: NativeFn) -> Self {
        Callable::Builtin(Arc::new(BuiltinMethod::native(name, func)))
    }

    pub fn name(&self) -> &str {
        match self {
            Callable::Lito(method) => &method.name,
            Callable::Builtin(method) => &method.name,
        }
    }
}

/// Maps call-site arguments onto parameter slots. Unbound slots stay `None`
/// so their default expressions run.
pub fn bind_arguments(
    method: &MethodObject,
    args: &[Value],
    call_site: Option<&ArgSet>,
) -> Result<Vec<Option<Value>>, String> {
    let params = method.params();
    let argc = args.len();
    let normal_params = method.normal_param_count();
    let arg_kind = |index: usize| {
        call_site
            .and_then(|set| set.types.get(index).copied())
            .unwrap_or(ArgType::Normal)
    };
    let arg_name = |index: usize| {
        call_site
            .and_then(|set| set.names.get(index))
            .map(String::as_str)
            .unwrap_or("")
    };

    if argc > params.len() && !method.has_splat() {
        return Err(format!(
            "Expect at most {} args for method '{}'. got: {argc}",
            params.len(),
            method.name
        ));
    }
    if normal_params > argc {
        return Err(format!(
            "Expect at least {normal_params} args for method '{}'. got: {argc}",
            method.name
        ));
    }

    let keyword_argument = |name: &str| {
        (0..argc).find(|&index| arg_kind(index).is_keyword() && arg_name(index) == name)
    };
    for (name, kind) in params.names.iter().zip(&params.types) {
        if *kind == ArgType::RequiredKeyword && keyword_argument(name).is_none() {
            return Err(format!(
                "Method {} requires key argument {name}",
                method.name
            ));
        }
    }

    let mut slots: Vec<Option<Value>> = vec![None; params.len()];

    for (index, value) in args.iter().enumerate() {
        if !arg_kind(index).is_keyword() {
            continue;
        }
        let name = arg_name(index);
        let param = params
            .names
            .iter()
            .zip(&params.types)
            .position(|(param, kind)| param == name && kind.is_keyword());
        match param {
            Some(param) => slots[param] = Some(value.clone()),
            None => {
                return Err(format!("unknown key {name} for method {}", method.name));
            }
        }
    }

    if normal_params < argc {
        let mut last_bound: Option<usize> = None;
        for (param, kind) in params.types.iter().enumerate() {
            match kind {
                ArgType::Normal | ArgType::Optioned => {
                    let next = (0..argc).find(|&index| {
                        last_bound.is_none_or(|last| index > last)
                            && matches!(arg_kind(index), ArgType::Normal | ArgType::Optioned)
                    });
                    if let Some(index) = next {
                        slots[param] = Some(args[index].clone());
                        last_bound = Some(index);
                    }
                }
                ArgType::Splat => {
                    let rest = args.get(param..).unwrap_or_default().to_vec();
                    if let Some(slot) = slots.last_mut() {
                        *slot = Some(Value::array(rest));
                    }
                }
                _ => {}
            }
        }
    } else {
        let mut next = 0;
        for (param, kind) in params.types.iter().enumerate() {
            if *kind == ArgType::Normal {
                if let Some(value) = args.get(next) {
                    slots[param] = Some(value.clone());
                }
                next += 1;
            }
        }
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::SetKind;

    fn method(params: &[(&str, ArgType)]) -> MethodObject {
        let mut set = InstructionSet::new("m", SetKind::Method);
        for (name, kind) in params {
            set.arg_types.push(*name, *kind);
        }
        MethodObject {
            name: "m".to_string(),
            set: Arc::new(set),
            argc: params.len(),
        }
    }

    fn call_site(args: &[(&str, ArgType)]) -> ArgSet {
        let mut set = ArgSet::default();
        for (name, kind) in args {
            set.push(*name, *kind);
        }
        set
    }

    fn ints(slots: &[Option<Value>]) -> Vec<Option<i64>> {
        slots
            .iter()
            .map(|slot| slot.as_ref().and_then(Value::as_int))
            .collect()
    }

    #[test]
    fn keyword_arguments_bind_by_name() {
        let m = method(&[("x", ArgType::Normal), ("y", ArgType::OptionalKeyword)]);
        let site = call_site(&[("", ArgType::Normal), ("y", ArgType::OptionalKeyword)]);
        let slots = bind_arguments(&m, &[Value::Int(1), Value::Int(2)], Some(&site))
            .expect("binding should succeed");
        assert_eq!(ints(&slots), vec![Some(1), Some(2)]);

        let slots = bind_arguments(&m, &[Value::Int(1)], None).expect("defaults apply");
        assert_eq!(ints(&slots), vec![Some(1), None]);
    }

    #[test]
    fn splat_collects_the_rest() {
        let m = method(&[("a", ArgType::Normal), ("rest", ArgType::Splat)]);
        let slots = bind_arguments(&m, &[Value::Int(1), Value::Int(2), Value::Int(3)], None)
            .expect("binding should succeed");
        assert_eq!(slots[0].as_ref().and_then(Value::as_int), Some(1));
        match &slots[1] {
            Some(Value::Array(rest)) => assert_eq!(rest.len(), 2),
            other => panic!("expected splat array, got {other:?}"),
        }
    }

    #[test]
    fn arity_errors_name_the_method() {
        let m = method(&[("a", ArgType::Normal)]);
        let err = bind_arguments(&m, &[], None).expect_err("too few");
        assert_eq!(err, "Expect at least 1 args for method 'm'. got: 0");
        let err = bind_arguments(&m, &[Value::Nil, Value::Nil], None).expect_err("too many");
        assert_eq!(err, "Expect at most 1 args for method 'm'. got: 2");
    }

    #[test]
    fn missing_and_unknown_keywords_are_reported() {
        let m = method(&[("k", ArgType::RequiredKeyword)]);
        let err = bind_arguments(&m, &[], None).expect_err("missing key");
        assert_eq!(err, "Method m requires key argument k");

        let site = call_site(&[("k", ArgType::OptionalKeyword), ("z", ArgType::OptionalKeyword)]);
        let m = method(&[("k", ArgType::RequiredKeyword), ("q", ArgType::OptionalKeyword)]);
        let err = bind_arguments(&m, &[Value::Int(1), Value::Int(2)], Some(&site))
            .expect_err("unknown key");
        assert_eq!(err, "unknown key z for method m");
    }
}
