use std::sync::Arc;

use super::{Methods, check_argc, define, str_arg, type_error};
use crate::vm::error;
use crate::vm::method::{BuiltinBody, BuiltinMethod};
use crate::vm::value::Instance;
use crate::vm::{CLASS, Callable, ClassId, ClassTable, ErrorKind, MODULE, Thread, Value, VmResult};

/// Shared by every class value.
const CLASS_METHODS: Methods = &[("new", new)];

/// Shared by every class and module value.
const MODULE_METHODS: Methods = &[
    (">", greater),
    (">=", greater_equal),
    ("<", less),
    ("<=", less_equal),
    ("ancestors", ancestors),
    ("constants", constants),
    ("extend", extend),
    ("get", getter),
    ("include", include),
    ("inherits_lookup!", enable_inherits_lookup),
    ("name", name),
    ("property", property),
    ("respond_to?", respond_to),
    ("set", setter),
    ("superclass", superclass),
];

pub(super) fn install(classes: &ClassTable) {
    define(classes, CLASS, CLASS_METHODS);
    define(classes, MODULE, MODULE_METHODS);
}

fn receiver_class(t: &Thread, receiver: &Value, method: &str) -> VmResult<ClassId> {
    match receiver {
        Value::Class(id) => Ok(*id),
        other => {
            let text = t.vm.class_name_of(other);
            Err(t.error(
                ErrorKind::NoMethodError,
                error::undefined_method(method, &text),
            ))
        }
    }
}

fn new(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let class = receiver_class(t, receiver, "new")?;
    Ok(Value::Object(Arc::new(Instance::new(class))))
}

#[derive(Clone, Copy)]
enum Relation {
    Same,
    Ancestor,
    Descendant,
    Unrelated,
}

/// How the receiver relates to the class argument.
fn relation(t: &Thread, receiver: &Value, args: &[Value], method: &str) -> VmResult<Relation> {
    let class = receiver_class(t, receiver, method)?;
    check_argc(t, args, 1)?;
    let Value::Class(other) = &args[0] else {
        return Err(type_error(t, "a module", &args[0]));
    };
    let classes = &t.vm.classes;
    Ok(if class == *other {
        Relation::Same
    } else if classes.already_inherits(*other, class) {
        Relation::Ancestor
    } else if classes.already_inherits(class, *other) {
        Relation::Descendant
    } else {
        Relation::Unrelated
    })
}

fn compare(relation: Relation, same: bool, ancestor: bool) -> Value {
    match relation {
        Relation::Same => Value::Bool(same),
        Relation::Ancestor => Value::Bool(ancestor),
        Relation::Descendant => Value::Bool(!ancestor),
        Relation::Unrelated => Value::Nil,
    }
}

fn greater(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(compare(relation(t, receiver, args, ">")?, false, true))
}

fn greater_equal(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(compare(relation(t, receiver, args, ">=")?, true, true))
}

fn less(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(compare(relation(t, receiver, args, "<")?, false, false))
}

fn less_equal(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(compare(relation(t, receiver, args, "<=")?, true, false))
}

fn ancestors(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let class = receiver_class(t, receiver, "ancestors")?;
    let chain = t.vm.classes.ancestors(class);
    Ok(Value::array(chain.into_iter().map(Value::Class).collect()))
}

fn constants(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let class = receiver_class(t, receiver, "constants")?;
    let names = t.vm.classes.get(class).constant_names();
    Ok(Value::array(names.into_iter().map(Value::from).collect()))
}

fn module_arg(t: &Thread, args: &[Value]) -> VmResult<ClassId> {
    check_argc(t, args, 1)?;
    match &args[0] {
        Value::Class(id) if t.vm.classes.get(*id).is_module => Ok(*id),
        other => Err(type_error(t, "a module", other)),
    }
}

/// Adds the module's methods as class methods.
fn extend(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let class = receiver_class(t, receiver, "extend")?;
    let module = module_arg(t, args)?;
    let classes = &t.vm.classes;
    let Some(meta) = classes.meta_of(class) else {
        return Ok(receiver.clone());
    };
    if !classes.already_inherits(meta, module) {
        classes.splice_module(meta, module);
    }
    Ok(Value::Class(meta))
}

fn include(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let module = module_arg(t, args)?;
    let Value::Class(class) = receiver else {
        return Err(type_error(t, "a class", receiver));
    };
    let classes = &t.vm.classes;
    if !classes.already_inherits(*class, module) {
        classes.splice_module(*class, module);
        tracing::debug!(
            class = %classes.name(*class),
            module = %classes.name(module),
            "module included"
        );
    }
    Ok(receiver.clone())
}

fn enable_inherits_lookup(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let Value::Class(class) = receiver else {
        return Err(type_error(t, "a class", receiver));
    };
    t.vm.classes.update(*class, |links| links.inherits_lookup = true);
    Ok(receiver.clone())
}

fn name(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let class = receiver_class(t, receiver, "name")?;
    Ok(Value::from(t.vm.classes.name(class)))
}

fn respond_to(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let name = str_arg(t, args, 0)?;
    Ok(Value::Bool(t.vm.find_method(receiver, name, false).is_some()))
}

fn superclass(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let class = receiver_class(t, receiver, "superclass")?;
    let parent = t.vm.classes.links(class).pseudo_super;
    Ok(if parent == class {
        Value::Nil
    } else {
        Value::Class(parent)
    })
}

fn accessor(name: &str, body: BuiltinBody) -> Callable {
    Callable::Builtin(Arc::new(BuiltinMethod {
        name: Arc::from(name),
        body,
    }))
}

fn define_accessors(
    t: &Thread,
    receiver: &Value,
    args: &[Value],
    method: &str,
    getter: bool,
    setter: bool,
) -> VmResult<Value> {
    let class = receiver_class(t, receiver, method)?;
    if args.is_empty() {
        return Err(t.error(
            ErrorKind::ArgumentError,
            error::wrong_number_of_arguments_more(1, 0),
        ));
    }
    let record = t.vm.classes.get(class);
    for index in 0..args.len() {
        let attr = str_arg(t, args, index)?;
        let ivar = format!("@{attr}");
        if getter {
            record.define(attr, accessor(attr, BuiltinBody::Getter(ivar.clone())));
        }
        if setter {
            let name = format!("{attr}=");
            record.define(name.clone(), accessor(&name, BuiltinBody::Setter(ivar)));
        }
    }
    Ok(receiver.clone())
}

fn property(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    define_accessors(t, receiver, args, "property", true, true)
}

fn getter(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    define_accessors(t, receiver, args, "get", true, false)
}

fn setter(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    define_accessors(t, receiver, args, "set", false, true)
}
