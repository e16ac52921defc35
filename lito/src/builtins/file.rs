//! `File`, available on standard machines only.

use std::fs::OpenOptions;
use std::io;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use std::sync::Arc;

use super::{Methods, check_arg_range, check_argc, define, define_meta, int_arg, str_arg};
use crate::vm::error;
use crate::vm::host::{FileObject, open_options};
use crate::vm::{ClassId, ClassTable, ErrorKind, Thread, Value, VmError, VmResult};

const CLASS_METHODS: Methods = &[
    ("basename", basename),
    ("chmod", chmod),
    ("delete", delete),
    ("exist?", exists),
    ("extension", extension),
    ("join", join),
    ("new", new),
    ("open", open),
    ("size", path_size),
    ("split", split),
];

const METHODS: Methods = &[
    ("close", close),
    ("name", name),
    ("read", read),
    ("size", size),
    ("write", write),
];

const DEFAULT_PERMISSIONS: u32 = 0o755;

pub(super) fn install(classes: &ClassTable, class: ClassId) {
    define_meta(classes, class, CLASS_METHODS);
    define(classes, class, METHODS);
}

fn io_error(t: &Thread, err: io::Error) -> VmError {
    t.error(ErrorKind::IOError, err)
}

/// String argument at `index`, reported by its one-based position.
fn path_arg<'a>(t: &Thread, args: &'a [Value], index: usize) -> VmResult<&'a str> {
    match args.get(index) {
        Some(Value::Str(text)) => Ok(text),
        Some(other) => {
            let got = t.vm.class_name_of(other);
            Err(t.error(
                ErrorKind::TypeError,
                error::wrong_argument_type_at(index + 1, "String", &got),
            ))
        }
        None => str_arg(t, args, index),
    }
}

/// Permission bits only; anything else is not a valid file mode.
fn permissions_arg(t: &Thread, args: &[Value], index: usize) -> VmResult<u32> {
    let mode = int_arg(t, args, index)?;
    match u32::try_from(mode) {
        Ok(bits) if bits <= 0o7777 => Ok(bits),
        _ => Err(t.error(
            ErrorKind::ArgumentError,
            format!("Invalid chmod number. got: {mode}"),
        )),
    }
}

fn basename(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let path = path_arg(t, args, 0)?;
    let trimmed = path.trim_end_matches(MAIN_SEPARATOR);
    let base = match Path::new(trimmed).file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None if trimmed.is_empty() && !path.is_empty() => MAIN_SEPARATOR.to_string(),
        None => ".".to_string(),
    };
    Ok(Value::from(base))
}

#[cfg(unix)]
fn set_mode(path: &str, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &str, mode: u32) -> io::Result<()> {
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_readonly(mode & 0o222 == 0);
    std::fs::set_permissions(path, permissions)
}

/// `File.chmod(mode, *paths)`; returns the number of files changed.
fn chmod(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    if args.len() < 2 {
        return Err(t.error(
            ErrorKind::ArgumentError,
            error::wrong_number_of_arguments_more(2, args.len()),
        ));
    }
    let mode = permissions_arg(t, args, 0)?;
    for index in 1..args.len() {
        let path = path_arg(t, args, index)?;
        set_mode(path, mode).map_err(|err| io_error(t, err))?;
    }
    Ok(Value::Int(args.len() as i64 - 1))
}

fn delete(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    for index in 0..args.len() {
        let path = path_arg(t, args, index)?;
        std::fs::remove_file(path).map_err(|err| io_error(t, err))?;
    }
    Ok(Value::Int(args.len() as i64))
}

fn exists(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let path = path_arg(t, args, 0)?;
    Ok(Value::Bool(std::fs::metadata(path).is_ok()))
}

/// Extension including the dot, or an empty string.
fn extension(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let path = path_arg(t, args, 0)?;
    let ext = Path::new(path)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    Ok(Value::from(ext))
}

fn join(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let mut joined = PathBuf::new();
    for index in 0..args.len() {
        let part = path_arg(t, args, index)?;
        if !part.is_empty() {
            joined.push(part.trim_start_matches(MAIN_SEPARATOR));
        }
    }
    let leading = args
        .first()
        .and_then(Value::as_str)
        .is_some_and(|first| first.starts_with(MAIN_SEPARATOR));
    let text = joined.to_string_lossy().to_string();
    Ok(Value::from(if leading {
        format!("{MAIN_SEPARATOR}{text}")
    } else {
        text
    }))
}

fn open_file(t: &Thread, args: &[Value]) -> VmResult<FileObject> {
    check_arg_range(t, args, 1, 3)?;
    let path = path_arg(t, args, 0)?;
    let mode = if args.len() >= 2 {
        path_arg(t, args, 1)?
    } else {
        "r"
    };
    let Some(mut options) = open_options(mode) else {
        return Err(t.error(
            ErrorKind::ArgumentError,
            format!("Unknown file mode: {mode}"),
        ));
    };
    let permissions = if args.len() == 3 {
        permissions_arg(t, args, 2)?
    } else {
        DEFAULT_PERMISSIONS
    };
    apply_permissions(&mut options, permissions);
    let file = FileObject::open(path, &options).map_err(|err| io_error(t, err))?;
    tracing::debug!(path, mode, "file opened");
    Ok(file)
}

#[cfg(unix)]
fn apply_permissions(options: &mut OpenOptions, permissions: u32) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(permissions);
}

#[cfg(not(unix))]
fn apply_permissions(_options: &mut OpenOptions, _permissions: u32) {}

/// `File.new(path, mode = "r", perm = 0755)`.
fn new(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(Value::File(Arc::new(open_file(t, args)?)))
}

/// Like `new`; with a block, yields the file and closes it afterwards.
fn open(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let file = Arc::new(open_file(t, args)?);
    let value = Value::File(file.clone());
    let Some(block) = t.block() else {
        return Ok(value);
    };
    let result = t.yield_block(&block, &[value]);
    file.close();
    result
}

fn path_size(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let path = path_arg(t, args, 0)?;
    let metadata = std::fs::metadata(path).map_err(|err| io_error(t, err))?;
    Ok(Value::Int(metadata.len() as i64))
}

/// `[directory, file]`; the directory keeps its trailing separator.
fn split(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let path = path_arg(t, args, 0)?;
    let (dir, file) = match path.rfind(MAIN_SEPARATOR) {
        Some(at) => path.split_at(at + 1),
        None => ("", path),
    };
    Ok(Value::array(vec![Value::from(dir), Value::from(file)]))
}

fn file(receiver: &Value) -> Option<&Arc<FileObject>> {
    match receiver {
        Value::File(file) => Some(file),
        _ => None,
    }
}

fn close(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    if let Some(file) = file(receiver) {
        file.close();
    }
    Ok(Value::Nil)
}

fn name(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::from(file(receiver).map_or("", |file| file.name())))
}

/// Whole contents, or one line from standard input.
fn read(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let Some(file) = file(receiver) else {
        return Ok(Value::from(""));
    };
    let text = file.read().map_err(|err| io_error(t, err))?;
    Ok(Value::from(text))
}

fn size(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let Some(file) = file(receiver) else {
        return Ok(Value::Int(0));
    };
    let len = file.size().map_err(|err| io_error(t, err))?;
    Ok(Value::Int(len as i64))
}

fn write(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let data = str_arg(t, args, 0)?;
    let Some(file) = file(receiver) else {
        return Ok(Value::Int(0));
    };
    let written = file.write(data).map_err(|err| io_error(t, err))?;
    Ok(Value::Int(written as i64))
}

