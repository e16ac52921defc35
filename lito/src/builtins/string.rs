use super::{
    Methods, block_arg, check_arg_range, check_argc, define, define_meta, int_arg, no_new,
    normalize_index, str_arg, type_error,
};
use crate::vm::display::quote;
use crate::vm::error::{self, index_out_of_range};
use crate::vm::value::RangeValue;
use crate::vm::{ClassId, ClassTable, ErrorKind, Thread, Value, VmResult};

const CLASS_METHODS: Methods = &[("fmt", fmt), ("new", no_new)];

const METHODS: Methods = &[
    ("+", concat),
    ("*", repeat),
    (">", greater),
    ("<", less),
    ("=~", match_index),
    ("[]", slice),
    ("[]=", assign_char),
    ("array", chars),
    ("bytes", bytes),
    ("capitalise", capitalise),
    ("chop", chop),
    ("count", length),
    ("delete", delete),
    ("dup", itself),
    ("each", each_char),
    ("each_byte", each_byte),
    ("each_char", each_char),
    ("each_line", each_line),
    ("empty?", is_empty),
    ("ends_with?", ends_with),
    ("float", to_float),
    ("include?", include),
    ("insert", insert),
    ("inspect", inspect),
    ("int", to_int),
    ("json", json),
    ("length", length),
    ("ljust", ljust),
    ("lower", lower),
    ("replace", replace),
    ("replace_once", replace_once),
    ("reverse", reverse),
    ("rjust", rjust),
    ("size", length),
    ("slice", slice),
    ("split", split),
    ("starts_with?", starts_with),
    ("string", itself),
    ("strip", strip),
    ("upper", upper),
];

pub(super) fn install(classes: &ClassTable, class: ClassId) {
    define_meta(classes, class, CLASS_METHODS);
    define(classes, class, METHODS);
}

fn text(receiver: &Value) -> &str {
    receiver.as_str().unwrap_or_default()
}

fn char_count(text: &str) -> usize {
    text.chars().count()
}

/// `String.fmt("%s and %s", a, b)`.
fn fmt(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    if args.is_empty() {
        return Err(t.error(
            ErrorKind::ArgumentError,
            error::wrong_number_of_arguments_more(1, 0),
        ));
    }
    let format = str_arg(t, args, 0)?;
    let pieces: Vec<&str> = format.split("%s").collect();
    let inserts = &args[1..];
    if pieces.len() - 1 != inserts.len() {
        return Err(t.error(
            ErrorKind::ArgumentError,
            format!(
                "Expect {} additional string(s) to insert. got: {}",
                pieces.len() - 1,
                inserts.len()
            ),
        ));
    }
    let mut out = String::from(pieces[0]);
    for (insert, piece) in inserts.iter().zip(&pieces[1..]) {
        out.push_str(&t.to_s(insert)?);
        out.push_str(piece);
    }
    Ok(Value::from(out))
}

fn concat(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let right = str_arg(t, args, 0)?;
    Ok(Value::from(format!("{}{right}", text(receiver))))
}

fn repeat(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let count = int_arg(t, args, 0)?;
    if count < 0 {
        return Err(t.error(ErrorKind::ArgumentError, error::negative_value(count)));
    }
    Ok(Value::from(text(receiver).repeat(count as usize)))
}

fn greater(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    Ok(Value::Bool(text(receiver) > str_arg(t, args, 0)?))
}

fn less(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    Ok(Value::Bool(text(receiver) < str_arg(t, args, 0)?))
}

/// Character offset of the first match, or nil.
fn match_index(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let haystack = text(receiver);
    let found = match &args[0] {
        Value::Regexp(regexp) => regexp.regex.find(haystack).map(|found| found.start()),
        Value::Str(needle) => haystack.find(&**needle),
        other => return Err(type_error(t, "Regexp", other)),
    };
    Ok(found.map_or(Value::Nil, |byte| {
        Value::Int(char_count(&haystack[..byte]) as i64)
    }))
}

/// Start offset adjusted for negatives; `extra` is added before bounds checks.
fn string_index(len: usize, index: i64, extra: i64) -> Option<usize> {
    let len = len as i64;
    let mut index = index;
    if index < 0 {
        index += len;
        if index + extra < 0 {
            return None;
        }
    }
    if index + extra > len {
        return None;
    }
    Some((index + extra) as usize)
}

pub(super) fn slice_chars(chars: &[char], range: &RangeValue) -> Option<String> {
    let extra = if range.exclusive { 0 } else { 1 };
    let start = string_index(chars.len(), range.start, 0)?;
    let end = string_index(chars.len(), range.end, extra)?;
    (start <= end).then(|| chars[start..end].iter().collect())
}

fn slice(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let chars: Vec<char> = text(receiver).chars().collect();
    Ok(match &args[0] {
        Value::Range(range) => slice_chars(&chars, range).map_or(Value::Nil, Value::from),
        Value::Int(index) => normalize_index(*index, chars.len())
            .map_or(Value::Nil, |index| Value::from(chars[index].to_string())),
        other => return Err(type_error(t, "Range or Integer", other)),
    })
}

/// Replaces the character at an index; the index one past the end appends.
fn assign_char(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 2)?;
    let index = int_arg(t, args, 0)?;
    let replacement = str_arg(t, args, 1)?;
    let chars: Vec<char> = text(receiver).chars().collect();
    let len = chars.len() as i64;
    let position = if index < 0 { index + len } else { index };
    if index > len || position < 0 {
        return Err(t.error(ErrorKind::ArgumentError, index_out_of_range(index)));
    }
    let position = position as usize;
    let mut out: String = chars[..position.min(chars.len())].iter().collect();
    out.push_str(replacement);
    if position < chars.len() {
        out.extend(&chars[position + 1..]);
    }
    Ok(Value::from(out))
}

fn chars(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::array(
        text(receiver)
            .chars()
            .map(|ch| Value::from(ch.to_string()))
            .collect(),
    ))
}

fn bytes(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::array(
        text(receiver)
            .bytes()
            .map(|byte| Value::Int(i64::from(byte)))
            .collect(),
    ))
}

fn capitalise(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let mut chars = text(receiver).chars();
    let out = match chars.next() {
        Some(first) => {
            let rest = chars.as_str().to_lowercase();
            first.to_uppercase().chain(rest.chars()).collect()
        }
        None => String::new(),
    };
    Ok(Value::from(out))
}

fn chop(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let mut out = text(receiver).to_string();
    out.pop();
    Ok(Value::from(out))
}

fn length(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::Int(char_count(text(receiver)) as i64))
}

fn delete(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let target = str_arg(t, args, 0)?;
    Ok(Value::from(text(receiver).replace(target, "")))
}

fn itself(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(receiver.clone())
}

/// Yields each item unless the block has no body; stops on `break`.
fn yield_each(
    t: &mut Thread,
    receiver: &Value,
    args: &[Value],
    items: impl Iterator<Item = Value>,
) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let block = block_arg(t)?;
    if block.set.is_empty() {
        return Ok(receiver.clone());
    }
    for item in items {
        t.yield_block(&block, &[item])?;
        if block.is_removed() {
            break;
        }
    }
    Ok(receiver.clone())
}

fn each_char(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let items = text(receiver)
        .chars()
        .map(|ch| Value::from(ch.to_string()))
        .collect::<Vec<_>>();
    yield_each(t, receiver, args, items.into_iter())
}

fn each_byte(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let items = text(receiver)
        .bytes()
        .map(|byte| Value::Int(i64::from(byte)))
        .collect::<Vec<_>>();
    yield_each(t, receiver, args, items.into_iter())
}

fn each_line(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let items = text(receiver)
        .split('\n')
        .map(Value::from)
        .collect::<Vec<_>>();
    yield_each(t, receiver, args, items.into_iter())
}

fn is_empty(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::Bool(text(receiver).is_empty()))
}

fn ends_with(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    Ok(Value::Bool(text(receiver).ends_with(str_arg(t, args, 0)?)))
}

fn starts_with(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    Ok(Value::Bool(text(receiver).starts_with(str_arg(t, args, 0)?)))
}

fn include(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    Ok(Value::Bool(text(receiver).contains(str_arg(t, args, 0)?)))
}

fn to_float(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let source = text(receiver).trim_start();
    source.parse::<f64>().map(Value::Float).map_err(|_| {
        t.error(
            ErrorKind::ArgumentError,
            format!("Invalid numeric string. got: {source}"),
        )
    })
}

/// Parses a whole integer, else the leading digits, else 0.
fn to_int(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let source = text(receiver);
    if let Ok(number) = source.parse::<i64>() {
        return Ok(Value::Int(number));
    }
    let digits: String = source
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    Ok(Value::Int(digits.parse().unwrap_or_default()))
}

fn insert(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 2)?;
    let index = int_arg(t, args, 0)?;
    let addition = str_arg(t, args, 1)?;
    let chars: Vec<char> = text(receiver).chars().collect();
    let len = chars.len() as i64;
    // -(len + 1) prepends; other negatives insert before that character
    let position = match index {
        index if index == -(len + 1) => 0,
        index if index < 0 => index + len,
        index => index,
    };
    if position < 0 || position > len {
        return Err(t.error(ErrorKind::ArgumentError, index_out_of_range(index)));
    }
    let position = position as usize;
    let mut out: String = chars[..position].iter().collect();
    out.push_str(addition);
    out.extend(&chars[position..]);
    Ok(Value::from(out))
}

fn inspect(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::from(quote(text(receiver))))
}

fn json(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::from(t.to_json(receiver)?))
}

fn padding<'a>(t: &Thread, args: &'a [Value]) -> VmResult<(usize, &'a str)> {
    check_arg_range(t, args, 1, 2)?;
    let width = int_arg(t, args, 0)?.max(0) as usize;
    let pad = if args.len() == 2 {
        str_arg(t, args, 1)?
    } else {
        " "
    };
    Ok((width, pad))
}

fn fill(pad: &str, count: usize) -> String {
    pad.chars().cycle().take(count).collect()
}

fn ljust(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let (width, pad) = padding(t, args)?;
    let source = text(receiver);
    let len = char_count(source);
    if width <= len || pad.is_empty() {
        return Ok(receiver.clone());
    }
    Ok(Value::from(format!("{source}{}", fill(pad, width - len))))
}

fn rjust(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let (width, pad) = padding(t, args)?;
    let source = text(receiver);
    let len = char_count(source);
    if width <= len || pad.is_empty() {
        return Ok(receiver.clone());
    }
    Ok(Value::from(format!("{}{source}", fill(pad, width - len))))
}

fn lower(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::from(text(receiver).to_lowercase()))
}

fn upper(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::from(text(receiver).to_uppercase()))
}

fn replace_with(t: &Thread, receiver: &Value, args: &[Value], limit: usize) -> VmResult<Value> {
    check_argc(t, args, 2)?;
    let replacement = str_arg(t, args, 1)?;
    let source = text(receiver);
    Ok(Value::from(match &args[0] {
        Value::Str(pattern) if limit == 0 => source.replace(&**pattern, replacement),
        Value::Str(pattern) => source.replacen(&**pattern, replacement, limit),
        Value::Regexp(regexp) => regexp
            .regex
            .replacen(source, limit, replacement)
            .into_owned(),
        other => return Err(type_error(t, "String or Regexp", other)),
    }))
}

fn replace(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    replace_with(t, receiver, args, 0)
}

fn replace_once(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    replace_with(t, receiver, args, 1)
}

fn reverse(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::from(text(receiver).chars().rev().collect::<String>()))
}

fn split(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let separator = str_arg(t, args, 0)?;
    let source = text(receiver);
    let parts: Vec<Value> = if separator.is_empty() {
        source.chars().map(|ch| Value::from(ch.to_string())).collect()
    } else {
        source.split(separator).map(Value::from).collect()
    };
    Ok(Value::array(parts))
}

fn strip(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let trimmed = text(receiver).trim_matches([' ', '\n', '\t', '\r', '\u{b}']);
    Ok(Value::from(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_slices_follow_inclusive_and_exclusive_ends() {
        let chars: Vec<char> = "hello".chars().collect();
        let inclusive = RangeValue {
            start: 1,
            end: 3,
            exclusive: false,
        };
        assert_eq!(slice_chars(&chars, &inclusive).as_deref(), Some("ell"));
        let tail = RangeValue {
            start: -3,
            end: -1,
            exclusive: true,
        };
        assert_eq!(slice_chars(&chars, &tail).as_deref(), Some("ll"));
        let beyond = RangeValue {
            start: 2,
            end: 10,
            exclusive: false,
        };
        assert_eq!(slice_chars(&chars, &beyond), None);
    }

    #[test]
    fn padding_cycles_the_pad_string() {
        assert_eq!(fill("ab", 5), "ababa");
        assert_eq!(fill(" ", 2), "  ");
    }
}
