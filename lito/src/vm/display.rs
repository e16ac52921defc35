use std::sync::Arc;

use super::error::VmResult;
use super::method::Callable;
use super::thread::Thread;
use super::value::Value;

pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }
    let text = format!("{value}");
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

/// Double-quoted, with backslashes, quotes and newlines escaped.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

impl Thread {
    /// User-defined zero-argument method on an instance, if any.
    fn user_method(&self, value: &Value, name: &str) -> Option<Arc<super::method::MethodObject>> {
        let Value::Object(instance) = value else {
            return None;
        };
        match self.vm.classes.lookup_method(instance.class, name) {
            Some(Callable::Lito(method)) => Some(method),
            _ => None,
        }
    }

    /// Text used by `print`, interpolation and `string`.
    pub fn to_s(&mut self, value: &Value) -> VmResult<String> {
        Ok(match value {
            Value::Nil => String::new(),
            Value::Str(text) => text.to_string(),
            Value::Object(instance) => {
                if let Some(method) = self.user_method(value, "string") {
                    let result = self.call_lito(value, &method, &[], None, None)?;
                    return self.to_s(&result);
                }
                format!("#<{}:instance >", self.vm.classes.name(instance.class))
            }
            Value::Error(err) => err.message.clone(),
            other => self.inspect(other)?,
        })
    }

    /// Developer-facing rendering used by the REPL, arrays and hashes.
    pub fn inspect(&mut self, value: &Value) -> VmResult<String> {
        Ok(match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Int(number) => number.to_string(),
            Value::Float(number) => format_float(*number),
            Value::Str(text) => quote(text),
            Value::Array(array) => {
                let mut parts = Vec::with_capacity(array.len());
                for element in array.snapshot() {
                    parts.push(self.inspect(&element)?);
                }
                format!("[{}]", parts.join(", "))
            }
            Value::Hash(hash) => {
                let mut parts = Vec::with_capacity(hash.len());
                for (key, element) in hash.snapshot() {
                    parts.push(format!("{key}: {}", self.inspect(&element)?));
                }
                format!("{{ {} }}", parts.join(", "))
            }
            Value::Range(range) => {
                let dots = if range.exclusive { "..." } else { ".." };
                format!("({}{dots}{})", range.start, range.end)
            }
            Value::Block(block) => format!("<Block: {}>", block.set.filename),
            Value::Channel(channel) => format!("<Channel: {:p}>", Arc::as_ptr(channel)),
            Value::WaitGroup(group) => format!("<WaitGroup: {:p}>", Arc::as_ptr(group)),
            Value::Lock(lock) => format!("<Lock: {:p}>", Arc::as_ptr(lock)),
            Value::Regexp(regexp) => regexp.source.clone(),
            Value::Class(id) => self.vm.classes.name(*id),
            Value::Object(instance) => {
                let mut out = format!("#<{}:instance ", self.vm.classes.name(instance.class));
                for (name, ivar) in instance.ivars.snapshot() {
                    out.push_str(&format!("{name}={} ", self.to_s(&ivar)?));
                }
                out.push('>');
                out
            }
            Value::Error(err) => err.message.clone(),
            Value::File(file) => format!("<File: {}>", file.name()),
        })
    }

    pub fn to_json(&mut self, value: &Value) -> VmResult<String> {
        Ok(match value {
            Value::Nil => "null".to_string(),
            Value::Float(number) if !number.is_finite() => "null".to_string(),
            Value::Str(text) => json_string(text),
            Value::Regexp(regexp) => json_string(&regexp.source),
            Value::Array(array) => {
                let mut parts = Vec::with_capacity(array.len());
                for element in array.snapshot() {
                    parts.push(self.to_json(&element)?);
                }
                format!("[{}]", parts.join(", "))
            }
            Value::Hash(hash) => {
                let mut parts = Vec::with_capacity(hash.len());
                for (key, element) in hash.snapshot() {
                    parts.push(format!("{}:{}", json_string(&key), self.to_json(&element)?));
                }
                format!("{{{}}}", parts.join(","))
            }
            Value::Object(_) => {
                if let Some(method) = self.user_method(value, "json") {
                    let result = self.call_lito(value, &method, &[], None, None)?;
                    return self.to_s(&result);
                }
                self.to_s(value)?
            }
            other => self.inspect(other)?,
        })
    }
}

fn json_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_always_show_a_fraction() {
        assert_eq!(format_float(3.0), "3.0");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(f64::INFINITY), "Inf");
        assert_eq!(format_float(f64::NAN), "NaN");
    }

    #[test]
    fn quoting_escapes_specials() {
        assert_eq!(quote("a\"b\\c\nd"), "\"a\\\"b\\\\c\\nd\"");
        assert_eq!(json_string("x\"y"), "\"x\\\"y\"");
    }
}
