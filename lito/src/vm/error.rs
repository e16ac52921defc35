use std::sync::Arc;

use parking_lot::Mutex;

use super::class::ClassId;
use super::value::Ivars;

/// Built-in error classes; all inherit from `Error`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Error,
    InternalError,
    IOError,
    ArgumentError,
    NameError,
    TypeError,
    NoMethodError,
    ConstantAlreadyInitialisedError,
    ZeroDivisionError,
    ChannelCloseError,
    NotImplementedError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 11] = [
        ErrorKind::Error,
        ErrorKind::InternalError,
        ErrorKind::IOError,
        ErrorKind::ArgumentError,
        ErrorKind::NameError,
        ErrorKind::TypeError,
        ErrorKind::NoMethodError,
        ErrorKind::ConstantAlreadyInitialisedError,
        ErrorKind::ZeroDivisionError,
        ErrorKind::ChannelCloseError,
        ErrorKind::NotImplementedError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::InternalError => "InternalError",
            ErrorKind::IOError => "IOError",
            ErrorKind::ArgumentError => "ArgumentError",
            ErrorKind::NameError => "NameError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::NoMethodError => "NoMethodError",
            ErrorKind::ConstantAlreadyInitialisedError => "ConstantAlreadyInitialisedError",
            ErrorKind::ZeroDivisionError => "ZeroDivisionError",
            ErrorKind::ChannelCloseError => "ChannelCloseError",
            ErrorKind::NotImplementedError => "NotImplementedError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub const CANT_YIELD_WITHOUT_BLOCK: &str = "Can't yield without a block";
pub const DIVIDED_BY_ZERO: &str = "Divided by 0";
pub const CHANNEL_IS_CLOSED: &str = "The channel is already closed.";

pub fn wrong_number_of_arguments(expected: usize, got: usize) -> String {
    format!("Expect {expected} argument(s). got: {got}")
}

pub fn wrong_number_of_arguments_more(expected: usize, got: usize) -> String {
    format!("Expect {expected} or more argument(s). got: {got}")
}

pub fn wrong_number_of_arguments_less(expected: usize, got: usize) -> String {
    format!("Expect {expected} or less argument(s). got: {got}")
}

pub fn wrong_number_of_arguments_range(min: usize, max: usize, got: usize) -> String {
    format!("Expect {min} to {max} argument(s). got: {got}")
}

pub fn wrong_argument_type(expected: &str, got: &str) -> String {
    format!("Expect argument to be {expected}. got: {got}")
}

pub fn wrong_argument_type_at(position: usize, expected: &str, got: &str) -> String {
    format!("Expect argument #{position} to be {expected}. got: {got}")
}

pub fn index_out_of_range(index: i64) -> String {
    format!("Index value out of range. got: {index}")
}

pub fn negative_value(value: i64) -> String {
    format!("Expect argument to be positive value. got: {value}")
}

pub fn negative_second_value(value: i64) -> String {
    format!("Expect second argument to be positive value. got: {value}")
}

pub fn index_too_small(index: i64, minimum: i64) -> String {
    format!("Index value {index} too small for array. minimum: {minimum}")
}

pub fn cant_load_file(name: &str) -> String {
    format!("Can't load \"{name}\"")
}

pub fn undefined_method(name: &str, receiver: &str) -> String {
    format!("Undefined Method '{name}' for {receiver}")
}

#[derive(Debug, Default)]
struct ErrorState {
    raised: bool,
    ignore: bool,
    traces: Vec<String>,
    stored: bool,
}

/// Instance of `Error` or one of its subclasses.
#[derive(Debug)]
pub struct ErrorObject {
    pub class: ClassId,
    /// Class name at creation, reported by `type`.
    pub kind: String,
    /// Rendered as `Kind: text`.
    pub message: String,
    pub ivars: Ivars,
    state: Mutex<ErrorState>,
}

impl ErrorObject {
    pub fn new(class: ClassId, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class,
            kind: kind.into(),
            message: message.into(),
            ivars: Ivars::default(),
            state: Mutex::new(ErrorState {
                raised: true,
                ..ErrorState::default()
            }),
        }
    }

    pub fn is_raised(&self) -> bool {
        self.state.lock().raised
    }

    pub fn set_raised(&self, raised: bool) {
        self.state.lock().raised = raised;
    }

    pub fn is_ignored(&self) -> bool {
        self.state.lock().ignore
    }

    pub fn set_ignore(&self, ignore: bool) {
        self.state.lock().ignore = ignore;
    }

    pub fn has_stored_traces(&self) -> bool {
        self.state.lock().stored
    }

    pub fn store_traces(&self, traces: Vec<String>) {
        let mut state = self.state.lock();
        state.traces = traces;
        state.stored = true;
    }

    pub fn traces(&self) -> Vec<String> {
        self.state.lock().traces.clone()
    }

    /// Message followed by one `from file:line` per frame.
    pub fn full_message(&self) -> String {
        let traces = self.traces();
        if traces.is_empty() {
            return self.message.clone();
        }
        format!("{}\n{}", self.message, traces.join("\n"))
    }
}

#[derive(Debug)]
pub enum VmError {
    /// A Lito error object unwinding the thread.
    Raised(Arc<ErrorObject>),
    /// `System.exit` was called.
    Exit(i32),
    Internal(String),
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VmError::Raised(err) => f.write_str(&err.message),
            VmError::Exit(code) => write!(f, "exit status {code}"),
            VmError::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for VmError {}

pub type VmResult<T> = Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::class::OBJECT;

    #[test]
    fn errors_start_raised_and_remember_traces() {
        let err = ErrorObject::new(OBJECT, "TypeError", "TypeError: boom");
        assert!(err.is_raised());
        assert!(!err.is_ignored());
        assert!(!err.has_stored_traces());
        err.store_traces(vec!["from a.lito:2".into(), "from a.lito:7".into()]);
        assert_eq!(
            err.full_message(),
            "TypeError: boom\nfrom a.lito:2\nfrom a.lito:7"
        );
    }

    #[test]
    fn message_helpers_match_runtime_wording() {
        assert_eq!(
            wrong_number_of_arguments(1, 2),
            "Expect 1 argument(s). got: 2"
        );
        assert_eq!(
            wrong_argument_type("Integer", "String"),
            "Expect argument to be Integer. got: String"
        );
        assert_eq!(
            undefined_method("foo", "#<Object:instance >"),
            "Undefined Method 'foo' for #<Object:instance >"
        );
    }
}
