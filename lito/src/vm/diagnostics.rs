use owo_colors::OwoColorize;

use super::{RunMode, VmError};

/// Text printed for an error that unwound the main thread.
///
/// Outside the REPL a raised error carries its `from file:line` trace; the
/// REPL shows the message only.
pub fn render_vm_error(err: &VmError, mode: RunMode, styled: bool) -> String {
    match err {
        VmError::Raised(error) => {
            let head = if styled {
                format!("{}", error.message.red().bold())
            } else {
                error.message.clone()
            };
            let traces = error.traces();
            if mode == RunMode::Repl || traces.is_empty() {
                return head;
            }
            let body = traces.join("\n");
            if styled {
                format!("{head}\n{}", body.dimmed())
            } else {
                format!("{head}\n{body}")
            }
        }
        VmError::Exit(code) => format!("exit status {code}"),
        VmError::Internal(message) if styled => {
            format!("{}: {message}", "internal error".red().bold())
        }
        VmError::Internal(message) => format!("internal error: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::vm::ErrorObject;
    use crate::vm::class::OBJECT;

    fn raised() -> VmError {
        let err = ErrorObject::new(OBJECT, "ArgumentError", "ArgumentError: 'x'");
        err.store_traces(vec!["from main.lito:3".to_string(), "from main.lito:1".to_string()]);
        VmError::Raised(Arc::new(err))
    }

    #[test]
    fn scripts_print_the_trace_under_the_message() {
        let rendered = render_vm_error(&raised(), RunMode::Normal, false);
        assert_eq!(rendered, "ArgumentError: 'x'\nfrom main.lito:3\nfrom main.lito:1");
    }

    #[test]
    fn repl_prints_the_message_only() {
        let rendered = render_vm_error(&raised(), RunMode::Repl, false);
        assert_eq!(rendered, "ArgumentError: 'x'");
    }
}
