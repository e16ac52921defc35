//! Interactive session state shared by the `lito` binary and the tests.

use std::sync::Arc;

use super::diagnostics::render_vm_error;
use super::{CallFrame, RunMode, Vm, VmConfig, VmError};
use crate::compiler::diagnostics::render_parse_error;
use crate::compiler::{Generator, ParserMode, parse_program};

const REPL_FILE: &str = "(repl)";

pub const HELP: &str = "\
.help   show this message
.reset  forget every variable defined so far
.exit   leave the session (also .quit)";

/// Result of feeding one line to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplEvent {
    /// Blank line or a command with nothing to print.
    Nothing,
    /// The buffered input is not a complete program yet.
    Incomplete,
    /// Text for the user: a `#=> value`, an error or command output.
    Output(String),
    Exit(i32),
}

/// Keeps the top-level variables alive across inputs: the generator
/// remembers their slots and each new main frame shares the previous
/// frame's cells.
pub struct ReplSession {
    vm: Arc<Vm>,
    generator: Generator,
    frame: Option<Arc<CallFrame>>,
    buffer: String,
    inspect: bool,
    styled: bool,
}

impl ReplSession {
    pub fn new(config: VmConfig) -> Self {
        Self {
            vm: Vm::new(config.with_mode(RunMode::Repl)),
            generator: Generator::new(true),
            frame: None,
            buffer: String::new(),
            inspect: false,
            styled: false,
        }
    }

    /// Prints each input's disassembly before running it.
    pub fn with_inspect(mut self, inspect: bool) -> Self {
        self.inspect = inspect;
        self
    }

    pub fn with_styled(mut self, styled: bool) -> Self {
        self.styled = styled;
        self
    }

    pub fn vm(&self) -> &Arc<Vm> {
        &self.vm
    }

    pub fn is_continuing(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn prompt(&self) -> &'static str {
        if self.is_continuing() { "... " } else { "lito> " }
    }

    pub fn reset(&mut self) {
        self.generator.reset();
        self.frame = None;
        self.buffer.clear();
    }

    /// Drops a partially typed input, keeping the variables.
    pub fn discard_input(&mut self) {
        self.buffer.clear();
    }

    pub fn feed(&mut self, line: &str) -> ReplEvent {
        if !self.is_continuing() {
            match line.trim() {
                "" => return ReplEvent::Nothing,
                ".help" => return ReplEvent::Output(HELP.to_string()),
                ".reset" => {
                    self.reset();
                    return ReplEvent::Nothing;
                }
                ".exit" | ".quit" => return ReplEvent::Exit(0),
                _ => {}
            }
        } else {
            self.buffer.push('\n');
        }
        self.buffer.push_str(line);

        let program = match parse_program(&self.buffer, ParserMode::Repl) {
            Ok(program) => program,
            Err(err) if err.is_incomplete() => return ReplEvent::Incomplete,
            Err(err) => {
                let source = std::mem::take(&mut self.buffer);
                return ReplEvent::Output(render_parse_error(&source, REPL_FILE, &err, self.styled));
            }
        };
        self.buffer.clear();

        let set = match self.generator.generate(&program) {
            Ok(set) => Arc::new(set.with_filename(REPL_FILE)),
            Err(err) => return ReplEvent::Output(format!("bytecode error: {err}")),
        };
        let listing = self.inspect.then(|| set.disassemble());

        let frame = CallFrame::new(set, self.vm.main_object().clone());
        let frame = match &self.frame {
            Some(previous) => frame.sharing_locals(previous),
            None => frame,
        };
        frame.reserve_locals(self.generator.top_level_slots());
        let frame = Arc::new(frame);
        self.frame = Some(frame.clone());

        let mut thread = self.vm.main_thread();
        let result = thread
            .run_frame(frame)
            .and_then(|value| thread.inspect(&value));
        let text = match result {
            Ok(text) => format!("#=> {text}"),
            Err(VmError::Exit(code)) => return ReplEvent::Exit(code),
            Err(err) => {
                tracing::debug!(error = %err, "repl input failed");
                render_vm_error(&err, RunMode::Repl, self.styled)
            }
        };
        match listing {
            Some(listing) => ReplEvent::Output(format!("{listing}{text}")),
            None => ReplEvent::Output(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::OutputSink;

    fn session() -> ReplSession {
        let (sink, _) = OutputSink::capture();
        ReplSession::new(VmConfig::sandbox().with_output(sink))
    }

    #[test]
    fn variables_survive_between_inputs() {
        let mut repl = session();
        assert_eq!(repl.feed("a = 40"), ReplEvent::Output("#=> 40".to_string()));
        assert_eq!(repl.feed("a + 2"), ReplEvent::Output("#=> 42".to_string()));
    }

    #[test]
    fn open_braces_wait_for_more_lines() {
        let mut repl = session();
        assert_eq!(repl.feed("def twice(x) {"), ReplEvent::Incomplete);
        assert_eq!(repl.prompt(), "... ");
        assert_eq!(repl.feed("x * 2"), ReplEvent::Incomplete);
        assert!(matches!(repl.feed("}"), ReplEvent::Output(_)));
        assert_eq!(repl.feed("twice(4)"), ReplEvent::Output("#=> 8".to_string()));
    }

    #[test]
    fn reset_forgets_variables() {
        let mut repl = session();
        repl.feed("a = 1");
        assert_eq!(repl.feed(".reset"), ReplEvent::Nothing);
        let ReplEvent::Output(text) = repl.feed("a") else {
            panic!("expected output");
        };
        assert!(text.starts_with("NoMethodError"), "{text}");
    }

    #[test]
    fn errors_do_not_end_the_session() {
        let mut repl = session();
        let ReplEvent::Output(text) = repl.feed("raise \"boom\"") else {
            panic!("expected output");
        };
        assert_eq!(text, "Error: 'boom'");
        assert_eq!(repl.feed("1 + 1"), ReplEvent::Output("#=> 2".to_string()));
        assert_eq!(repl.feed(".quit"), ReplEvent::Exit(0));
    }
}
