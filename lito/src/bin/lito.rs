use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use lito::compiler::diagnostics::render_parse_error;
use lito::vm::diagnostics::render_vm_error;
use lito::vm::repl::{ReplEvent, ReplSession};
use lito::vm::TraceSink;
use lito::{
    CompileError, FILE_EXT, MachineKind, ParserMode, RunMode, VERSION, Vm, VmConfig, VmError,
    compile_source, logging,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// Scripts recurse on the native stack; give the interpreter thread room.
const INTERPRETER_STACK: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CliConfig {
    version: bool,
    cpu_profile: Option<String>,
    mem_profile: Option<String>,
    trace: Option<String>,
    inspect: bool,
    machine: MachineKind,
    help: bool,
    script: Option<String>,
    script_args: Vec<String>,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_cli_args(&args) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            return ExitCode::from(2);
        }
    };
    if let Err(err) = logging::init() {
        eprintln!("logging disabled: {err}");
    }

    let worker = std::thread::Builder::new()
        .name("lito-main".to_string())
        .stack_size(INTERPRETER_STACK)
        .spawn(move || run(cli));
    match worker.map(|handle| handle.join()) {
        Ok(Ok(code)) => ExitCode::from(code),
        Ok(Err(_)) => {
            eprintln!("interpreter thread panicked");
            ExitCode::from(101)
        }
        Err(err) => {
            eprintln!("could not start interpreter: {err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_cli_args(args: &[String]) -> Result<CliConfig, String> {
    let mut cfg = CliConfig::default();
    let mut index = 0usize;

    let value_of = |index: usize, flag: &str| {
        args.get(index + 1)
            .cloned()
            .ok_or_else(|| format!("missing value for {flag}"))
    };

    while index < args.len() {
        let flag = args[index].as_str();
        match flag.trim_start_matches('-') {
            _ if !flag.starts_with('-') => break,
            "h" | "help" => {
                cfg.help = true;
                index += 1;
            }
            "v" | "version" => {
                cfg.version = true;
                index += 1;
            }
            "inspect" => {
                cfg.inspect = true;
                index += 1;
            }
            "cpuprofile" => {
                cfg.cpu_profile = Some(value_of(index, flag)?);
                index += 2;
            }
            "memprofile" => {
                cfg.mem_profile = Some(value_of(index, flag)?);
                index += 2;
            }
            "trace" => {
                cfg.trace = Some(value_of(index, flag)?);
                index += 2;
            }
            "mtype" => {
                let name = value_of(index, flag)?;
                cfg.machine = MachineKind::parse(&name).unwrap_or_default();
                index += 2;
            }
            "" => {
                index += 1;
                break;
            }
            _ => return Err(format!("unknown flag '{flag}'")),
        }
    }

    if let Some((script, rest)) = args.get(index..).and_then(<[String]>::split_first) {
        cfg.script = Some(script.clone());
        cfg.script_args = rest.to_vec();
    }
    Ok(cfg)
}

fn print_usage() {
    println!("Usage:");
    println!("  lito                          (starts the REPL)");
    println!("  lito [flags] script.{FILE_EXT} [args...]");
    println!();
    println!("Flags:");
    println!("  -v                 show the current version");
    println!("  -inspect           show the generated instructions");
    println!("  -mtype <type>      machine type: standard or sandbox");
    println!("  -trace <file>      write an instruction trace to file");
    println!("  -cpuprofile <file> write cpu usage to file");
    println!("  -memprofile <file> write memory usage to file");
}

fn run(cli: CliConfig) -> u8 {
    if cli.help {
        print_usage();
        return 0;
    }
    if cli.version {
        println!("{VERSION}");
        return 0;
    }

    let mut config = VmConfig {
        machine: cli.machine,
        ..VmConfig::default()
    };
    if let Some(path) = &cli.trace {
        match TraceSink::create(Path::new(path)) {
            Ok(sink) => config.trace = Some(sink),
            Err(err) => {
                println!("could not create trace file: {err}");
                return 1;
            }
        }
    }

    let code = match &cli.script {
        None => match run_repl(config, cli.inspect) {
            Ok(code) => code,
            Err(err) => {
                println!("REPL init error: {err}");
                1
            }
        },
        Some(script) => run_script(config, &cli, script),
    };

    if let Some(path) = &cli.cpu_profile {
        write_report(path, &profile::cpu_report());
    }
    if let Some(path) = &cli.mem_profile {
        write_report(path, &profile::memory_report());
    }
    code
}

fn run_script(mut config: VmConfig, cli: &CliConfig, script: &str) -> u8 {
    let path = Path::new(script);
    let Some(extension) = path.extension().map(|ext| ext.to_string_lossy().to_string()) else {
        print_usage();
        return 0;
    };
    if extension != FILE_EXT {
        println!("Unknown file extension: {extension}");
        return 0;
    }

    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            println!("{err}");
            return 1;
        }
    };
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let filename = absolute.to_string_lossy().to_string();
    let styled = logging::ansi_enabled();

    let set = match compile_source(&source, &filename, ParserMode::Normal) {
        Ok(set) => set,
        Err(CompileError::Parse(err)) => {
            println!("{}", render_parse_error(&source, &filename, &err, styled));
            return 1;
        }
        Err(err) => {
            println!("{err}");
            return 1;
        }
    };
    if cli.inspect {
        print!("{}", set.disassemble());
    }

    config.mode = RunMode::CommandLine;
    config.args = cli.script_args.clone();
    if let Some(dir) = absolute.parent() {
        config.lib_paths.push(dir.to_path_buf());
    }
    let vm = Vm::new(config);
    vm.mark_loaded(&absolute.canonicalize().unwrap_or_else(|_| absolute.clone()));
    match vm.run(set) {
        Ok(_) => 0,
        Err(VmError::Exit(code)) => u8::try_from(code.clamp(0, 255)).unwrap_or(1),
        Err(err) => {
            println!("{}", render_vm_error(&err, RunMode::CommandLine, styled));
            1
        }
    }
}

fn run_repl(config: VmConfig, inspect: bool) -> Result<u8, Box<dyn std::error::Error>> {
    println!("{}", logging::banner(&format!("Lito {VERSION}")));
    println!("commands: .help, .reset, .exit");
    let mut editor = DefaultEditor::new()?;
    let mut session = ReplSession::new(config)
        .with_inspect(inspect)
        .with_styled(logging::ansi_enabled());
    loop {
        match editor.readline(session.prompt()) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                match session.feed(&line) {
                    ReplEvent::Nothing | ReplEvent::Incomplete => {}
                    ReplEvent::Output(text) => print_repl_output(&text),
                    ReplEvent::Exit(code) => {
                        println!("Bye!");
                        return Ok(u8::try_from(code.clamp(0, 255)).unwrap_or(1));
                    }
                }
            }
            Err(ReadlineError::Interrupted) if session.is_continuing() => {
                session.discard_input();
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Bye!");
                return Ok(0);
            }
            Err(err) => return Err(Box::new(io::Error::other(err.to_string()))),
        }
    }
}

fn print_repl_output(text: &str) {
    match text.strip_prefix("#=> ") {
        Some(value) => println!("{} {value}", logging::result_label("#=>")),
        None => println!("{text}"),
    }
}

fn write_report(path: &str, report: &str) {
    let target = PathBuf::from(path);
    if let Err(err) = std::fs::write(&target, report) {
        eprintln!("could not write {}: {err}", target.display());
    }
}

#[cfg(unix)]
mod profile {
    fn usage() -> Option<libc::rusage> {
        let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
        // SAFETY: getrusage only writes into the provided struct.
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
        // SAFETY: a zero return code means the struct was filled in.
        (rc == 0).then(|| unsafe { usage.assume_init() })
    }

    fn seconds(time: libc::timeval) -> f64 {
        time.tv_sec as f64 + time.tv_usec as f64 / 1_000_000.0
    }

    pub fn cpu_report() -> String {
        match usage() {
            Some(usage) => format!(
                "user_seconds {:.6}\nsystem_seconds {:.6}\n",
                seconds(usage.ru_utime),
                seconds(usage.ru_stime)
            ),
            None => "cpu usage unavailable\n".to_string(),
        }
    }

    pub fn memory_report() -> String {
        match usage() {
            Some(usage) => format!(
                "max_resident_kb {}\nminor_faults {}\nmajor_faults {}\n",
                usage.ru_maxrss, usage.ru_minflt, usage.ru_majflt
            ),
            None => "memory usage unavailable\n".to_string(),
        }
    }
}

#[cfg(not(unix))]
mod profile {
    pub fn cpu_report() -> String {
        "cpu usage unavailable\n".to_string()
    }

    pub fn memory_report() -> String {
        "memory usage unavailable\n".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn no_arguments_start_the_repl() {
        let cfg = parse_cli_args(&[]).expect("parse should succeed");
        assert_eq!(cfg.script, None);
        assert_eq!(cfg.machine, MachineKind::Standard);
    }

    #[test]
    fn flags_stop_at_the_script() {
        let cfg = parse_cli_args(&args(&["-mtype", "sandbox", "-inspect", "main.lito", "-v", "x"]))
            .expect("parse should succeed");
        assert_eq!(cfg.machine, MachineKind::Sandbox);
        assert!(cfg.inspect);
        assert!(!cfg.version);
        assert_eq!(cfg.script.as_deref(), Some("main.lito"));
        assert_eq!(cfg.script_args, args(&["-v", "x"]));
    }

    #[test]
    fn value_flags_need_a_value() {
        let err = parse_cli_args(&args(&["-trace"])).expect_err("parse should fail");
        assert_eq!(err, "missing value for -trace");
    }

    #[test]
    fn unknown_flags_are_rejected() {
        let err = parse_cli_args(&args(&["-bogus"])).expect_err("parse should fail");
        assert_eq!(err, "unknown flag '-bogus'");
    }
}
