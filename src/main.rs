use clap::Parser;
use qscript::compiler;
use qscript::runtime::{Engine, Host};
use serde_json::to_writer_pretty;
use std::fs::{self, File};
use std::io;
use std::time::Duration;


const QSCRIPT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "qscript", version = QSCRIPT_VERSION,
    about = "QScript - a small imperative quantum scripting language \
             and state-vector simulator.",
    long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Compiles and runs a QScript source file.
    Run {
        /// Source script path
        script: String,
        /// Seed for the simulator RNG (reproducible measurements)
        #[arg(long)]
        seed: Option<u64>,
        /// Maximum number of opcodes to execute
        #[arg(long, default_value_t = 1_000_000)]
        max_steps: usize,
        /// Pause when execution reaches one of these source lines
        #[arg(long = "break", value_name = "LINE")]
        breakpoints: Vec<usize>,
        /// How many of the largest final amplitudes to print
        #[arg(long, default_value_t = 16)]
        dump: usize,
        /// Write the final quantum state as JSON
        #[arg(long)]
        save_state: Option<String>,
        /// Honor Delay between step batches in real time
        #[arg(long)]
        realtime: bool,
    },
    /// Compiles a script and reports errors without running it.
    Check {
        /// Source script path
        script: String,
    },
}

/// host wired to the terminal: Print and Display go to stdout, the view
/// callbacks are reported as one-liners.
struct ConsoleHost;

impl Host for ConsoleHost {
    fn print(&mut self, text: &str) {
        println!("{}", text);
    }

    fn breakpoint(&mut self) {
        eprintln!("[breakpoint]");
    }

    fn display(&mut self, html: &str) {
        println!("[display] {}", html);
    }

    fn set_view_angle(&mut self, radians: f64) {
        println!("[view] angle set to {:.4} rad", radians);
    }

    fn set_view_mode(&mut self, mode: i64) {
        println!("[view] mode set to {}", mode);
    }
}

fn run_script(
    path: &str,
    seed: Option<u64>,
    max_steps: usize,
    breakpoints: &[usize],
    dump: usize,
    save_state: Option<&str>,
    realtime: bool,
) -> io::Result<()> {
    let source = fs::read_to_string(path)?;
    let program = compiler::compile(&source);
    if !program.errors.is_empty() {
        for e in &program.errors {
            eprintln!("error: {}", e);
        }
        eprintln!("{} error(s); not running.", program.errors.len());
        std::process::exit(1);
    }

    let mut engine = Engine::new(program, Box::new(ConsoleHost));
    if let Some(seed) = seed {
        engine.seed(seed);
    }
    for &line in breakpoints {
        engine.add_breakpoint(line);
    }

    let mut steps = 0usize;
    while steps < max_steps && !engine.is_done() {
        let taken = engine.run(max_steps - steps);
        steps += taken;
        if engine.is_done() || taken == 0 {
            break;
        }
        // paused on a breakpoint line or a Breakpoint builtin
        eprintln!(
            "paused at line {} after {} steps (call stack: {})",
            engine.get_current_line(),
            steps,
            engine.get_current_call_stack().join(" > ")
        );
        if realtime {
            std::thread::sleep(Duration::from_millis(engine.delay_ms() as u64));
        }
    }

    if steps >= max_steps && !engine.is_done() {
        eprintln!("stopped after {} steps (limit reached)", steps);
    }

    for e in engine.error_log() {
        eprintln!("runtime error: {}", e);
    }

    println!(
        "done: {} steps, {} qubits, measured_value = {}",
        steps,
        engine.state().n,
        engine.measured_value()
    );
    print_amplitudes(engine.state(), dump);

    if let Some(out_path) = save_state {
        let file = File::create(out_path)?;
        to_writer_pretty(file, engine.state())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        println!("state written to {}", out_path);
    }
    Ok(())
}

fn print_amplitudes(state: &qscript::runtime::quantum_state::QuantumState, dump: usize) {
    if dump == 0 {
        return;
    }
    let mut indexed: Vec<(usize, f64)> = state
        .amps
        .iter()
        .enumerate()
        .map(|(i, a)| (i, a.norm_sqr() as f64))
        .filter(|(_, p)| *p > 1e-9)
        .collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (i, p) in indexed.iter().take(dump) {
        let amp = state.amps[*i];
        println!(
            "|{:0width$b}> ({:>7}) : {:+.5} {:+.5}i  p = {:.5}",
            i,
            i,
            amp.re,
            amp.im,
            p,
            width = state.n
        );
    }
    if indexed.len() > dump {
        println!("... {} more non-zero amplitudes", indexed.len() - dump);
    }
}

fn check_script(path: &str) -> io::Result<()> {
    let source = fs::read_to_string(path)?;
    let program = compiler::compile(&source);
    if program.errors.is_empty() {
        println!("ok: {} function(s) compiled", program.funcs.len());
        Ok(())
    } else {
        for e in &program.errors {
            eprintln!("error: {}", e);
        }
        std::process::exit(1);
    }
}

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            script,
            seed,
            max_steps,
            breakpoints,
            dump,
            save_state,
            realtime,
        } => run_script(
            &script,
            seed,
            max_steps,
            &breakpoints,
            dump,
            save_state.as_deref(),
            realtime,
        ),
        Commands::Check { script } => check_script(&script),
    }
}
