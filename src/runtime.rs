// the execution engine: an opcode interpreter with a call stack, a
// reversible step history and scope translation from source identifiers
// to the flat runtime environment. quantum side effects go through the
// simulator in `quantum_state`; host-facing builtins go through the
// `Host` callback trait.

pub mod quantum_state;

use crate::builtins::Builtin;
use crate::compiler::{Cmd, FuncId, Program, MAIN};
use crate::expr::{self, Env, Value};
use crate::lexer::{Token, TokenKind};
use log::{debug, warn};
use num_complex::Complex32;
use quantum_state::{check_register_size, QuantumState};
use std::collections::{HashSet, VecDeque};

/// callbacks a builtin may raise toward the embedding host. every method
/// defaults to a no-op so hosts implement only what they surface.
pub trait Host {
    fn print(&mut self, _text: &str) {}
    fn breakpoint(&mut self) {}
    fn delay(&mut self, _ms: f64) {}
    fn display(&mut self, _html: &str) {}
    fn set_view_angle(&mut self, _radians: f64) {}
    fn set_view_mode(&mut self, _mode: i64) {}
}

/// host that ignores every callback.
pub struct NullHost;

impl Host for NullHost {}

/// one pushed call: the function to return to, the opcode index to resume
/// at, and a display string describing the call that was made.
#[derive(Debug, Clone)]
pub struct Frame {
    pub func: FuncId,
    pub return_step: usize,
    pub desc: String,
}

/// undo record for a single executed opcode.
#[derive(Debug)]
struct StepData {
    func: FuncId,
    step: usize,
    /// scoped cells written this step and their pre-step values
    saved: Vec<(String, Value)>,
    saved_measured: Option<u64>,
    /// quantum builtin applied this step, with its evaluated arguments
    gate: Option<(Builtin, Vec<f64>)>,
    pushed_frame: bool,
    popped_frames: Vec<Frame>,
    /// VectorSize defines a fresh register and leaves no undo record
    skip: bool,
}

impl StepData {
    fn new(func: FuncId, step: usize) -> Self {
        StepData {
            func,
            step,
            saved: Vec::new(),
            saved_measured: None,
            gate: None,
            pushed_frame: false,
            popped_frames: Vec::new(),
            skip: false,
        }
    }
}

pub const DEFAULT_HISTORY_LIMIT: usize = 100_000;
pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_DELAY_MS: f64 = 1.0;

// atom words pass through scope rewriting untouched
const ATOMS: [&str; 5] = ["true", "false", "this", "null", "undefined"];

pub struct Engine {
    program: Program,
    host: Box<dyn Host>,

    current_func: FuncId,
    current_step: usize,
    call_stack: Vec<Frame>,

    history: VecDeque<StepData>,
    history_limit: usize,

    env: Env,
    /// locals declared at run time, per function (params live in the Func)
    func_locals: Vec<Vec<String>>,
    measured_value: u64,

    sim: QuantumState,
    seed: Option<u64>,

    /// errors raised by the current step; cleared when the next one starts
    errors: Vec<String>,
    /// every error raised since the last reset, for the host's summary
    error_log: Vec<String>,

    breakpoints: HashSet<usize>,
    stop_requested: bool,
    batch_size: usize,
    delay_ms: f64,
}

impl Engine {
    pub fn new(program: Program, host: Box<dyn Host>) -> Self {
        let func_locals = vec![Vec::new(); program.funcs.len()];
        Engine {
            program,
            host,
            current_func: MAIN,
            current_step: 0,
            call_stack: Vec::new(),
            history: VecDeque::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            env: Env::new(),
            func_locals,
            measured_value: 0,
            sim: QuantumState::new(quantum_state::MIN_QUBITS),
            seed: None,
            errors: Vec::new(),
            error_log: Vec::new(),
            breakpoints: HashSet::new(),
            stop_requested: false,
            batch_size: DEFAULT_BATCH_SIZE,
            delay_ms: DEFAULT_DELAY_MS,
        }
    }

    /// seeds the simulator rng; the seed is reapplied whenever VectorSize
    /// replaces the register, keeping runs reproducible.
    pub fn seed(&mut self, seed: u64) {
        self.seed = Some(seed);
        self.sim.seed_rng(seed);
    }

    pub fn set_history_limit(&mut self, limit: usize) {
        self.history_limit = limit.max(1);
    }

    /// rewinds everything: position, variables, history, errors, and the
    /// register (back to the minimum size in |0...0>).
    pub fn reset(&mut self) {
        self.current_func = MAIN;
        self.current_step = 0;
        self.call_stack.clear();
        self.history.clear();
        self.env.clear();
        for locals in &mut self.func_locals {
            locals.clear();
        }
        self.measured_value = 0;
        self.sim = QuantumState::new(quantum_state::MIN_QUBITS);
        if let Some(seed) = self.seed {
            self.sim.seed_rng(seed);
        }
        self.errors.clear();
        self.error_log.clear();
        self.stop_requested = false;
    }

    // --- inspection ---

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn compile_errors(&self) -> &[String] {
        &self.program.errors
    }

    pub fn state(&self) -> &QuantumState {
        &self.sim
    }

    pub fn measured_value(&self) -> u64 {
        self.measured_value
    }

    /// reads a runtime cell by its scoped name (debug surface).
    pub fn get_cell(&self, name: &str) -> Value {
        self.env.get(name)
    }

    pub fn has_cell(&self, name: &str) -> bool {
        self.env.contains(name)
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn error_log(&self) -> &[String] {
        &self.error_log
    }

    pub fn delay_ms(&self) -> f64 {
        self.delay_ms
    }

    pub fn is_done(&self) -> bool {
        self.call_stack.is_empty()
            && self.current_func == MAIN
            && self.current_step >= self.program.funcs[MAIN].code.len()
    }

    pub fn is_start(&self) -> bool {
        self.history.is_empty()
    }

    pub fn is_running(&self) -> bool {
        !self.is_done() && !self.stop_requested
    }

    /// source line of the current opcode, or the last line when past end.
    pub fn get_current_line(&self) -> usize {
        let code = &self.program.funcs[self.current_func].code;
        match code.get(self.current_step) {
            Some(op) => op.line,
            None => code.last().map(|op| op.line).unwrap_or(0),
        }
    }

    /// active calls as display strings, outermost first.
    pub fn get_current_call_stack(&self) -> Vec<String> {
        let mut out = vec!["__main__".to_string()];
        out.extend(self.call_stack.iter().map(|f| f.desc.clone()));
        out
    }

    /// (name, value) pairs for the current function's parameters and
    /// locals, in declaration order.
    pub fn get_current_locals(&self) -> Vec<(String, Value)> {
        let func = &self.program.funcs[self.current_func];
        let mut out = Vec::new();
        for name in func.params.iter().chain(self.func_locals[self.current_func].iter()) {
            let cell = self.scoped_name(self.current_func, name);
            out.push((name.clone(), self.env.get(&cell)));
        }
        out
    }

    // --- breakpoints and run control ---

    pub fn add_breakpoint(&mut self, line: usize) {
        self.breakpoints.insert(line);
    }

    pub fn remove_breakpoint(&mut self, line: usize) {
        self.breakpoints.remove(&line);
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// runs up to `max_steps` opcodes in batches, pausing on breakpoint
    /// lines, a stop request or the Breakpoint builtin. returns the number
    /// of steps taken.
    pub fn run(&mut self, max_steps: usize) -> usize {
        self.stop_requested = false;
        let mut total = 0;
        while total < max_steps {
            let batch = self.batch_size.min(max_steps - total);
            let taken = self.run_batch(batch);
            total += taken;
            if taken == 0 || self.stop_requested || self.is_done() {
                break;
            }
        }
        total
    }

    /// runs at most `limit` steps, stopping early at breakpoints.
    pub fn run_batch(&mut self, limit: usize) -> usize {
        let mut taken = 0;
        for _ in 0..limit {
            if self.stop_requested || !self.run_step() {
                break;
            }
            taken += 1;
            if self.breakpoints.contains(&self.get_current_line()) {
                self.stop_requested = true;
                break;
            }
        }
        taken
    }

    /// steps once, then keeps stepping until control returns to the
    /// current call depth.
    pub fn step_over(&mut self) -> bool {
        let depth = self.call_stack.len();
        if !self.run_step() {
            return false;
        }
        while self.call_stack.len() > depth && !self.stop_requested {
            if !self.run_step() {
                return false;
            }
        }
        true
    }

    // --- forward stepping ---

    /// executes one opcode. returns false once the program is complete or
    /// when compile errors block execution.
    pub fn run_step(&mut self) -> bool {
        if !self.program.errors.is_empty() {
            warn!("refusing to step a program with compile errors");
            return false;
        }
        if self.is_done() {
            return false;
        }
        self.errors.clear();

        let mut record = StepData::new(self.current_func, self.current_step);
        let op = self.program.funcs[self.current_func].code[self.current_step].clone();
        debug!(
            "step {:?} line {} in {}",
            op.cmd, op.line, self.program.funcs[self.current_func].name
        );

        match op.cmd {
            Cmd::ForInit => {
                // args: [init, cond] or [init, cond, step]
                self.eval_effect(&op.args[0], &mut record, op.line);
                if self.eval_truthy(&op.args[1], &mut record, op.line) {
                    self.current_step += 2; // into the body, past FOR_LOOP
                } else {
                    self.current_step = (op.target + 1) as usize;
                }
            }
            Cmd::ForLoop => {
                // args: [cond, step]; reached only from FOR_END
                self.eval_effect(&op.args[1], &mut record, op.line);
                if self.eval_truthy(&op.args[0], &mut record, op.line) {
                    self.current_step += 1;
                } else {
                    self.current_step = (op.target + 1) as usize;
                }
            }
            Cmd::ForEnd => {
                self.current_step = op.target as usize;
            }
            Cmd::If => {
                if self.eval_truthy(&op.args[0], &mut record, op.line) {
                    if op.args.len() > 1 {
                        self.eval_effect(&op.args[1], &mut record, op.line);
                    }
                    self.current_step += 1;
                } else {
                    self.current_step = (op.target + 1) as usize;
                }
            }
            Cmd::Else => {
                self.current_step = (op.target + 1) as usize;
            }
            Cmd::EndIf => {
                self.current_step += 1;
            }
            Cmd::Return => {
                self.current_step = self.program.funcs[self.current_func].code.len();
            }
            Cmd::Break => {
                // through the loop opcode: past the matching FOR_END
                let loop_end = self.program.funcs[self.current_func].code[op.target as usize].target;
                self.current_step = (loop_end + 1) as usize;
            }
            Cmd::Continue => {
                // jump onto the FOR_END, which re-enters at FOR_LOOP
                let loop_end = self.program.funcs[self.current_func].code[op.target as usize].target;
                self.current_step = loop_end as usize;
            }
            Cmd::Expression => {
                self.eval_effect(&op.args[0], &mut record, op.line);
                self.current_step += 1;
            }
            Cmd::Call(callee) => {
                let params = self.program.funcs[callee].params.clone();
                let callee_name = self.program.funcs[callee].name.clone();
                let mut argv = Vec::with_capacity(params.len());
                for (i, param) in params.iter().enumerate() {
                    let cell = format!("{}_{}", callee_name, param);
                    self.save_cell(&mut record, &cell);
                    let prefix = format!("{}=", cell);
                    match self.eval_expression(&op.args[i], Some(&prefix), &mut record) {
                        Ok(v) => argv.push(v.to_string()),
                        Err(e) => {
                            self.fault(format!("Exception in line {}: {}", op.line, e));
                            argv.push("?".to_string());
                        }
                    }
                }
                self.call_stack.push(Frame {
                    func: self.current_func,
                    return_step: self.current_step + 1,
                    desc: format!("{}({})", callee_name, argv.join(", ")),
                });
                record.pushed_frame = true;
                self.current_func = callee;
                self.current_step = 0;
            }
            Cmd::Builtin(b) => {
                let mut vals = Vec::with_capacity(op.args.len());
                let mut ok = true;
                for arg in &op.args {
                    match self.eval_expression(arg, None, &mut record) {
                        Ok(v) => vals.push(v),
                        Err(e) => {
                            self.fault(format!("Exception in line {}: {}", op.line, e));
                            ok = false;
                            break;
                        }
                    }
                }
                if ok {
                    self.exec_builtin(b, &vals, &mut record);
                }
                self.current_step += 1;
            }
        }

        // a function that ran off its end returns to its caller
        loop {
            let len = self.program.funcs[self.current_func].code.len();
            if self.current_step < len {
                break;
            }
            match self.call_stack.pop() {
                Some(frame) => {
                    self.current_func = frame.func;
                    self.current_step = frame.return_step;
                    record.popped_frames.push(frame);
                }
                None => break,
            }
        }

        if !record.skip {
            self.history.push_back(record);
            while self.history.len() > self.history_limit {
                self.history.pop_front();
            }
        }
        true
    }

    // --- step-back ---

    /// undoes the most recent step: restores position, call stack and
    /// written cells, and reverses the step's quantum gate where one
    /// exists. irreversible gates leave the vector as-is with a warning.
    pub fn step_back(&mut self) -> bool {
        let Some(record) = self.history.pop_back() else {
            return false;
        };
        self.errors.clear();

        if record.pushed_frame {
            self.call_stack.pop();
        }
        for frame in record.popped_frames.into_iter().rev() {
            self.call_stack.push(frame);
        }
        self.current_func = record.func;
        self.current_step = record.step;

        for (name, value) in record.saved {
            self.env.set(&name, value);
        }
        if let Some(m) = record.saved_measured {
            self.measured_value = m;
        }

        if let Some((builtin, args)) = record.gate {
            match builtin.reverse(&args) {
                Some((reverse, reverse_args)) => {
                    if let Err(e) = self.apply_gate(reverse, &reverse_args) {
                        self.fault(e);
                    }
                }
                None => match builtin {
                    Builtin::Measure
                    | Builtin::MeasureBit
                    | Builtin::ExpModN
                    | Builtin::RevExpModN => {
                        self.fault(format!(
                            "Cannot reverse {}; quantum state left unchanged",
                            builtin.name()
                        ));
                    }
                    _ => {}
                },
            }
        }
        true
    }

    // --- scope translation ---

    fn scoped_name(&self, func: FuncId, id: &str) -> String {
        format!("{}_{}", self.program.funcs[func].name, id)
    }

    /// maps a source identifier to its runtime cell: '_'-prefixed names
    /// share one global cell; anything else resolves to the nearest
    /// declaring ancestor or becomes a new local of the current function.
    fn resolve_name(&mut self, id: &str) -> String {
        if id.starts_with('_') {
            return format!("_{}", id);
        }
        let mut cursor = Some(self.current_func);
        while let Some(f) = cursor {
            let func = &self.program.funcs[f];
            if func.params.iter().any(|p| p == id)
                || self.func_locals[f].iter().any(|l| l == id)
            {
                return self.scoped_name(f, id);
            }
            cursor = func.parent;
        }
        self.func_locals[self.current_func].push(id.to_string());
        self.scoped_name(self.current_func, id)
    }

    fn save_cell(&mut self, record: &mut StepData, name: &str) {
        if record.saved.iter().any(|(n, _)| n == name) {
            return;
        }
        record.saved.push((name.to_string(), self.env.get(name)));
    }

    /// rewrites a token run into an evaluable expression: IDs become their
    /// scoped cells (recording pre-step values for undo), `measured_value`
    /// substitutes the last measurement literally, and expression bodies
    /// pass through unchanged.
    fn eval_expression(
        &mut self,
        tokens: &[Token],
        prefix: Option<&str>,
        record: &mut StepData,
    ) -> Result<Value, String> {
        let mut text = String::new();
        if let Some(p) = prefix {
            text.push_str(p);
        }
        for token in tokens {
            match token.kind {
                TokenKind::Id => {
                    let body = token.body.as_str();
                    if body == "measured_value" {
                        record.saved_measured.get_or_insert(self.measured_value);
                        text.push_str(&self.measured_value.to_string());
                    } else if ATOMS.contains(&body) {
                        text.push_str(body);
                    } else if crate::lexer::continues_numeric_literal(text.chars().last(), body) {
                        text.push_str(body);
                    } else {
                        let cell = self.resolve_name(body);
                        self.save_cell(record, &cell);
                        text.push_str(&cell);
                    }
                }
                TokenKind::Expression | TokenKind::Separator => text.push_str(&token.body),
            }
        }
        expr::eval_str(&text, &mut self.env)
    }

    fn eval_truthy(&mut self, tokens: &[Token], record: &mut StepData, line: usize) -> bool {
        match self.eval_expression(tokens, None, record) {
            Ok(v) => v.truthy(),
            Err(e) => {
                self.fault(format!("Exception in line {}: {}", line, e));
                false
            }
        }
    }

    fn eval_effect(&mut self, tokens: &[Token], record: &mut StepData, line: usize) {
        if let Err(e) = self.eval_expression(tokens, None, record) {
            self.fault(format!("Exception in line {}: {}", line, e));
        }
    }

    fn fault(&mut self, message: String) {
        warn!("{}", message);
        self.errors.push(message.clone());
        self.error_log.push(message);
    }

    // --- builtin dispatch ---

    fn exec_builtin(&mut self, builtin: Builtin, vals: &[Value], record: &mut StepData) {
        let line = self.program.funcs[record.func].code[record.step].line;
        let nums: Vec<f64> = vals.iter().map(Value::as_num).collect();
        match builtin {
            Builtin::VectorSize => match check_register_size(nums[0] as i64) {
                Ok(n) => {
                    self.sim = QuantumState::new(n);
                    if let Some(seed) = self.seed {
                        self.sim.seed_rng(seed);
                    }
                    record.skip = true;
                }
                Err(e) => self.fault(format!("{} in line {}", e, line)),
            },
            Builtin::Measure => {
                record.saved_measured.get_or_insert(self.measured_value);
                self.measured_value = self.sim.measure();
                record.gate = Some((builtin, nums));
            }
            Builtin::MeasureBit => {
                record.saved_measured.get_or_insert(self.measured_value);
                match self.sim.measure_bit(nums[0] as i64) {
                    Ok(bit) => {
                        self.measured_value = bit;
                        record.gate = Some((builtin, nums));
                    }
                    Err(e) => self.fault(format!("{} in line {}", e, line)),
                }
            }
            Builtin::Print => {
                let text = vals[0].to_string();
                self.host.print(&text);
            }
            Builtin::Breakpoint => {
                self.host.breakpoint();
                self.stop_requested = true;
            }
            Builtin::Delay => {
                let ms = nums[0];
                if !(1.0..=10000.0).contains(&ms) {
                    self.fault(format!("Delay out of range: {} in line {}", ms, line));
                } else {
                    self.delay_ms = ms;
                    self.host.delay(ms);
                }
            }
            Builtin::Display => {
                let text = vals[0].to_string();
                self.host.display(&text);
            }
            Builtin::SetViewAngle => self.host.set_view_angle(nums[0]),
            Builtin::SetViewMode => {
                let mode = nums[0] as i64;
                if !(0..=2).contains(&mode) {
                    self.fault(format!("SetViewMode out of range: {} in line {}", mode, line));
                } else {
                    self.host.set_view_mode(mode);
                }
            }
            _ => match self.apply_gate(builtin, &nums) {
                Ok(()) => {
                    if builtin.touches_state() {
                        record.gate = Some((builtin, nums));
                    }
                }
                Err(e) => self.fault(format!("{} in line {}", e, line)),
            },
        }
    }

    /// routes a pure gate builtin into the simulator. shared by the
    /// forward path and by step-back's reverse application.
    fn apply_gate(&mut self, builtin: Builtin, a: &[f64]) -> Result<(), String> {
        let sim = &mut self.sim;
        match builtin {
            Builtin::Hadamard => sim.apply_hadamard(a[0] as i64),
            Builtin::SigmaX => sim.apply_sigma_x(a[0] as i64),
            Builtin::SigmaY => sim.apply_sigma_y(a[0] as i64),
            Builtin::SigmaZ => sim.apply_sigma_z(a[0] as i64),
            Builtin::Rx => sim.apply_rx(a[0] as i64, a[1]),
            Builtin::Ry => sim.apply_ry(a[0] as i64, a[1]),
            Builtin::Rz => sim.apply_rz(a[0] as i64, a[1]),
            Builtin::Unitary => sim.apply_unitary(
                a[0] as i64,
                [
                    Complex32::new(a[1] as f32, a[2] as f32),
                    Complex32::new(a[3] as f32, a[4] as f32),
                    Complex32::new(a[5] as f32, a[6] as f32),
                    Complex32::new(a[7] as f32, a[8] as f32),
                ],
            ),
            Builtin::CNot => sim.apply_cnot(a[0] as i64, a[1] as i64),
            Builtin::Swap => sim.apply_swap(a[0] as i64, a[1] as i64),
            Builtin::Toffoli => sim.apply_toffoli(a[0] as i64, a[1] as i64, a[2] as i64),
            Builtin::Phase => sim.apply_phase(a[0] as i64, a[1]),
            Builtin::CPhase => sim.apply_cphase(a[0] as i64, a[1] as i64, a[2]),
            Builtin::QftCPhase => sim.apply_phase_shift(a[0] as i64, a[1] as i64, 1),
            Builtin::InvQftCPhase => sim.apply_phase_shift(a[0] as i64, a[1] as i64, -1),
            Builtin::Qft => sim.apply_qft(a[0] as i64, a[1] as i64),
            Builtin::InvQft => sim.apply_inv_qft(a[0] as i64, a[1] as i64),
            Builtin::ShiftLeft => sim.shift_left(a[0] as i64),
            Builtin::ShiftRight => sim.shift_right(a[0] as i64),
            Builtin::ExpModN => sim.exp_mod_n(a[0] as i64, a[1] as i64, a[2] as i64),
            Builtin::RevExpModN => sim.rev_exp_mod_n(a[0] as i64, a[1] as i64, a[2] as i64),
            Builtin::Decoherence => {
                sim.decoherence(a[0]);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

