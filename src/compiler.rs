// source text -> opcode programs.
//
// compilation is line oriented: each line is tokenized, then dispatched on
// its leading identifier. user `proc` blocks compile recursively into
// child functions; `for`/`if`/`else`/`break`/`continue` leave unresolved
// branch indices on a fix-up stack that `endfor`/`endif` close. errors
// accumulate and never abort the walk, so one pass reports everything.

use crate::builtins::Builtin;
use crate::lexer::{continues_numeric_literal, tokenize_line, Token, TokenKind};
use std::collections::HashMap;

pub type FuncId = usize;

/// index of `__main__` in every program's function arena.
pub const MAIN: FuncId = 0;

#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    ForInit,
    ForLoop,
    ForEnd,
    If,
    Else,
    EndIf,
    Return,
    Break,
    Continue,
    Expression,
    Builtin(Builtin),
    Call(FuncId),
}

#[derive(Debug, Clone)]
pub struct Opcode {
    pub cmd: Cmd,
    /// tokenized sub-expressions (arguments, loop clauses, the condition)
    pub args: Vec<Vec<Token>>,
    /// 1-based source line
    pub line: usize,
    /// resolved branch index, or -1 where no branch applies
    pub target: isize,
}

impl Opcode {
    fn new(cmd: Cmd, args: Vec<Vec<Token>>, line: usize) -> Self {
        Opcode {
            cmd,
            args,
            line,
            target: -1,
        }
    }
}

#[derive(Debug)]
pub struct Func {
    pub name: String,
    pub parent: Option<FuncId>,
    pub params: Vec<String>,
    pub code: Vec<Opcode>,
    pub children: HashMap<String, FuncId>,
}

#[derive(Debug)]
pub struct Program {
    /// function arena; parent/child links are indices into this vector
    pub funcs: Vec<Func>,
    pub errors: Vec<String>,
}

impl Program {
    pub fn func(&self, id: FuncId) -> &Func {
        &self.funcs[id]
    }
}

const KEYWORDS: [&str; 10] = [
    "if", "else", "endif", "return", "break", "continue", "proc", "endproc", "for", "endfor",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// splits a token run into per-argument token lists. arguments separate on
/// top-level ',' and ';', and also wherever a complete operand is followed
/// by a token that starts a new one, so `CNot 0 1` and `CNot 0, 1` parse
/// alike. parenthesis depth is counted by scanning expression bodies;
/// string literals do not contribute.
pub fn parse_expressions(tokens: &[Token]) -> Vec<Vec<Token>> {
    let mut out = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut depth = 0i32;
    for t in tokens {
        match t.kind {
            TokenKind::Separator if depth == 0 => {
                out.push(std::mem::take(&mut current));
            }
            _ => {
                if depth == 0 && arg_break(&current, t) {
                    out.push(std::mem::take(&mut current));
                }
                if t.kind == TokenKind::Expression && !t.is_string() {
                    for c in t.body.chars() {
                        match c {
                            '(' => depth += 1,
                            ')' => depth -= 1,
                            _ => {}
                        }
                    }
                }
                current.push(t.clone());
            }
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// true when `next` opens a new space-separated argument after the tokens
/// accumulated so far.
fn arg_break(current: &[Token], next: &Token) -> bool {
    let Some(prev) = current.last() else {
        return false;
    };
    // the run so far must end a complete operand
    let complete = match prev.kind {
        TokenKind::Id => true,
        TokenKind::Expression => prev
            .body
            .chars()
            .last()
            .is_some_and(|c| c.is_alphanumeric() || c == ')' || c == '"' || c == '.'),
        TokenKind::Separator => false,
    };
    if !complete {
        return false;
    }
    match next.kind {
        TokenKind::Id => !continues_numeric_literal(prev.body.chars().last(), &next.body),
        TokenKind::Expression => next
            .body
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit() || c == '.' || c == '"' || c == '('),
        TokenKind::Separator => false,
    }
}

struct Compiler {
    lines: Vec<Vec<Token>>,
    funcs: Vec<Func>,
    errors: Vec<String>,
}

pub fn compile(source: &str) -> Program {
    let cleaned = source.replace(['\r', '\t'], " ");
    let lines: Vec<Vec<Token>> = cleaned.split('\n').map(tokenize_line).collect();

    let mut c = Compiler {
        lines,
        funcs: Vec::new(),
        errors: Vec::new(),
    };
    c.new_func("__main__".to_string(), None, Vec::new());
    c.compile_function(MAIN, 0);
    Program {
        funcs: c.funcs,
        errors: c.errors,
    }
}

impl Compiler {
    fn new_func(&mut self, name: String, parent: Option<FuncId>, params: Vec<String>) -> FuncId {
        let id = self.funcs.len();
        self.funcs.push(Func {
            name,
            parent,
            params,
            code: Vec::new(),
            children: HashMap::new(),
        });
        id
    }

    fn error(&mut self, message: String) {
        self.errors.push(message);
    }

    /// compiles lines into `func` starting at line index `start`; returns
    /// the line index just past the body (past `endproc` for a child).
    fn compile_function(&mut self, func: FuncId, start: usize) -> usize {
        // unresolved opcode indices awaiting endfor / else / endif
        let mut for_stack: Vec<usize> = Vec::new();
        let mut if_stack: Vec<usize> = Vec::new();

        let mut i = start;
        while i < self.lines.len() {
            let tokens = self.lines[i].clone();
            let lineno = i + 1;
            if tokens.is_empty() {
                i += 1;
                continue;
            }
            if tokens.iter().any(|t| t.is_unterminated_string()) {
                self.error(format!("Syntax error in line {}", lineno));
                i += 1;
                continue;
            }
            if tokens[0].kind != TokenKind::Id {
                self.error(format!("Syntax error in line {}", lineno));
                i += 1;
                continue;
            }
            let first = tokens[0].body.clone();

            if tokens.len() == 1 {
                match first.as_str() {
                    "endfor" => self.close_for(func, &mut for_stack, lineno),
                    "else" => self.close_else(func, &mut if_stack, lineno),
                    "endif" => self.close_if(func, &mut if_stack, lineno),
                    "break" => self.emit_loop_jump(func, Cmd::Break, &for_stack, lineno),
                    "continue" => self.emit_loop_jump(func, Cmd::Continue, &for_stack, lineno),
                    "return" => self.funcs[func]
                        .code
                        .push(Opcode::new(Cmd::Return, Vec::new(), lineno)),
                    "endproc" => {
                        if self.funcs[func].parent.is_none() {
                            self.error(format!("Unmatched endproc in line {}", lineno));
                        } else {
                            self.finish_function(func, &for_stack, &if_stack);
                            return i + 1;
                        }
                    }
                    name => self.compile_call(func, name, &[], lineno),
                }
                i += 1;
                continue;
            }

            match first.as_str() {
                "for" => self.compile_for(func, &tokens[1..], &mut for_stack, lineno),
                "if" => self.compile_if(func, &tokens[1..], &mut if_stack, lineno),
                "proc" => {
                    i = self.compile_proc(func, &tokens[1..], i);
                    continue;
                }
                _ => {
                    if Builtin::lookup(&first).is_some() || !starts_with_operator(&tokens[1]) {
                        self.compile_call(func, &first, &tokens[1..], lineno);
                    } else {
                        // assignment or other side-effecting expression
                        self.funcs[func]
                            .code
                            .push(Opcode::new(Cmd::Expression, vec![tokens.clone()], lineno));
                    }
                }
            }
            i += 1;
        }

        // ran off the end of the source
        if self.funcs[func].parent.is_some() {
            self.error(format!(
                "Missing endproc for proc {} in line {}",
                self.funcs[func].name, start
            ));
        }
        self.finish_function(func, &for_stack, &if_stack);
        self.lines.len()
    }

    fn finish_function(&mut self, func: FuncId, for_stack: &[usize], if_stack: &[usize]) {
        for &idx in for_stack {
            let line = self.funcs[func].code[idx].line;
            self.error(format!("Missing endfor in line {}", line));
        }
        for &idx in if_stack {
            let line = self.funcs[func].code[idx].line;
            self.error(format!("Missing endif in line {}", line));
        }
    }

    fn compile_for(
        &mut self,
        func: FuncId,
        rest: &[Token],
        for_stack: &mut Vec<usize>,
        lineno: usize,
    ) {
        let exprs = parse_expressions(rest);
        if exprs.len() < 2 || exprs.len() > 3 || exprs.iter().any(|e| e.is_empty()) {
            self.error(format!("Syntax error in line {}", lineno));
            return;
        }
        // FOR_LOOP re-evaluates the step each iteration; without a third
        // clause the init expression doubles as the step
        let loop_args = if exprs.len() == 3 {
            vec![exprs[1].clone(), exprs[2].clone()]
        } else {
            vec![exprs[1].clone(), exprs[0].clone()]
        };
        let init_idx = self.funcs[func].code.len();
        self.funcs[func]
            .code
            .push(Opcode::new(Cmd::ForInit, exprs, lineno));
        self.funcs[func]
            .code
            .push(Opcode::new(Cmd::ForLoop, loop_args, lineno));
        for_stack.push(init_idx);
    }

    fn close_for(&mut self, func: FuncId, for_stack: &mut Vec<usize>, lineno: usize) {
        let Some(init_idx) = for_stack.pop() else {
            self.error(format!("Unmatched endfor in line {}", lineno));
            return;
        };
        let end_idx = self.funcs[func].code.len();
        let mut end = Opcode::new(Cmd::ForEnd, Vec::new(), lineno);
        end.target = (init_idx + 1) as isize; // re-enter at FOR_LOOP
        self.funcs[func].code.push(end);
        self.funcs[func].code[init_idx].target = end_idx as isize;
        self.funcs[func].code[init_idx + 1].target = end_idx as isize;
    }

    fn compile_if(
        &mut self,
        func: FuncId,
        rest: &[Token],
        if_stack: &mut Vec<usize>,
        lineno: usize,
    ) {
        let exprs = parse_expressions(rest);
        if exprs.is_empty() || exprs.len() > 2 || exprs.iter().any(|e| e.is_empty()) {
            self.error(format!("Syntax error in line {}", lineno));
            return;
        }
        let idx = self.funcs[func].code.len();
        self.funcs[func]
            .code
            .push(Opcode::new(Cmd::If, exprs, lineno));
        if_stack.push(idx);
    }

    fn close_else(&mut self, func: FuncId, if_stack: &mut Vec<usize>, lineno: usize) {
        match if_stack.pop() {
            Some(if_idx) if self.funcs[func].code[if_idx].cmd == Cmd::If => {
                let else_idx = self.funcs[func].code.len();
                self.funcs[func]
                    .code
                    .push(Opcode::new(Cmd::Else, Vec::new(), lineno));
                // a false IF lands just past this ELSE
                self.funcs[func].code[if_idx].target = else_idx as isize;
                if_stack.push(else_idx);
            }
            other => {
                if let Some(idx) = other {
                    if_stack.push(idx);
                }
                self.error(format!("Unmatched else in line {}", lineno));
            }
        }
    }

    fn close_if(&mut self, func: FuncId, if_stack: &mut Vec<usize>, lineno: usize) {
        let Some(open_idx) = if_stack.pop() else {
            self.error(format!("Unmatched endif in line {}", lineno));
            return;
        };
        let end_idx = self.funcs[func].code.len();
        self.funcs[func]
            .code
            .push(Opcode::new(Cmd::EndIf, Vec::new(), lineno));
        self.funcs[func].code[open_idx].target = end_idx as isize;
    }

    fn emit_loop_jump(&mut self, func: FuncId, cmd: Cmd, for_stack: &[usize], lineno: usize) {
        let Some(&init_idx) = for_stack.last() else {
            let name = if cmd == Cmd::Break { "break" } else { "continue" };
            self.error(format!("Unmatched {} in line {}", name, lineno));
            return;
        };
        // target is the enclosing FOR_INIT; the interpreter dereferences
        // through its target, which endfor resolves to the loop end
        let mut op = Opcode::new(cmd, Vec::new(), lineno);
        op.target = init_idx as isize;
        self.funcs[func].code.push(op);
    }

    fn compile_proc(&mut self, func: FuncId, rest: &[Token], line_idx: usize) -> usize {
        let lineno = line_idx + 1;
        let name = match rest.first() {
            Some(t) if t.kind == TokenKind::Id && !is_keyword(&t.body) => t.body.clone(),
            _ => {
                self.error(format!("Syntax error in line {}", lineno));
                return line_idx + 1;
            }
        };
        if self.funcs[func].children.contains_key(&name) || Builtin::lookup(&name).is_some() {
            self.error(format!("Syntax error in line {}", lineno));
            return line_idx + 1;
        }
        let params: Vec<String> = rest[1..]
            .iter()
            .filter(|t| t.kind == TokenKind::Id)
            .map(|t| t.body.clone())
            .collect();
        let child = self.new_func(name.clone(), Some(func), params);
        // registered before the body compiles, so the proc can call itself
        self.funcs[func].children.insert(name, child);
        self.compile_function(child, line_idx + 1)
    }

    /// builtin or user-proc call; `name` resolution walks the lexical chain.
    fn compile_call(&mut self, func: FuncId, name: &str, rest: &[Token], lineno: usize) {
        let args = if rest.is_empty() {
            Vec::new()
        } else {
            parse_expressions(rest)
        };
        if args.iter().any(|a| a.is_empty()) {
            self.error(format!("Syntax error in line {}", lineno));
            return;
        }
        if let Some(b) = Builtin::lookup(name) {
            if args.len() != b.arity() {
                self.error(format!("Wrong number of arguments in line {}", lineno));
                return;
            }
            self.funcs[func]
                .code
                .push(Opcode::new(Cmd::Builtin(b), args, lineno));
            return;
        }
        if let Some(callee) = self.resolve_func(func, name) {
            if args.len() != self.funcs[callee].params.len() {
                self.error(format!("Wrong number of arguments in line {}", lineno));
                return;
            }
            self.funcs[func]
                .code
                .push(Opcode::new(Cmd::Call(callee), args, lineno));
            return;
        }
        self.error(format!("Unknown command in line {}", lineno));
    }

    fn resolve_func(&self, from: FuncId, name: &str) -> Option<FuncId> {
        let mut current = Some(from);
        while let Some(f) = current {
            if let Some(&child) = self.funcs[f].children.get(name) {
                return Some(child);
            }
            // a proc may also call itself by name
            if self.funcs[f].name == name {
                return Some(f);
            }
            current = self.funcs[f].parent;
        }
        None
    }
}

/// true when an expression token opens with an assignment or arithmetic
/// operator, which marks the whole line as an expression statement.
fn starts_with_operator(token: &Token) -> bool {
    if token.kind != TokenKind::Expression || token.is_string() {
        return false;
    }
    matches!(
        token.body.chars().next(),
        Some('=' | '+' | '-' | '*' | '/' | '%' | '&' | '|' | '^' | '<' | '>' | '!' | '?')
    )
}
