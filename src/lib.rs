pub mod builtins; // gate/control builtin table
pub mod compiler; // source text -> opcode programs
pub mod expr; // classical expression evaluator
pub mod kernels; // amplitude-vector kernels
pub mod lexer; // line tokenizer
pub mod numeric; // integer helpers
pub mod runtime; // execution engine + quantum state
