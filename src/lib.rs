//! wppl - continuation-passing compiler and inference runtime for a small
//! probabilistic JavaScript subset

pub mod ast;
pub mod codegen;
pub mod erp;
pub mod errors;
pub mod eval;
pub mod gensym;
pub mod infer;
pub mod operators;
pub mod prelude;
pub mod runtime;
pub mod test_support;

pub use ast::Node;
pub use codegen::{compile, CompileError, CompileOptions};
pub use erp::{Erp, Marginal};
pub use errors::{find_similar, format_header, format_suggestions, levenshtein_distance, Colors, ErrorConfig};
pub use eval::{EvalError, Interpreter, Value};
pub use gensym::gensym;
pub use runtime::{Coroutine, Runtime, RuntimeConfig};
