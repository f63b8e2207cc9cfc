//! Compiler pipeline: direct-style AST → CPS AST
//!
//! 1. Prepend the header program (`flip`, `condition`, ...)
//! 2. Wrap free host primitives so they can be called with a continuation
//! 3. CPS-transform against the top-level continuation
//! 4. Emit the wrapper definitions ahead of the transformed program

pub mod cps_transform;
pub mod primitives;
pub mod scope;

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

pub use cps_transform::{cps, CPSTransformer, CpsError};
pub use primitives::{default_excluded, wrap_primitives, WrapError, WrappedProgram, CPS_MARKER};
pub use scope::free_identifiers;

use crate::ast::build::ident;
use crate::ast::Node;
use crate::prelude;

/// Name of the continuation the host supplies for the whole program
pub const TOP_CONTINUATION: &str = "topK";

#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Cps(#[from] CpsError),
    #[error(transparent)]
    Wrap(#[from] WrapError),
    #[error("header program failed to load: {0}")]
    Header(#[from] serde_json::Error),
    #[error("expected a Program node, got {0}")]
    NotAProgram(&'static str),
}

/// Compiler configuration
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Identifier the transformed program hands its final value to
    pub top_continuation: String,
    /// Compile the header program ahead of user code
    pub include_header: bool,
    /// Names to leave unwrapped in addition to the runtime's own
    pub exclude: HashSet<String>,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self {
            top_continuation: TOP_CONTINUATION.to_string(),
            include_header: true,
            exclude: HashSet::new(),
        }
    }

    pub fn with_top_continuation(mut self, name: impl Into<String>) -> Self {
        self.top_continuation = name.into();
        self
    }

    pub fn without_header(mut self) -> Self {
        self.include_header = false;
        self
    }

    pub fn excluding(mut self, name: impl Into<String>) -> Self {
        self.exclude.insert(name.into());
        self
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile a direct-style program into a runnable CPS program
pub fn compile(program: &Node, options: &CompileOptions) -> Result<Node, CompileError> {
    let Node::Program { body } = program else {
        return Err(CompileError::NotAProgram(program.kind()));
    };

    let mut statements = Vec::new();
    if options.include_header {
        statements.extend(prelude::header_statements()?);
    }
    statements.extend(body.iter().cloned());
    let source = Node::Program { body: statements };

    let mut excluded = default_excluded();
    excluded.extend(options.exclude.iter().cloned());
    let wrapped = wrap_primitives(&source, &excluded)?;

    let Node::Program { body: cps_body } = cps(&wrapped.program, &ident(&options.top_continuation))? else {
        return Err(CompileError::NotAProgram(wrapped.program.kind()));
    };
    debug!(
        primitives = wrapped.primitives.len(),
        "compiled program to continuation-passing style"
    );

    let mut out = wrapped.wrappers;
    out.extend(cps_body);
    Ok(Node::Program { body: out })
}
