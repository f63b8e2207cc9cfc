//! Primitive wrapping
//!
//! Host functions like `plus` return their result directly; CPS code calls
//! everything as `f(k, args...)`. Every free identifier that the runtime does
//! not already provide in CPS form is treated as a host primitive: a wrapper
//! `var plus_cps_N = function(k, ...args) { return k(plus(...args)); };` is
//! generated and free references to `plus` are renamed to the wrapper.
//!
//! `_cps(name)` marks a reference as already CPS-compatible. The marker is
//! replaced by the bare name and that occurrence is left alone.

use std::collections::HashSet;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use super::scope::{rewrite_references, ReferenceVisitor};
use crate::ast::build::{call, func_nodes, ident, rest, ret, spread, var};
use crate::ast::Node;
use crate::gensym::gensym;

/// Marker call that opts a reference out of wrapping
pub const CPS_MARKER: &str = "_cps";

/// Globals the runtime supplies in CPS-compatible or value form
pub const RUNTIME_NAMES: &[&str] = &[
    "sample",
    "factor",
    "exit",
    "Enumerate",
    "Forward",
    "ParticleFilter",
    "undefined",
    "Infinity",
    "NaN",
    "bernoulliERP",
    "randomIntegerERP",
    "uniformERP",
    "discreteERP",
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WrapError {
    #[error("malformed continuation primitive: {0}")]
    MalformedContinuationPrimitive(String),
}

/// A program with host primitives renamed to their generated wrappers
#[derive(Debug, Clone)]
pub struct WrappedProgram {
    pub program: Node,
    /// Wrapper definitions, in first-reference order
    pub wrappers: Vec<Node>,
    /// Original primitive names, parallel to `wrappers`
    pub primitives: Vec<String>,
}

/// The default exclusion set: runtime names plus the marker
pub fn default_excluded() -> HashSet<String> {
    RUNTIME_NAMES
        .iter()
        .chain(std::iter::once(&CPS_MARKER))
        .map(|s| s.to_string())
        .collect()
}

/// Rename free primitive references and synthesize their wrappers
pub fn wrap_primitives(program: &Node, excluded: &HashSet<String>) -> Result<WrappedProgram, WrapError> {
    let mut wrapper = PrimitiveWrapper {
        excluded,
        renamed: IndexMap::new(),
    };
    let program = rewrite_references(program, &mut wrapper)?;

    let (primitives, wrappers) = wrapper
        .renamed
        .into_iter()
        .map(|(primitive, name)| {
            let def = wrapper_definition(&primitive, &name);
            (primitive, def)
        })
        .unzip();

    Ok(WrappedProgram {
        program,
        wrappers,
        primitives,
    })
}

/// `var name = function(k, ...args) { return k(primitive(...args)); };`
pub fn wrapper_definition(primitive: &str, name: &str) -> Node {
    let k = gensym("_k");
    let args = gensym("_args");
    let body = ret(call(
        ident(&k),
        vec![call(ident(primitive), vec![spread(ident(&args))])],
    ));
    var(name, func_nodes(None, vec![ident(&k), rest(&args)], vec![body]))
}

struct PrimitiveWrapper<'a> {
    excluded: &'a HashSet<String>,
    /// primitive name -> wrapper name
    renamed: IndexMap<String, String>,
}

impl ReferenceVisitor for PrimitiveWrapper<'_> {
    type Error = WrapError;

    fn free_reference(&mut self, name: &str) -> Result<Option<String>, WrapError> {
        if self.excluded.contains(name) {
            return Ok(None);
        }
        if let Some(existing) = self.renamed.get(name) {
            return Ok(Some(existing.clone()));
        }
        let wrapper = gensym(&format!("{}_cps_", name));
        debug!(primitive = name, wrapper = %wrapper, "wrapping host primitive");
        self.renamed.insert(name.to_string(), wrapper.clone());
        Ok(Some(wrapper))
    }

    fn intercept_call(&mut self, callee: &Node, arguments: &[Node]) -> Result<Option<Node>, WrapError> {
        if callee.as_ident() != Some(CPS_MARKER) {
            return Ok(None);
        }
        match arguments {
            [target @ Node::Identifier { .. }] => Ok(Some(target.clone())),
            [other] => Err(WrapError::MalformedContinuationPrimitive(format!(
                "`{}` expects a bare name, got {}",
                CPS_MARKER,
                other.kind()
            ))),
            _ => Err(WrapError::MalformedContinuationPrimitive(format!(
                "`{}` expects exactly one argument, got {}",
                CPS_MARKER,
                arguments.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;

    fn wrap(prog: &Node) -> Result<WrappedProgram, WrapError> {
        wrap_primitives(prog, &default_excluded())
    }

    #[test]
    fn test_free_primitive_is_renamed_everywhere() {
        let prog = program(vec![expr_stmt(call(
            ident("plus"),
            vec![call(ident("plus"), vec![num(1.0), num(2.0)]), num(3.0)],
        ))]);
        let wrapped = wrap(&prog).unwrap();
        assert_eq!(wrapped.primitives, vec!["plus".to_string()]);
        let json = wrapped.program.to_json(false).unwrap();
        assert!(!json.contains("\"name\":\"plus\""));
        assert_eq!(json.matches("plus_cps_").count(), 2);
    }

    #[test]
    fn test_runtime_names_and_locals_are_not_wrapped() {
        let prog = program(vec![
            var("flip", func(&["p"], vec![ret(call(ident("sample"), vec![ident("bernoulliERP"), array(vec![ident("p")])]))])),
            expr_stmt(call(ident("flip"), vec![num(0.5)])),
        ]);
        let wrapped = wrap(&prog).unwrap();
        assert!(wrapped.primitives.is_empty());
        assert_eq!(wrapped.program, prog);
    }

    #[test]
    fn test_marker_unwraps_to_bare_name() {
        let prog = program(vec![expr_stmt(call(
            call(ident(CPS_MARKER), vec![ident("handWritten")]),
            vec![ident("handWritten")],
        ))]);
        let wrapped = wrap(&prog).unwrap();
        // The marked callee stays bare; the unmarked argument is wrapped
        let Node::Program { body } = &wrapped.program else { panic!() };
        let Node::ExpressionStatement { expression } = &body[0] else { panic!() };
        let Node::CallExpression { callee, arguments } = expression.as_ref() else { panic!() };
        assert_eq!(**callee, ident("handWritten"));
        assert!(arguments[0].as_ident().unwrap().starts_with("handWritten_cps_"));
    }

    #[test]
    fn test_malformed_marker() {
        let arity = program(vec![expr_stmt(call(ident(CPS_MARKER), vec![ident("a"), ident("b")]))]);
        assert!(matches!(
            wrap(&arity),
            Err(WrapError::MalformedContinuationPrimitive(_))
        ));
        let not_a_name = program(vec![expr_stmt(call(ident(CPS_MARKER), vec![member(ident("o"), "f")]))]);
        assert!(matches!(
            wrap(&not_a_name),
            Err(WrapError::MalformedContinuationPrimitive(_))
        ));
        let empty = program(vec![expr_stmt(call(ident(CPS_MARKER), vec![]))]);
        assert!(wrap(&empty).is_err());
    }

    #[test]
    fn test_wrapper_shape() {
        let def = wrapper_definition("plus", "plus_cps_0");
        let Node::VariableDeclaration { declarations, .. } = &def else { panic!() };
        assert_eq!(declarations[0].id.name, "plus_cps_0");
        let Some(init) = declarations[0].init.as_deref() else { panic!() };
        let Node::FunctionExpression { params, .. } = init else { panic!() };
        assert_eq!(params.len(), 2);
        assert!(matches!(params[1], Node::RestElement { .. }));
    }
}
