//! CPS Transformation Pass
//!
//! Rewrites a direct-style program so that every intermediate result is handed
//! to an explicit continuation. Once every step goes through a continuation, the
//! runtime can suspend, replay or abandon the rest of the computation at each
//! `sample`/`factor` call.
//!
//! ## Transformation Rules
//!
//! 1. Atoms: `[[x]]_k` → `k(x)`; literals the same. A function literal gains a
//!    fresh leading continuation parameter and its body is transformed against it:
//!    `function(a) { body }` → `function(k1, a) { return [[body]]_k1; }`
//!
//! 2. Sequencing: `[[s1; rest]]_k` → `[[s1]]_{function(_) { return [[rest]]_k; }}`
//!
//! 3. Declarations: `[[var x = e]]_k` → `[[e]]_{function(x) { return k(undefined); }}`
//!
//! 4. Calls: callee then arguments, left to right, each bound to a temporary:
//!    `[[f(a, b)]]_k` → `[[f]]_{function(f1) { return [[a]]_{function(a2) { ... f1(k, a2, b3) }} }}`
//!
//! 5. Conditionals: the continuation is bound once and shared by both branches:
//!    `[[t ? c : a]]_k` → `(function(k1) { return [[t]]_{function(t2) { return t2 ? [[c]]_k1 : [[a]]_k1; }} })(k)`
//!
//! 6. Operators (unary, binary, array, member): operands go to temporaries, the
//!    operator itself is applied directly and the result is passed to `k`.
//!
//! 7. Return: `[[return e]]` → `[[e]]_kf` where `kf` is the enclosing function's
//!    continuation; whatever followed the return is dropped.

use thiserror::Error;

use crate::ast::build::{call, cond, expr_stmt, func_nodes, ident, lambda, ret, undefined};
use crate::ast::{Ident, Node, VariableDeclarator};
use crate::gensym::gensym;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CpsError {
    #[error("unsupported syntax: {0}")]
    UnsupportedSyntax(&'static str),
}

/// Transform `node` so that its result is delivered to `continuation`
pub fn cps(node: &Node, continuation: &Node) -> Result<Node, CpsError> {
    CPSTransformer::new(continuation.clone()).transform(node, continuation)
}

/// CPS transformation context
pub struct CPSTransformer {
    /// Continuations of the enclosing functions, innermost last.
    /// The bottom entry is the top-level continuation.
    return_conts: Vec<Node>,
}

impl CPSTransformer {
    pub fn new(top_continuation: Node) -> Self {
        Self {
            return_conts: vec![top_continuation],
        }
    }

    /// Transform any node against continuation `k`
    pub fn transform(&mut self, node: &Node, k: &Node) -> Result<Node, CpsError> {
        match node {
            Node::Program { body } => Ok(Node::Program {
                body: vec![expr_stmt(self.sequence(body, k)?)],
            }),

            Node::BlockStatement { body } => self.sequence(body, k),

            Node::ExpressionStatement { expression } => self.transform(expression, k),

            Node::ReturnStatement { argument } => {
                let return_k = self.current_return_cont();
                match argument {
                    Some(arg) => self.transform(arg, &return_k),
                    None => Ok(call(return_k, vec![undefined()])),
                }
            }

            Node::VariableDeclaration { declarations, .. } => self.declare(declarations, k),

            // Atoms: hand the value straight to the continuation
            Node::Identifier { .. } | Node::Literal { .. } | Node::FunctionExpression { .. } => {
                Ok(call(k.clone(), vec![self.transform_atomic(node)?]))
            }

            Node::CallExpression { callee, arguments } => {
                let mut operands: Vec<&Node> = Vec::with_capacity(arguments.len() + 1);
                operands.push(callee);
                for arg in arguments {
                    if let Node::SpreadElement { .. } = arg {
                        return Err(CpsError::UnsupportedSyntax(arg.kind()));
                    }
                    operands.push(arg);
                }
                let k = k.clone();
                self.bind_operands(&operands, "_f", move |mut temps| {
                    let f = temps.remove(0);
                    let mut args = Vec::with_capacity(temps.len() + 1);
                    args.push(k);
                    args.extend(temps);
                    call(f, args)
                })
            }

            Node::ConditionalExpression {
                test,
                consequent,
                alternate,
            } => {
                let shared_k = gensym("_k");
                let test_var = gensym("_t");
                let branches = cond(
                    ident(&test_var),
                    self.transform(consequent, &ident(&shared_k))?,
                    self.transform(alternate, &ident(&shared_k))?,
                );
                let on_test = lambda(&[test_var.as_str()], branches);
                let body = self.transform(test, &on_test)?;
                Ok(call(lambda(&[shared_k.as_str()], body), vec![k.clone()]))
            }

            Node::BinaryExpression {
                operator,
                left,
                right,
            } => {
                let (operator, k) = (operator.clone(), k.clone());
                self.bind_operands(&[&**left, &**right], "_b", move |mut temps| {
                    let right = temps.pop().unwrap_or_else(undefined);
                    let left = temps.pop().unwrap_or_else(undefined);
                    call(
                        k,
                        vec![Node::BinaryExpression {
                            operator,
                            left: Box::new(left),
                            right: Box::new(right),
                        }],
                    )
                })
            }

            Node::UnaryExpression {
                operator,
                argument,
                prefix,
            } => {
                let (operator, prefix, k) = (operator.clone(), *prefix, k.clone());
                self.bind_operands(&[&**argument], "_u", move |mut temps| {
                    let argument = temps.pop().unwrap_or_else(undefined);
                    call(
                        k,
                        vec![Node::UnaryExpression {
                            operator,
                            argument: Box::new(argument),
                            prefix,
                        }],
                    )
                })
            }

            Node::ArrayExpression { elements } => {
                let operands: Vec<&Node> = elements.iter().collect();
                if let Some(spread) = operands.iter().find(|e| matches!(e, Node::SpreadElement { .. })) {
                    return Err(CpsError::UnsupportedSyntax(spread.kind()));
                }
                let k = k.clone();
                self.bind_operands(&operands, "_e", move |temps| {
                    call(k, vec![Node::ArrayExpression { elements: temps }])
                })
            }

            Node::MemberExpression {
                object,
                property,
                computed,
            } => {
                let k = k.clone();
                if *computed {
                    self.bind_operands(&[&**object, &**property], "_m", move |mut temps| {
                        let key = temps.pop().unwrap_or_else(undefined);
                        let object = temps.pop().unwrap_or_else(undefined);
                        call(
                            k,
                            vec![Node::MemberExpression {
                                object: Box::new(object),
                                property: Box::new(key),
                                computed: true,
                            }],
                        )
                    })
                } else {
                    // Non-computed: the property is a name, not an expression
                    let property = property.clone();
                    self.bind_operands(&[&**object], "_m", move |mut temps| {
                        let object = temps.pop().unwrap_or_else(undefined);
                        call(
                            k,
                            vec![Node::MemberExpression {
                                object: Box::new(object),
                                property,
                                computed: false,
                            }],
                        )
                    })
                }
            }

            Node::RestElement { .. }
            | Node::SpreadElement { .. }
            | Node::IfStatement { .. }
            | Node::LogicalExpression { .. }
            | Node::AssignmentExpression { .. }
            | Node::TryStatement { .. }
            | Node::ThrowStatement { .. }
            | Node::Unmodelled { .. } => Err(CpsError::UnsupportedSyntax(node.kind())),
        }
    }

    /// Convert an atomic expression to its CPS value form
    fn transform_atomic(&mut self, node: &Node) -> Result<Node, CpsError> {
        match node {
            Node::Identifier { .. } | Node::Literal { .. } => Ok(node.clone()),
            Node::FunctionExpression { id, params, body } => {
                self.transform_function(id.clone(), params, body)
            }
            other => Err(CpsError::UnsupportedSyntax(other.kind())),
        }
    }

    fn transform_function(
        &mut self,
        id: Option<Ident>,
        params: &[Node],
        body: &Node,
    ) -> Result<Node, CpsError> {
        let fn_k = gensym("_k");
        let mut new_params = Vec::with_capacity(params.len() + 1);
        new_params.push(ident(&fn_k));
        new_params.extend(params.iter().cloned());

        self.return_conts.push(ident(&fn_k));
        let cps_body = self.transform(body, &ident(&fn_k));
        self.return_conts.pop();

        Ok(func_nodes(id, new_params, vec![ret(cps_body?)]))
    }

    /// Thread a statement list so each statement continues with the rest
    fn sequence(&mut self, statements: &[Node], k: &Node) -> Result<Node, CpsError> {
        match statements {
            [] => Ok(call(k.clone(), vec![undefined()])),
            [only] => self.transform(only, k),
            [first @ Node::ReturnStatement { .. }, ..] => self.transform(first, k),
            [first, rest @ ..] => {
                let ignored = gensym("_s");
                let rest_k = lambda(&[ignored.as_str()], self.sequence(rest, k)?);
                self.transform(first, &rest_k)
            }
        }
    }

    /// Bind each declarator in order, then continue with `undefined`
    fn declare(&mut self, declarations: &[VariableDeclarator], k: &Node) -> Result<Node, CpsError> {
        let mut rest = call(k.clone(), vec![undefined()]);
        for decl in declarations.iter().rev() {
            let name = decl.id.name.as_str();
            let init = match decl.init.as_deref() {
                // An anonymous function takes the declared name so it can recurse
                Some(Node::FunctionExpression { id: None, params, body }) => {
                    Node::FunctionExpression {
                        id: Some(Ident::new(name)),
                        params: params.clone(),
                        body: body.clone(),
                    }
                }
                Some(init) => init.clone(),
                None => undefined(),
            };
            rest = self.transform(&init, &lambda(&[name], rest))?;
        }
        Ok(rest)
    }

    /// Evaluate `operands` left to right into fresh temporaries and build the
    /// innermost expression from them
    fn bind_operands<F>(&mut self, operands: &[&Node], prefix: &str, build: F) -> Result<Node, CpsError>
    where
        F: FnOnce(Vec<Node>) -> Node,
    {
        let temps: Vec<String> = operands.iter().map(|_| gensym(prefix)).collect();
        let mut body = build(temps.iter().map(ident).collect());
        for (operand, temp) in operands.iter().zip(&temps).rev() {
            body = self.transform(operand, &lambda(&[temp.as_str()], body))?;
        }
        Ok(body)
    }

    fn current_return_cont(&self) -> Node {
        self.return_conts.last().cloned().unwrap_or_else(|| ident("topK"))
    }
}
