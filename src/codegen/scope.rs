//! Scope resolution with JavaScript `var` semantics
//!
//! Function parameters, a function expression's own name, and every `var`
//! declared anywhere in a function body are visible throughout that function.
//! A catch clause binds its parameter for the clause body only. The program
//! body is the outermost scope.

use std::collections::HashSet;
use std::convert::Infallible;

use indexmap::IndexSet;

use crate::ast::{CatchClause, Ident, Node, VariableDeclarator};

/// Visitor hooks for [`rewrite_references`]
pub trait ReferenceVisitor {
    type Error;

    /// Called for each identifier reference no enclosing scope binds.
    /// Returning a name renames that occurrence.
    fn free_reference(&mut self, name: &str) -> Result<Option<String>, Self::Error>;

    /// Called for each call before its parts are visited; returning a node
    /// replaces the whole call.
    fn intercept_call(&mut self, _callee: &Node, _arguments: &[Node]) -> Result<Option<Node>, Self::Error> {
        Ok(None)
    }
}

/// Collect the names a statement list binds for the enclosing function
pub fn hoisted_names(statements: &[Node], out: &mut HashSet<String>) {
    for stmt in statements {
        hoist_statement(stmt, out);
    }
}

fn hoist_statement(stmt: &Node, out: &mut HashSet<String>) {
    match stmt {
        Node::VariableDeclaration { declarations, .. } => {
            out.extend(declarations.iter().map(|d| d.id.name.clone()));
        }
        Node::Program { body } | Node::BlockStatement { body } => hoisted_names(body, out),
        Node::IfStatement {
            consequent,
            alternate,
            ..
        } => {
            hoist_statement(consequent, out);
            if let Some(alt) = alternate {
                hoist_statement(alt, out);
            }
        }
        Node::TryStatement {
            block,
            handler,
            finalizer,
        } => {
            hoist_statement(block, out);
            if let Some(handler) = handler {
                hoist_statement(&handler.body, out);
            }
            if let Some(finalizer) = finalizer {
                hoist_statement(finalizer, out);
            }
        }
        _ => {}
    }
}

/// Names bound for the whole extent of a function
pub fn function_bindings(id: Option<&Ident>, params: &[Node], body: &Node) -> HashSet<String> {
    let mut names = HashSet::new();
    if let Some(id) = id {
        names.insert(id.name.clone());
    }
    for param in params {
        match param {
            Node::Identifier { name } => {
                names.insert(name.clone());
            }
            Node::RestElement { argument } => {
                if let Some(name) = argument.as_ident() {
                    names.insert(name.to_string());
                }
            }
            _ => {}
        }
    }
    hoist_statement(body, &mut names);
    names
}

/// Stack of active scopes, innermost last
#[derive(Debug, Default)]
pub struct ScopeChain {
    scopes: Vec<HashSet<String>>,
}

impl ScopeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, names: HashSet<String>) {
        self.scopes.push(names);
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains(name))
    }
}

/// Rebuild `node`, letting `visitor` rename free references and replace calls
pub fn rewrite_references<V: ReferenceVisitor>(node: &Node, visitor: &mut V) -> Result<Node, V::Error> {
    Rewriter {
        scopes: ScopeChain::new(),
        visitor,
    }
    .rewrite(node)
}

/// Free identifiers of a program in first-reference order
pub fn free_identifiers(program: &Node) -> IndexSet<String> {
    struct Collector(IndexSet<String>);

    impl ReferenceVisitor for Collector {
        type Error = Infallible;

        fn free_reference(&mut self, name: &str) -> Result<Option<String>, Infallible> {
            self.0.insert(name.to_string());
            Ok(None)
        }
    }

    let mut collector = Collector(IndexSet::new());
    match rewrite_references(program, &mut collector) {
        Ok(_) => collector.0,
        Err(never) => match never {},
    }
}

struct Rewriter<'v, V> {
    scopes: ScopeChain,
    visitor: &'v mut V,
}

impl<V: ReferenceVisitor> Rewriter<'_, V> {
    fn rewrite(&mut self, node: &Node) -> Result<Node, V::Error> {
        Ok(match node {
            Node::Program { body } => {
                let mut names = HashSet::new();
                hoisted_names(body, &mut names);
                self.scopes.push(names);
                let body = self.rewrite_all(body);
                self.scopes.pop();
                Node::Program { body: body? }
            }
            Node::BlockStatement { body } => Node::BlockStatement {
                body: self.rewrite_all(body)?,
            },
            Node::ExpressionStatement { expression } => Node::ExpressionStatement {
                expression: self.boxed(expression)?,
            },
            Node::ReturnStatement { argument } => Node::ReturnStatement {
                argument: self.optional(argument)?,
            },
            Node::VariableDeclaration { declarations, kind } => Node::VariableDeclaration {
                declarations: declarations
                    .iter()
                    .map(|d| {
                        Ok(VariableDeclarator {
                            id: d.id.clone(),
                            init: self.optional(&d.init)?,
                        })
                    })
                    .collect::<Result<_, V::Error>>()?,
                kind: kind.clone(),
            },
            Node::CallExpression { callee, arguments } => {
                if let Some(replacement) = self.visitor.intercept_call(callee, arguments)? {
                    return Ok(replacement);
                }
                Node::CallExpression {
                    callee: self.boxed(callee)?,
                    arguments: self.rewrite_all(arguments)?,
                }
            }
            Node::ConditionalExpression {
                test,
                consequent,
                alternate,
            } => Node::ConditionalExpression {
                test: self.boxed(test)?,
                consequent: self.boxed(consequent)?,
                alternate: self.boxed(alternate)?,
            },
            Node::BinaryExpression {
                operator,
                left,
                right,
            } => Node::BinaryExpression {
                operator: operator.clone(),
                left: self.boxed(left)?,
                right: self.boxed(right)?,
            },
            Node::LogicalExpression {
                operator,
                left,
                right,
            } => Node::LogicalExpression {
                operator: operator.clone(),
                left: self.boxed(left)?,
                right: self.boxed(right)?,
            },
            Node::AssignmentExpression {
                operator,
                left,
                right,
            } => Node::AssignmentExpression {
                operator: operator.clone(),
                left: self.boxed(left)?,
                right: self.boxed(right)?,
            },
            Node::UnaryExpression {
                operator,
                argument,
                prefix,
            } => Node::UnaryExpression {
                operator: operator.clone(),
                argument: self.boxed(argument)?,
                prefix: *prefix,
            },
            Node::MemberExpression {
                object,
                property,
                computed,
            } => Node::MemberExpression {
                object: self.boxed(object)?,
                property: if *computed {
                    self.boxed(property)?
                } else {
                    property.clone()
                },
                computed: *computed,
            },
            Node::ArrayExpression { elements } => Node::ArrayExpression {
                elements: self.rewrite_all(elements)?,
            },
            Node::SpreadElement { argument } => Node::SpreadElement {
                argument: self.boxed(argument)?,
            },
            // Binding position, only ever a parameter
            Node::RestElement { .. } => node.clone(),
            Node::Identifier { name } => {
                if self.scopes.is_bound(name) {
                    node.clone()
                } else {
                    match self.visitor.free_reference(name)? {
                        Some(renamed) => Node::Identifier { name: renamed },
                        None => node.clone(),
                    }
                }
            }
            Node::Literal { .. } | Node::Unmodelled { .. } => node.clone(),
            Node::FunctionExpression { id, params, body } => {
                self.scopes.push(function_bindings(id.as_ref(), params, body));
                let new_body = self.rewrite(body);
                self.scopes.pop();
                Node::FunctionExpression {
                    id: id.clone(),
                    params: params.clone(),
                    body: new_body?.into(),
                }
            }
            Node::IfStatement {
                test,
                consequent,
                alternate,
            } => Node::IfStatement {
                test: self.boxed(test)?,
                consequent: self.boxed(consequent)?,
                alternate: self.optional(alternate)?,
            },
            Node::TryStatement {
                block,
                handler,
                finalizer,
            } => {
                let handler = match handler {
                    Some(clause) => {
                        let mut names = HashSet::new();
                        if let Some(param) = &clause.param {
                            names.insert(param.name.clone());
                        }
                        self.scopes.push(names);
                        let body = self.boxed(&clause.body);
                        self.scopes.pop();
                        Some(CatchClause {
                            param: clause.param.clone(),
                            body: body?,
                        })
                    }
                    None => None,
                };
                Node::TryStatement {
                    block: self.boxed(block)?,
                    handler,
                    finalizer: self.optional(finalizer)?,
                }
            }
            Node::ThrowStatement { argument } => Node::ThrowStatement {
                argument: self.boxed(argument)?,
            },
        })
    }

    fn rewrite_all(&mut self, nodes: &[Node]) -> Result<Vec<Node>, V::Error> {
        nodes.iter().map(|n| self.rewrite(n)).collect()
    }

    fn boxed(&mut self, node: &Node) -> Result<Box<Node>, V::Error> {
        self.rewrite(node).map(Box::new)
    }

    fn optional(&mut self, node: &Option<Box<Node>>) -> Result<Option<Box<Node>>, V::Error> {
        node.as_deref().map(|n| self.boxed(n)).transpose()
    }
}
