//! Abstract Syntax Tree for the direct-style input and the CPS output
//!
//! Nodes follow the ESTree naming used by JavaScript parsers, so the JSON an
//! external parser produces deserializes straight into [`Node`] and the CPS
//! output serializes back into something a JavaScript code generator accepts.

use std::fmt;
use std::rc::Rc;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A bare identifier in binding position (declarator ids, function names, catch params)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Identifier")]
pub struct Ident {
    pub name: String,
}

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// One `name = init` entry of a variable declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct VariableDeclarator {
    pub id: Ident,
    #[serde(default)]
    pub init: Option<Box<Node>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct CatchClause {
    #[serde(default)]
    pub param: Option<Ident>,
    pub body: Box<Node>,
}

/// Literal payload. ESTree stores it untyped under `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Null => write!(f, "null"),
            LiteralValue::Bool(b) => write!(f, "{}", b),
            LiteralValue::Number(n) => write!(f, "{}", n),
            LiteralValue::String(s) => write!(f, "{:?}", s),
        }
    }
}

fn default_var_kind() -> String {
    "var".to_string()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self", tag = "type")]
pub enum Node {
    // Statements
    Program {
        body: Vec<Node>,
    },
    BlockStatement {
        body: Vec<Node>,
    },
    ExpressionStatement {
        expression: Box<Node>,
    },
    ReturnStatement {
        #[serde(default)]
        argument: Option<Box<Node>>,
    },
    VariableDeclaration {
        declarations: Vec<VariableDeclarator>,
        #[serde(default = "default_var_kind")]
        kind: String,
    },

    // Expressions
    CallExpression {
        callee: Box<Node>,
        arguments: Vec<Node>,
    },
    ConditionalExpression {
        test: Box<Node>,
        consequent: Box<Node>,
        alternate: Box<Node>,
    },
    BinaryExpression {
        operator: String,
        left: Box<Node>,
        right: Box<Node>,
    },
    UnaryExpression {
        operator: String,
        argument: Box<Node>,
        #[serde(default = "default_true")]
        prefix: bool,
    },
    MemberExpression {
        object: Box<Node>,
        property: Box<Node>,
        #[serde(default)]
        computed: bool,
    },
    ArrayExpression {
        elements: Vec<Node>,
    },
    Identifier {
        name: String,
    },
    Literal {
        value: LiteralValue,
    },
    FunctionExpression {
        #[serde(default)]
        id: Option<Ident>,
        params: Vec<Node>,
        body: Rc<Node>,
    },

    // Variadic forms, only produced for primitive wrappers
    RestElement {
        argument: Box<Node>,
    },
    SpreadElement {
        argument: Box<Node>,
    },

    // Parsed but not CPS-transformable
    IfStatement {
        test: Box<Node>,
        consequent: Box<Node>,
        #[serde(default)]
        alternate: Option<Box<Node>>,
    },
    LogicalExpression {
        operator: String,
        left: Box<Node>,
        right: Box<Node>,
    },
    AssignmentExpression {
        operator: String,
        left: Box<Node>,
        right: Box<Node>,
    },
    TryStatement {
        block: Box<Node>,
        #[serde(default)]
        handler: Option<CatchClause>,
        #[serde(default)]
        finalizer: Option<Box<Node>>,
    },
    ThrowStatement {
        argument: Box<Node>,
    },

    /// Any other ESTree node kind; only its type tag is kept
    #[serde(skip)]
    Unmodelled {
        kind: &'static str,
    },
}

/// ESTree node types a parser may emit that [`Node`] does not model
const UNMODELLED_KINDS: &[&str] = &[
    "ArrayPattern",
    "ArrowFunctionExpression",
    "AssignmentPattern",
    "AwaitExpression",
    "BreakStatement",
    "ChainExpression",
    "ClassBody",
    "ClassDeclaration",
    "ClassExpression",
    "ContinueStatement",
    "DebuggerStatement",
    "DoWhileStatement",
    "EmptyStatement",
    "ExportAllDeclaration",
    "ExportDefaultDeclaration",
    "ExportNamedDeclaration",
    "ExportSpecifier",
    "ForInStatement",
    "ForOfStatement",
    "ForStatement",
    "FunctionDeclaration",
    "Import",
    "ImportDeclaration",
    "ImportDefaultSpecifier",
    "ImportExpression",
    "ImportNamespaceSpecifier",
    "ImportSpecifier",
    "LabeledStatement",
    "MetaProperty",
    "MethodDefinition",
    "NewExpression",
    "ObjectExpression",
    "ObjectPattern",
    "PrivateIdentifier",
    "Property",
    "PropertyDefinition",
    "SequenceExpression",
    "StaticBlock",
    "Super",
    "SwitchCase",
    "SwitchStatement",
    "TaggedTemplateExpression",
    "TemplateElement",
    "TemplateLiteral",
    "ThisExpression",
    "UpdateExpression",
    "WhileStatement",
    "WithStatement",
    "YieldExpression",
];

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        let tag = raw.get("type").and_then(serde_json::Value::as_str);
        if let Some(kind) = tag.and_then(|t| UNMODELLED_KINDS.iter().copied().find(|k| *k == t)) {
            return Ok(Node::Unmodelled { kind });
        }
        Node::deserialize(raw).map_err(D::Error::custom)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Unmodelled { kind } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", kind)?;
                map.end()
            }
            other => Node::serialize(other, serializer),
        }
    }
}

impl Node {
    /// ESTree type name of this node
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Program { .. } => "Program",
            Node::BlockStatement { .. } => "BlockStatement",
            Node::ExpressionStatement { .. } => "ExpressionStatement",
            Node::ReturnStatement { .. } => "ReturnStatement",
            Node::VariableDeclaration { .. } => "VariableDeclaration",
            Node::CallExpression { .. } => "CallExpression",
            Node::ConditionalExpression { .. } => "ConditionalExpression",
            Node::BinaryExpression { .. } => "BinaryExpression",
            Node::UnaryExpression { .. } => "UnaryExpression",
            Node::MemberExpression { .. } => "MemberExpression",
            Node::ArrayExpression { .. } => "ArrayExpression",
            Node::Identifier { .. } => "Identifier",
            Node::Literal { .. } => "Literal",
            Node::FunctionExpression { .. } => "FunctionExpression",
            Node::RestElement { .. } => "RestElement",
            Node::SpreadElement { .. } => "SpreadElement",
            Node::IfStatement { .. } => "IfStatement",
            Node::LogicalExpression { .. } => "LogicalExpression",
            Node::AssignmentExpression { .. } => "AssignmentExpression",
            Node::TryStatement { .. } => "TryStatement",
            Node::ThrowStatement { .. } => "ThrowStatement",
            Node::Unmodelled { kind } => *kind,
        }
    }

    /// Name of an `Identifier` node
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Node::Identifier { name } => Some(name),
            _ => None,
        }
    }

    /// Parse an ESTree JSON document
    pub fn from_json(source: &str) -> Result<Node, serde_json::Error> {
        serde_json::from_str(source)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Constructors for hand-built trees (tests, generated wrappers, CPS output)
pub mod build {
    use std::rc::Rc;

    use super::{Ident, LiteralValue, Node, VariableDeclarator};

    pub fn ident(name: impl Into<String>) -> Node {
        Node::Identifier { name: name.into() }
    }

    pub fn num(n: f64) -> Node {
        Node::Literal {
            value: LiteralValue::Number(n),
        }
    }

    pub fn string(s: impl Into<String>) -> Node {
        Node::Literal {
            value: LiteralValue::String(s.into()),
        }
    }

    pub fn boolean(b: bool) -> Node {
        Node::Literal {
            value: LiteralValue::Bool(b),
        }
    }

    pub fn null() -> Node {
        Node::Literal {
            value: LiteralValue::Null,
        }
    }

    /// The `undefined` placeholder
    pub fn undefined() -> Node {
        ident("undefined")
    }

    pub fn call(callee: Node, arguments: Vec<Node>) -> Node {
        Node::CallExpression {
            callee: Box::new(callee),
            arguments,
        }
    }

    /// `function(params) { body }`
    pub fn func(params: &[&str], body: Vec<Node>) -> Node {
        func_nodes(None, params.iter().map(|p| ident(*p)).collect(), body)
    }

    /// `function name(params) { body }`
    pub fn named_func(name: &str, params: &[&str], body: Vec<Node>) -> Node {
        func_nodes(
            Some(Ident::new(name)),
            params.iter().map(|p| ident(*p)).collect(),
            body,
        )
    }

    pub fn func_nodes(id: Option<Ident>, params: Vec<Node>, body: Vec<Node>) -> Node {
        Node::FunctionExpression {
            id,
            params,
            body: Rc::new(block(body)),
        }
    }

    /// A function whose body is `return expr;`
    pub fn lambda(params: &[&str], expr: Node) -> Node {
        func(params, vec![ret(expr)])
    }

    pub fn ret(argument: Node) -> Node {
        Node::ReturnStatement {
            argument: Some(Box::new(argument)),
        }
    }

    pub fn expr_stmt(expression: Node) -> Node {
        Node::ExpressionStatement {
            expression: Box::new(expression),
        }
    }

    pub fn var(name: &str, init: Node) -> Node {
        Node::VariableDeclaration {
            declarations: vec![VariableDeclarator {
                id: Ident::new(name),
                init: Some(Box::new(init)),
            }],
            kind: "var".to_string(),
        }
    }

    pub fn block(body: Vec<Node>) -> Node {
        Node::BlockStatement { body }
    }

    pub fn program(body: Vec<Node>) -> Node {
        Node::Program { body }
    }

    pub fn cond(test: Node, consequent: Node, alternate: Node) -> Node {
        Node::ConditionalExpression {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        }
    }

    pub fn binary(operator: &str, left: Node, right: Node) -> Node {
        Node::BinaryExpression {
            operator: operator.to_string(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(operator: &str, argument: Node) -> Node {
        Node::UnaryExpression {
            operator: operator.to_string(),
            argument: Box::new(argument),
            prefix: true,
        }
    }

    /// `object.property`
    pub fn member(object: Node, property: &str) -> Node {
        Node::MemberExpression {
            object: Box::new(object),
            property: Box::new(ident(property)),
            computed: false,
        }
    }

    /// `object[key]`
    pub fn index(object: Node, key: Node) -> Node {
        Node::MemberExpression {
            object: Box::new(object),
            property: Box::new(key),
            computed: true,
        }
    }

    pub fn array(elements: Vec<Node>) -> Node {
        Node::ArrayExpression { elements }
    }

    pub fn rest(name: &str) -> Node {
        Node::RestElement {
            argument: Box::new(ident(name)),
        }
    }

    pub fn spread(argument: Node) -> Node {
        Node::SpreadElement {
            argument: Box::new(argument),
        }
    }
}
