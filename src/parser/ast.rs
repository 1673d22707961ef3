/// Name given to the implicit zero-argument function that wraps a bare
/// top-level expression.
pub const ANON_FUNCTION: &str = "__anon_expr";

/// Expression nodes. A closed set: IR generation matches exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal.
    Number(f64),

    /// Variable reference.
    Variable(String),

    /// Prefix application of a user-defined unary operator.
    Unary { op: char, operand: Box<Expr> },

    /// Binary operator application, including assignment (`=`).
    Binary {
        op: char,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// Call of a named function.
    Call { callee: String, args: Vec<Expr> },

    /// `if cond then a else b` — an expression, both branches required.
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },

    /// `for name = start, end [, step] in body` — evaluates to 0.
    For {
        var: String,
        start: Box<Expr>,
        end: Box<Expr>,
        step: Option<Box<Expr>>,
        body: Box<Expr>,
    },

    /// `var a [= init], b [= init] in body` — lexically scoped bindings.
    Var {
        bindings: Vec<(String, Option<Expr>)>,
        body: Box<Expr>,
    },
}

/// What kind of callable a prototype declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrototypeKind {
    Plain,
    Unary,
    Binary,
}

/// A callable's name, parameter list, and operator information.
///
/// For operator prototypes the name is the keyword text concatenated with
/// the operator symbol (`binary>`, `unary!`), which is also the symbol the
/// compiled function is registered under.
#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<String>,
    pub kind: PrototypeKind,
    pub precedence: u32,
}

impl Prototype {
    /// Create a plain (non-operator) prototype.
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            name: name.into(),
            params,
            kind: PrototypeKind::Plain,
            precedence: 0,
        }
    }

    /// Whether this prototype declares a user operator.
    pub fn is_operator(&self) -> bool {
        self.kind != PrototypeKind::Plain
    }

    /// The declared operator symbol, if any.
    pub fn operator_symbol(&self) -> Option<char> {
        let suffix = match self.kind {
            PrototypeKind::Plain => return None,
            PrototypeKind::Binary => self.name.strip_prefix("binary"),
            PrototypeKind::Unary => self.name.strip_prefix("unary"),
        };
        suffix.and_then(|s| s.chars().next())
    }
}

/// A function definition: prototype plus a single expression body.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionAst {
    pub proto: Prototype,
    pub body: Expr,
}

/// One parsed top-level statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `def <prototype> <expr> ;`
    Definition(FunctionAst),
    /// `extern <prototype> ;`
    Extern(Prototype),
    /// `<expr> ;` wrapped in an anonymous zero-argument function.
    TopLevel(FunctionAst),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_symbol() {
        let proto = Prototype {
            name: "binary>".to_string(),
            params: vec!["a".to_string(), "b".to_string()],
            kind: PrototypeKind::Binary,
            precedence: 10,
        };
        assert_eq!(proto.operator_symbol(), Some('>'));
        assert!(proto.is_operator());
    }

    #[test]
    fn test_plain_prototype_has_no_symbol() {
        // A plain function that happens to start with "unary" is not an
        // operator.
        let proto = Prototype::new("unaryish", vec![]);
        assert_eq!(proto.operator_symbol(), None);
        assert!(!proto.is_operator());
    }
}
