// SnapTrace - Snippet Execution Tracer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use snaptrace_common::SourceRange;

/// A name together with where it is written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{name}")]
pub struct Ident {
    /// The identifier text, without a leading `@`.
    pub name: String,
    /// Where the identifier is written.
    pub src: SourceRange,
}

impl Ident {
    /// Creates an identifier read from the document.
    pub fn new(name: impl Into<String>, src: SourceRange) -> Self {
        Self { name: name.into(), src }
    }

    /// An identifier that does not come from the document.
    pub fn synthesized(name: impl Into<String>, at: usize) -> Self {
        Self { name: name.into(), src: SourceRange::empty_at(at) }
    }
}

/// A type as written in the source. Types are never resolved, only carried.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{text}")]
pub struct TypeName {
    /// Normalized text, e.g. `List<int>[]`.
    pub text: String,
    /// Where the type is written.
    pub src: SourceRange,
}

impl TypeName {
    /// Returns `true` for the implicitly typed `var`.
    pub fn is_var(&self) -> bool {
        self.text == "var"
    }
}

/// Abstracted expression AST node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expr {
    /// The source range of the expression.
    pub src: SourceRange,
    /// The kind of expression.
    pub kind: ExprKind,
}

impl Expr {
    /// Creates an expression read from the document.
    pub fn new(src: SourceRange, kind: ExprKind) -> Self {
        Self { src, kind }
    }

    /// An expression that does not come from the document, anchored at `at`.
    pub fn synthesized(at: usize, kind: ExprKind) -> Self {
        Self { src: SourceRange::empty_at(at), kind }
    }

    /// Strips any number of enclosing parentheses.
    pub fn unparenthesized(&self) -> &Self {
        match &self.kind {
            ExprKind::Paren(inner) => inner.unparenthesized(),
            _ => self,
        }
    }

    /// Direct subexpressions in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Literal(_)
            | ExprKind::Ident(_)
            | ExprKind::This
            | ExprKind::Declaration { .. } => vec![],
            ExprKind::Interpolated { holes, .. } => holes.iter().collect(),
            ExprKind::Member { target, .. } => vec![&**target],
            ExprKind::Call { callee, args } => {
                std::iter::once(&**callee).chain(args.iter().map(|a| &a.expr)).collect()
            }
            ExprKind::Index { target, args } => std::iter::once(&**target).chain(args).collect(),
            ExprKind::Unary { operand, .. } => vec![&**operand],
            ExprKind::Binary { lhs, rhs, .. } => vec![&**lhs, &**rhs],
            ExprKind::Assign { target, value, .. } => vec![&**target, &**value],
            ExprKind::Conditional { cond, then, otherwise } => {
                vec![&**cond, &**then, &**otherwise]
            }
            ExprKind::Is { expr, pattern } => match pattern {
                Pattern::Constant(constant) => vec![&**expr, &**constant],
                Pattern::Type { .. } => vec![&**expr],
            },
            ExprKind::As { expr, .. } | ExprKind::Cast { expr, .. } => vec![&**expr],
            ExprKind::New { args, initializer, .. } => args
                .iter()
                .flatten()
                .map(|a| &a.expr)
                .chain(initializer.iter().flatten())
                .collect(),
            ExprKind::NewArray { sizes, initializer, .. } => {
                sizes.iter().chain(initializer.iter().flatten()).collect()
            }
            ExprKind::Lambda { body, .. } => vec![&**body],
            ExprKind::Query(query) => query
                .clauses
                .iter()
                .flat_map(|clause| match clause {
                    QueryClause::From { source, .. } => vec![source],
                    QueryClause::Let { value, .. } => vec![value],
                    QueryClause::Where(cond) => vec![cond],
                    QueryClause::OrderBy(keys) => keys.iter().map(|(key, _)| key).collect(),
                })
                .chain(std::iter::once(&*query.select))
                .collect(),
            ExprKind::Tuple(items) => items.iter().collect(),
            ExprKind::Paren(inner) => vec![&**inner],
        }
    }

    /// The constant value of a `true`/`false` literal, if this is one.
    pub fn as_bool_literal(&self) -> Option<bool> {
        match &self.unparenthesized().kind {
            ExprKind::Literal(Literal { kind: LiteralKind::Bool(value), .. }) => Some(*value),
            _ => None,
        }
    }
}

/// The different kinds of expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExprKind {
    /// A literal value.
    Literal(Literal),
    /// `$"..."` with the expressions of its holes.
    Interpolated {
        /// The literal text, holes included.
        text: String,
        /// The expressions of the holes, left to right.
        holes: Vec<Expr>,
    },
    /// A simple name.
    Ident(Ident),
    /// `this`.
    This,
    /// `target.name`.
    Member {
        /// The accessed object.
        target: Box<Expr>,
        /// The accessed member.
        name: Ident,
    },
    /// `callee(args)`.
    Call {
        /// The invoked expression.
        callee: Box<Expr>,
        /// The arguments.
        args: Vec<Argument>,
    },
    /// `target[args]`.
    Index {
        /// The indexed expression.
        target: Box<Expr>,
        /// The indices.
        args: Vec<Expr>,
    },
    /// A prefix or postfix unary operation.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// A simple or compound assignment.
    Assign {
        /// The assignment operator.
        op: AssignOp,
        /// The assigned location.
        target: Box<Expr>,
        /// The assigned value.
        value: Box<Expr>,
    },
    /// `cond ? then : otherwise`.
    Conditional {
        /// The condition.
        cond: Box<Expr>,
        /// Value when the condition holds.
        then: Box<Expr>,
        /// Value otherwise.
        otherwise: Box<Expr>,
    },
    /// `expr is pattern`.
    Is {
        /// The tested expression.
        expr: Box<Expr>,
        /// The pattern it is matched against.
        pattern: Pattern,
    },
    /// `expr as ty`.
    As {
        /// The converted expression.
        expr: Box<Expr>,
        /// The target type.
        ty: TypeName,
    },
    /// `(ty)expr`.
    Cast {
        /// The target type.
        ty: TypeName,
        /// The converted expression.
        expr: Box<Expr>,
    },
    /// `new T(args) { init }`, `new(args)`, `new T { init }`.
    New {
        /// The constructed type, absent for target-typed `new`.
        ty: Option<TypeName>,
        /// Constructor arguments, absent when only an initializer is given.
        args: Option<Vec<Argument>>,
        /// Object or collection initializer entries.
        initializer: Option<Vec<Expr>>,
    },
    /// `new T[n]`, `new T[] { .. }`, `new[] { .. }`.
    NewArray {
        /// The element type, absent for `new[]`.
        elem: Option<TypeName>,
        /// Dimension sizes.
        sizes: Vec<Expr>,
        /// Array initializer entries.
        initializer: Option<Vec<Expr>>,
    },
    /// `x => body` or `(x, y) => body`.
    Lambda {
        /// The parameter names.
        params: Vec<Ident>,
        /// The body; block bodies are not modelled.
        body: Box<Expr>,
    },
    /// A query expression.
    Query(QueryExpr),
    /// `(a, b, ..)`.
    Tuple(Vec<Expr>),
    /// `(expr)`.
    Paren(Box<Expr>),
    /// `var x` / `T x` in argument position, only valid after `out`.
    Declaration {
        /// The declared type.
        ty: TypeName,
        /// The declared variable.
        name: Ident,
    },
}

/// Raw literal text plus its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Literal {
    /// The literal classification.
    pub kind: LiteralKind,
    /// The literal exactly as written.
    pub text: String,
}

impl Literal {
    /// A regular string literal holding `value`, escaped for the target language.
    pub fn string(value: &str) -> Self {
        let mut text = String::with_capacity(value.len() + 2);
        text.push('"');
        for c in value.chars() {
            match c {
                '\\' => text.push_str("\\\\"),
                '"' => text.push_str("\\\""),
                '\n' => text.push_str("\\n"),
                '\r' => text.push_str("\\r"),
                c => text.push(c),
            }
        }
        text.push('"');
        Self { kind: LiteralKind::String, text }
    }
}

/// Classification of a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteralKind {
    /// Integer or real number, any suffix.
    Number,
    /// Regular or verbatim string.
    String,
    /// Character literal.
    Char,
    /// `true` or `false`.
    Bool(bool),
    /// `null`.
    Null,
}

/// Passing mode of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgModifier {
    /// `out`
    Out,
    /// `ref`
    Ref,
    /// `in`
    In,
}

/// A call argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    /// `out`, `ref` or `in`, if given.
    pub modifier: Option<ArgModifier>,
    /// The argument expression.
    pub expr: Expr,
}

impl Argument {
    /// A by-value argument.
    pub fn plain(expr: Expr) -> Self {
        Self { modifier: None, expr }
    }
}

/// The right-hand side of an `is` test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pattern {
    /// `T`, `T x` or `var x`.
    Type {
        /// The tested type.
        ty: TypeName,
        /// The declared variable, if any.
        binding: Option<Ident>,
    },
    /// `null`, `0`, `"text"`.
    Constant(Box<Expr>),
}

impl Pattern {
    /// The variable the pattern declares, if any.
    pub fn binding(&self) -> Option<&Ident> {
        match self {
            Self::Type { binding, .. } => binding.as_ref(),
            Self::Constant(_) => None,
        }
    }
}

/// `from x in source [where ..|let ..|orderby ..|from ..]* select e`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryExpr {
    /// Clauses in source order, starting with the leading `from`.
    pub clauses: Vec<QueryClause>,
    /// The projected expression.
    pub select: Box<Expr>,
}

/// One clause of a query body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryClause {
    /// `from var in source`.
    From {
        /// The range variable.
        var: Ident,
        /// The enumerated sequence.
        source: Expr,
    },
    /// `let var = value`.
    Let {
        /// The introduced variable.
        var: Ident,
        /// Its value.
        value: Expr,
    },
    /// `where cond`.
    Where(Expr),
    /// `orderby key [descending], ..`, with `true` for descending keys.
    OrderBy(Vec<(Expr, bool)>),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum UnaryOp {
    /// `!`
    #[display("!")]
    Not,
    /// `-`
    #[display("-")]
    Neg,
    /// `+`
    #[display("+")]
    Plus,
    /// `~`
    #[display("~")]
    BitNot,
    /// Prefix `++`
    #[display("++")]
    PreInc,
    /// Prefix `--`
    #[display("--")]
    PreDec,
    /// Postfix `++`
    #[display("++")]
    PostInc,
    /// Postfix `--`
    #[display("--")]
    PostDec,
    /// `await`
    #[display("await ")]
    Await,
}

impl UnaryOp {
    /// Whether the operator is written after its operand.
    pub fn is_postfix(self) -> bool {
        matches!(self, Self::PostInc | Self::PostDec)
    }

    /// Increments and decrements write their operand.
    pub fn is_mutating(self) -> bool {
        matches!(self, Self::PreInc | Self::PreDec | Self::PostInc | Self::PostDec)
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum BinaryOp {
    /// `||`
    #[display("||")]
    Or,
    /// `&&`
    #[display("&&")]
    And,
    /// `??`
    #[display("??")]
    Coalesce,
    /// `|`
    #[display("|")]
    BitOr,
    /// `^`
    #[display("^")]
    BitXor,
    /// `&`
    #[display("&")]
    BitAnd,
    /// `==`
    #[display("==")]
    Eq,
    /// `!=`
    #[display("!=")]
    Ne,
    /// `<`
    #[display("<")]
    Lt,
    /// `<=`
    #[display("<=")]
    Le,
    /// `>`
    #[display(">")]
    Gt,
    /// `>=`
    #[display(">=")]
    Ge,
    /// `<<`
    #[display("<<")]
    Shl,
    /// `>>`
    #[display(">>")]
    Shr,
    /// `+`
    #[display("+")]
    Add,
    /// `-`
    #[display("-")]
    Sub,
    /// `*`
    #[display("*")]
    Mul,
    /// `/`
    #[display("/")]
    Div,
    /// `%`
    #[display("%")]
    Rem,
}

impl BinaryOp {
    /// Binding strength, higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Coalesce => 1,
            Self::Or => 2,
            Self::And => 3,
            Self::BitOr => 4,
            Self::BitXor => 5,
            Self::BitAnd => 6,
            Self::Eq | Self::Ne => 7,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 8,
            Self::Shl | Self::Shr => 9,
            Self::Add | Self::Sub => 10,
            Self::Mul | Self::Div | Self::Rem => 11,
        }
    }

    /// `??` is the only right-associative binary operator.
    pub fn is_right_associative(self) -> bool {
        matches!(self, Self::Coalesce)
    }
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum AssignOp {
    /// `=`
    #[display("=")]
    Assign,
    /// `+=`
    #[display("+=")]
    Add,
    /// `-=`
    #[display("-=")]
    Sub,
    /// `*=`
    #[display("*=")]
    Mul,
    /// `/=`
    #[display("/=")]
    Div,
    /// `%=`
    #[display("%=")]
    Rem,
    /// `&=`
    #[display("&=")]
    And,
    /// `|=`
    #[display("|=")]
    Or,
    /// `^=`
    #[display("^=")]
    Xor,
    /// `??=`
    #[display("??=")]
    Coalesce,
    /// `<<=`
    #[display("<<=")]
    Shl,
}

impl AssignOp {
    /// Only plain `=` leaves the previous value unread.
    pub fn reads_target(self) -> bool {
        !matches!(self, Self::Assign)
    }
}
