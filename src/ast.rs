//! # Abstract Syntax Tree
//!
//! The AST is the contract between the (out-of-scope) parser and the
//! semantic analyzer. Nothing in this crate constructs an AST from text;
//! a front end is expected to build one of these directly. All types
//! derive `serde` so an AST can be dumped to or loaded from JSON, which is
//! how the reference front end and this analyzer communicate in practice.

use crate::error::Span;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub module_name: String,
    pub imports: Vec<Import>,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Import {
    pub path: String,
    pub alias: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Item {
    Function(FunctionDef),
    Struct(StructItem),
    Enum(EnumItem),
    Interface(InterfaceItem),
    Constant(ConstantDef),
    /// A compile-time directive that textually expands before typing.
    Template(TemplateDirective),
    /// A block evaluated by the compile-time interpreter; any `@emit`
    /// calls inside contribute further items to this module.
    CompileTimeBlock(CompileTimeBlock),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeExprKind {
    Named(String),
    Pointer(Box<TypeExpr>),
    Array { element: Box<TypeExpr>, length: u16 },
    Optional(Box<TypeExpr>),
    Function { params: Vec<TypeExpr>, ret: Box<TypeExpr> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    /// Present only for generic functions; monomorphized at call sites.
    pub type_params: Vec<String>,
    pub body: Block,
    /// `true` when the source explicitly requested the self-modifying-code
    /// calling convention; `false` means "let the optimizer decide".
    pub smc_requested: Option<bool>,
    pub is_extern: bool,
    pub is_pub: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructItem {
    pub name: String,
    pub fields: Vec<StructField>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumVariantItem {
    pub name: String,
    pub value: Option<i64>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumItem {
    pub name: String,
    pub underlying: Option<TypeExpr>,
    pub variants: Vec<EnumVariantItem>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceMethodSig {
    pub name: String,
    pub params: Vec<TypeExpr>,
    pub ret: Option<TypeExpr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceItem {
    pub name: String,
    pub methods: Vec<InterfaceMethodSig>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantDef {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub value: Expr,
    pub span: Span,
}

/// A template directive: `NAME` is the template string, `ARGS` are the
/// ordered substitution arguments for `{0}`, `{1}`, ...
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDirective {
    pub name: String,
    pub args: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileTimeBlock {
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    Let { name: String, ty: Option<TypeExpr>, mutable: bool, value: Expr, span: Span },
    Assign { target: Expr, value: Expr, span: Span },
    Expr(Expr),
    If { cond: Expr, then_block: Block, else_block: Option<Block>, span: Span },
    While { cond: Expr, body: Block, span: Span },
    For { var: String, start: Expr, end: Expr, body: Block, span: Span },
    Break(Span),
    Continue(Span),
    Return(Option<Expr>, Span),
    Case { scrutinee: Expr, arms: Vec<CaseArm>, span: Span },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Pattern {
    Literal(Literal),
    Wildcard,
    Range(i64, i64),
    EnumVariant { enum_name: Option<String>, variant: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseArm {
    pub pattern: Pattern,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Bool(bool),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add, Sub, Mul, Div, Mod,
    Eq, Ne, Lt, Le, Gt, Ge,
    And, Or,
    BitAnd, BitOr, BitXor, Shl, Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arg {
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    Ident(String),
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnOp, operand: Box<Expr> },
    Call { callee: String, args: Vec<Arg> },
    FieldAccess { base: Box<Expr>, field: String },
    IndexAccess { base: Box<Expr>, index: Box<Expr> },
    Cast { value: Box<Expr>, ty: TypeExpr },
    ArrayLiteral(Vec<Expr>),
    StructLiteral { name: String, fields: Vec<(String, Expr)> },
    /// `@emit(expr)` inside a compile-time block: contributes source text
    /// to the enclosing module.
    Emit(Box<Expr>),
    /// `@print(...)` with a recognized formatting kind per argument.
    Print(Vec<PrintArg>),
    Block(Box<Block>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PrintArg {
    Literal(String),
    RuntimeValue(Expr),
    ConstExpr(Expr),
}
