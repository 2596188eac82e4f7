use super::{Expr, Span};

// DataType ::= "int" | "void";
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataType {
    Int,
    Void,
}

// Decl ::= ["const"] DataType Def {"," Def} ";";
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub is_const: bool,
    pub ty: DataType,
    pub defs: Vec<Def>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Def {
    Scalar(ScalarDef),
    Array(ArrayDef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarDef {
    pub name: String,
    pub init: Option<InitVal>,
    pub span: Span,
}

// ArrayDef ::= IDENT {"[" ConstExp "]"} ["=" InitVal];
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDef {
    pub name: String,
    pub dims: Vec<Expr>,
    pub init: Option<InitVal>,
    pub span: Span,
}

// InitVal ::= Exp | "{" [InitVal {"," InitVal}] "}";
#[derive(Debug, Clone, PartialEq)]
pub enum InitVal {
    Expr(Expr),
    List(Vec<InitVal>),
}
