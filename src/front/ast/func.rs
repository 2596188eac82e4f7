use super::{Block, DataType, Decl, Expr, Span};

/// 函数形参。`is_array` 为真时首维省略，`dims` 是其余各维的长度表达式，
/// 该形参在 IR 中退化为指针类型。
#[derive(Debug, Clone, PartialEq)]
pub struct FuncParam {
    pub name: String,
    pub is_array: bool,
    pub dims: Vec<Expr>,
    pub span: Span,
}

/// 函数定义；`body` 为 `None` 时是一条外部声明（`decl @name(...)`）。
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub ty: DataType,
    pub name: String,
    pub params: Vec<FuncParam>,
    pub body: Option<Block>,
    pub span: Span,
}

// CompUnit ::= {Decl | FuncDef};
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalItem {
    Decl(Decl),
    FuncDef(FuncDef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompUnit {
    pub items: Vec<GlobalItem>,
}
