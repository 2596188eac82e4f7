use crate::front::ast::CompUnit;
use crate::front::ir::{GenerateIR, IrBuilder};
use crate::utils::SourceMap;
use crate::CompilerError;

pub mod ast;
pub mod ir;
pub mod symbol;
pub mod types;

/// 把整个编译单元降低为 Koopa IR 文本。
pub fn generate_ir(ast: &CompUnit, source_map: Option<SourceMap>) -> Result<String, CompilerError> {
    let mut builder = IrBuilder::new(source_map);
    ast.generate_ir(&mut builder)?;
    Ok(builder.finish())
}
