//! # 后端模块
//!
//! 把解析后的 Koopa IR 程序翻译为 RISC-V 32 位汇编。
//!
//! 采用固定栈槽策略：每个产生结果的指令占一个 4 字节槽，alloc 按对象
//! 大小保留；计算经由 t0/t1，t2 保留给大立即数与指针步长。每个函数
//! 先预扫描确定栈帧，再发射正文；栈帧对齐到 16 字节，ra 仅在函数有
//! 调用时保存于帧顶。
//!
//! ## 模块结构
//!
//! - `asm`: 指令遍历与发射逻辑
//! - `insts`: RISC-V 指令与寄存器定义
//! - `program`: 汇编程序的容器与格式化输出
//! - `context`: 栈帧布局与代码生成状态
//! - `utils`: 12 位立即数安全的访存辅助

pub mod asm;
pub mod context;
pub mod insts;
pub mod program;
pub mod utils;

use crate::back::asm::GenerateAsm;
use crate::back::context::Context;
use crate::CompilerError;
use koopa::ir::Program;

/// 从 Koopa IR 程序生成 RISC-V 汇编文本。
pub fn generate_asm(program: &Program) -> Result<String, CompilerError> {
    let mut ctx = Context::new();
    program.generate(program, &mut ctx)?;
    Ok(ctx.program.dump())
}
