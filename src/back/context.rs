use crate::back::program::AsmProgram;
use koopa::ir::{BasicBlock, Value};
use std::collections::HashMap;

/// 汇编代码生成上下文。
///
/// 维护每个函数的栈帧布局与全局状态：
/// - `slot_map`：指令结果 / 形参 / alloc 到 sp 相对偏移的映射
/// - `global_map`：全局 alloc 到汇编符号名的映射
/// - `bb_label_map`：基本块到汇编标签的映射
///
/// ## 栈帧布局
///
/// ```text
/// +-------------------+  <- 调用者 sp
/// |   Saved RA (R)    |  (仅当函数内有 call)
/// +-------------------+
/// |   Locals (S)      |  (每条有结果的指令一个槽；alloc 按对象大小)
/// +-------------------+
/// |   Arg Area (A)    |  (调用参数超过 8 个时的出参区)
/// +-------------------+  <- 当前 sp
/// ```
///
/// 其中 A = max(0, max_call_args - 8) * 4；
/// 总帧长 S + R + A 向上对齐到 16 字节。
pub struct Context {
    /// 生成的汇编程序
    pub program: AsmProgram,
    /// 值到栈偏移的映射（相对函数体开头的 sp）
    pub slot_map: HashMap<Value, i32>,
    /// 全局 alloc 到符号名的映射
    pub global_map: HashMap<Value, String>,
    /// 基本块到标签名的映射
    pub bb_label_map: HashMap<BasicBlock, String>,
    /// 局部变量区大小（字节）
    pub local_frame_size: i32,
    /// ra 保存区大小：0 或 4
    pub ra_size: i32,
    /// 出参区大小（字节）
    pub args_size: i32,
    /// 对齐后的总栈帧大小
    pub total_frame_size: i32,
    /// 函数内是否有 call 指令
    pub has_callee: bool,
    /// 函数内调用的最大实参个数
    pub max_call_args: usize,
}

impl Context {
    pub fn new() -> Self {
        Self {
            program: AsmProgram::new(),
            slot_map: HashMap::new(),
            global_map: HashMap::new(),
            bb_label_map: HashMap::new(),
            local_frame_size: 0,
            ra_size: 0,
            args_size: 0,
            total_frame_size: 0,
            has_callee: false,
            max_call_args: 0,
        }
    }

    pub fn reset_for_function(&mut self) {
        self.slot_map.clear();
        self.bb_label_map.clear();
        self.local_frame_size = 0;
        self.ra_size = 0;
        self.args_size = 0;
        self.total_frame_size = 0;
        self.has_callee = false;
        self.max_call_args = 0;
    }

    /// 预扫描阶段为一个值保留栈槽，返回分配前的偏移。
    pub fn alloc_slot(&mut self, value: Value, size: i32) -> i32 {
        let offset = self.local_frame_size;
        self.local_frame_size += size;
        self.slot_map.insert(value, offset);
        offset
    }

    /// 计算最终帧布局：S + R + A 对齐到 16 字节，
    /// 并把已记录的局部槽整体上移出参区的大小。
    pub fn finalize_frame(&mut self) {
        self.args_size = (self.max_call_args as i32 - 8).max(0) * 4;
        let total = self.local_frame_size + self.ra_size + self.args_size;
        self.total_frame_size = (total + 15) / 16 * 16;
        for offset in self.slot_map.values_mut() {
            *offset += self.args_size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_is_aligned_and_shifted() {
        let mut ctx = Context::new();
        // 无法在单元测试里构造真正的 koopa::ir::Value，只验证纯算术部分
        ctx.local_frame_size = 20;
        ctx.ra_size = 4;
        ctx.max_call_args = 10;
        ctx.finalize_frame();
        assert_eq!(ctx.args_size, 8);
        assert_eq!(ctx.total_frame_size, 32);
    }

    #[test]
    fn small_frame_rounds_to_sixteen() {
        let mut ctx = Context::new();
        ctx.local_frame_size = 4;
        ctx.finalize_frame();
        assert_eq!(ctx.total_frame_size, 16);
        let mut ctx = Context::new();
        ctx.finalize_frame();
        assert_eq!(ctx.total_frame_size, 0);
    }
}
