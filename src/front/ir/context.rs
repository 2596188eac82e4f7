use crate::front::ast::Span;
use crate::front::symbol::{Symbol, SymbolTable};
use crate::front::types::Ty;
use crate::utils::SourceMap;
use crate::CompilerError;

/// 一层循环的控制流上下文（break/continue 的跳转目标）。
#[derive(Debug, Clone)]
pub struct LoopContext {
    pub continue_target: String,
    pub break_target: String,
}

/// Koopa IR 文本构造器。
///
/// 持有输出缓冲区、各类新名字计数器、当前基本块是否已被终结指令封闭的
/// 标志、循环上下文栈以及符号表。所有 IR 文本都经由 `append` 进入缓冲区。
///
/// 约定：
/// - `%k` 由 `new_reg` 发放，函数内严格递增；
/// - `@ident_k` 由 `new_var` 发放，函数内严格递增；
/// - 标签形如 `%prefix_id`，同一函数内所有标签共享一个 id 计数器；
/// - 三个计数器与封闭标志在每个函数开头由 `reset_counters` 复位。
pub struct IrBuilder {
    buf: String,
    count_reg: u32,
    count_var: u32,
    count_label: u32,
    block_closed: bool,
    loop_stack: Vec<LoopContext>,
    symbols: SymbolTable,
    source_map: Option<SourceMap>,
}

/// 预先声明的 SysY 库函数：(IR 声明, 源名, 返回类型是否为 int)
const LIBRARY_DECLS: [(&str, &str, bool); 8] = [
    ("decl @getint(): i32", "getint", true),
    ("decl @getch(): i32", "getch", true),
    ("decl @getarray(*i32): i32", "getarray", true),
    ("decl @putint(i32)", "putint", false),
    ("decl @putch(i32)", "putch", false),
    ("decl @putarray(i32, *i32)", "putarray", false),
    ("decl @starttime()", "starttime", false),
    ("decl @stoptime()", "stoptime", false),
];

impl IrBuilder {
    /// 初始化构造器：写入库函数声明序言并在全局作用域注册对应符号。
    pub fn new(source_map: Option<SourceMap>) -> Self {
        let mut builder = Self {
            buf: String::new(),
            count_reg: 0,
            count_var: 0,
            count_label: 0,
            block_closed: false,
            loop_stack: Vec::new(),
            symbols: SymbolTable::new(),
            source_map,
        };
        for (decl, name, returns_int) in LIBRARY_DECLS {
            builder.buf.push_str(decl);
            builder.buf.push('\n');
            let ret_ty = if returns_int { Ty::Int } else { Ty::Void };
            builder.symbols.install(name, ret_ty);
        }
        builder.buf.push('\n');
        builder
    }

    /// 向缓冲区追加原始文本，是生成 IR 的唯一出口。
    pub fn append(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    /// 新的虚拟寄存器名，如 `%12`。
    pub fn new_reg(&mut self) -> String {
        let reg = format!("%{}", self.count_reg);
        self.count_reg += 1;
        reg
    }

    /// 新的局部变量名，如 `@x_3`。
    pub fn new_var(&mut self, ident: &str) -> String {
        let name = format!("@{}_{}", ident, self.count_var);
        self.count_var += 1;
        name
    }

    pub fn alloc_label_id(&mut self) -> u32 {
        let id = self.count_label;
        self.count_label += 1;
        id
    }

    pub fn new_label(&self, prefix: &str, id: u32) -> String {
        format!("%{}_{}", prefix, id)
    }

    pub fn is_block_closed(&self) -> bool {
        self.block_closed
    }

    pub fn set_block_closed(&mut self) {
        self.block_closed = true;
    }

    pub fn clear_block_closed(&mut self) {
        self.block_closed = false;
    }

    pub fn push_loop(&mut self, continue_target: String, break_target: String) {
        self.loop_stack.push(LoopContext {
            continue_target,
            break_target,
        });
    }

    pub fn pop_loop(&mut self) {
        self.loop_stack.pop();
    }

    pub fn break_target(&self) -> Result<String, CompilerError> {
        self.loop_stack
            .last()
            .map(|ctx| ctx.break_target.clone())
            .ok_or_else(|| CompilerError::SemanticError("'break' statement not within loop".to_string()))
    }

    pub fn continue_target(&self) -> Result<String, CompilerError> {
        self.loop_stack
            .last()
            .map(|ctx| ctx.continue_target.clone())
            .ok_or_else(|| CompilerError::SemanticError("'continue' statement not within loop".to_string()))
    }

    /// 开始生成新函数时复位所有计数器与封闭标志。
    pub fn reset_counters(&mut self) {
        self.count_reg = 0;
        self.count_var = 0;
        self.count_label = 0;
        self.block_closed = false;
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn enter_scope(&mut self) {
        self.symbols.enter_scope();
    }

    pub fn exit_scope(&mut self) {
        self.symbols.exit_scope();
    }

    /// 查找符号并克隆，避免查找结果借用整个构造器。
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.symbols.lookup(name).cloned()
    }

    pub fn error_at_span(&self, message: impl Into<String>, span: Span) -> CompilerError {
        let mut msg = message.into();
        if let Some(loc) = self.source_map.as_ref().map(|sm| sm.format_location(span.begin)) {
            msg = format!("{} at {}", msg, loc);
        }
        CompilerError::SemanticError(msg)
    }

    /// 取出生成的 IR 文本，构造器随之耗尽。
    pub fn finish(self) -> String {
        self.buf
    }
}
