//! # IR 生成模块
//!
//! 把 AST 翻译为文本形式的 Koopa IR。生成过程中的全部状态（名字计数器、
//! 基本块封闭标志、循环栈、符号表）都在 [`IrBuilder`] 里，AST 本身不可变。
//!
//! 作用域机制：进入函数或语句块时符号表压入一层，新定义遮蔽外层；
//! 离开时弹出，该层的局部符号对外不可见。函数体块不额外建层，
//! 形参与函数体局部变量共享同一层。

pub mod context;
pub mod expr_ir;
pub mod stmt_ir;

pub use context::IrBuilder;

use crate::front::ast::*;
use crate::front::ir::expr_ir::{build_param_type, calc_value};
use crate::front::ir::stmt_ir::lower_block_items;
use crate::front::symbol::SymbolKind;
use crate::front::types::Ty;
use crate::CompilerError;

pub trait GenerateIR {
    type Output;
    fn generate_ir(&self, builder: &mut IrBuilder) -> Result<Self::Output, CompilerError>;
}

impl GenerateIR for CompUnit {
    type Output = ();

    fn generate_ir(&self, builder: &mut IrBuilder) -> Result<Self::Output, CompilerError> {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                builder.append("\n");
            }
            match item {
                GlobalItem::Decl(decl) => decl.generate_ir(builder)?,
                GlobalItem::FuncDef(func) => func.generate_ir(builder)?,
            }
        }
        Ok(())
    }
}

impl GenerateIR for FuncDef {
    type Output = ();

    fn generate_ir(&self, builder: &mut IrBuilder) -> Result<Self::Output, CompilerError> {
        builder.reset_counters();

        let mut param_tys = Vec::with_capacity(self.params.len());
        for param in &self.params {
            param_tys.push(build_param_type(param, builder)?);
        }
        let ret_ty = match self.ty {
            DataType::Int => Ty::Int,
            DataType::Void => Ty::Void,
        };

        // 先在全局作用域登记函数符号，递归与前向引用才能解析
        builder
            .symbols_mut()
            .define_global(&self.name, "", ret_ty, SymbolKind::Func, false, 0)
            .map_err(|_| {
                builder.error_at_span(format!("redefinition of `{}`", self.name), self.span)
            })?;

        let body = match &self.body {
            Some(body) => body,
            None => {
                // 外部声明只列出形参类型
                let tys: Vec<String> = param_tys.iter().map(|ty| ty.render_ir()).collect();
                builder.append(&format!("decl @{}({})", self.name, tys.join(", ")));
                if self.ty == DataType::Int {
                    builder.append(": i32");
                }
                builder.append("\n");
                return Ok(());
            }
        };

        builder.append(&format!("fun @{}(", self.name));
        for (i, (param, ty)) in self.params.iter().zip(&param_tys).enumerate() {
            if i > 0 {
                builder.append(", ");
            }
            builder.append(&format!("@{}: {}", param.name, ty.render_ir()));
        }
        match self.ty {
            DataType::Void => builder.append(") "),
            DataType::Int => builder.append("): i32 "),
        }

        builder.enter_scope();
        builder.append(&format!("{{\n%entry_{}:\n", self.name));

        // 形参落栈：分配局部槽，存入传入值，再把源名绑定到槽地址
        for (param, ty) in self.params.iter().zip(&param_tys) {
            let addr = builder.new_var(&param.name);
            builder.append(&format!("  {} = alloc {}\n", addr, ty.render_ir()));
            builder.append(&format!("  store @{}, {}\n", param.name, addr));
            builder
                .symbols_mut()
                .define(&param.name, &addr, ty.clone(), SymbolKind::Var, false, 0)
                .map_err(|_| {
                    builder.error_at_span(
                        format!("redefinition of parameter `{}`", param.name),
                        param.span,
                    )
                })?;
        }

        builder.clear_block_closed();
        // 函数体块不再额外建作用域
        lower_block_items(body, builder)?;

        // e.g. int main() { int a; }  —— 没写 return 时补一条
        if !builder.is_block_closed() {
            match self.ty {
                DataType::Int => builder.append("  ret 0\n"),
                DataType::Void => builder.append("  ret\n"),
            }
            builder.set_block_closed();
        }

        builder.exit_scope();
        builder.append("}\n");
        Ok(())
    }
}

impl GenerateIR for Decl {
    type Output = ();

    fn generate_ir(&self, builder: &mut IrBuilder) -> Result<Self::Output, CompilerError> {
        if self.ty == DataType::Void {
            return Err(builder.error_at_span("variable cannot be of type 'void'", self.span));
        }
        for def in &self.defs {
            match def {
                Def::Scalar(def) => lower_scalar_def(def, self.is_const, builder)?,
                Def::Array(def) => lower_array_def(def, self.is_const, builder)?,
            }
        }
        Ok(())
    }
}

fn scalar_init_expr<'a>(
    def: &'a ScalarDef,
    builder: &IrBuilder,
) -> Result<Option<&'a Expr>, CompilerError> {
    match &def.init {
        None => Ok(None),
        Some(InitVal::Expr(e)) => Ok(Some(e)),
        Some(InitVal::List(_)) => Err(builder.error_at_span(
            format!("cannot initialise scalar `{}` with a brace list", def.name),
            def.span,
        )),
    }
}

fn lower_scalar_def(
    def: &ScalarDef,
    is_const: bool,
    builder: &mut IrBuilder,
) -> Result<(), CompilerError> {
    let init = scalar_init_expr(def, builder)?;

    if builder.symbols().is_global_scope() {
        if is_const {
            let expr = init.ok_or_else(|| {
                builder.error_at_span(
                    format!("constant `{}` requires an initialiser", def.name),
                    def.span,
                )
            })?;
            let val = calc_value(expr, builder)?;
            builder
                .symbols_mut()
                .define_global(&def.name, "", Ty::Int, SymbolKind::Var, true, val)?;
        } else {
            let addr = format!("@g_{}", def.name);
            match init {
                Some(expr) => {
                    let val = calc_value(expr, builder)?;
                    builder.append(&format!("global {} = alloc i32, {}\n", addr, val));
                }
                None => builder.append(&format!("global {} = alloc i32, zeroinit\n", addr)),
            }
            builder
                .symbols_mut()
                .define_global(&def.name, &addr, Ty::Int, SymbolKind::Var, false, 0)?;
        }
    } else if is_const {
        let expr = init.ok_or_else(|| {
            builder.error_at_span(
                format!("constant `{}` requires an initialiser", def.name),
                def.span,
            )
        })?;
        let val = calc_value(expr, builder)?;
        builder
            .symbols_mut()
            .define(&def.name, "", Ty::Int, SymbolKind::Var, true, val)?;
    } else {
        let addr = builder.new_var(&def.name);
        builder.append(&format!("  {} = alloc i32\n", addr));
        builder
            .symbols_mut()
            .define(&def.name, &addr, Ty::Int, SymbolKind::Var, false, 0)?;
        if let Some(expr) = init {
            let val = expr.generate_ir(builder)?;
            builder.append(&format!("  store {}, {}\n", val, addr));
        }
    }
    Ok(())
}

fn lower_array_def(
    def: &ArrayDef,
    is_const: bool,
    builder: &mut IrBuilder,
) -> Result<(), CompilerError> {
    let mut dims = Vec::with_capacity(def.dims.len());
    for dim_expr in &def.dims {
        let dim = calc_value(dim_expr, builder)?;
        if dim <= 0 {
            return Err(builder.error_at_span(
                format!("array dimension of `{}` must be positive", def.name),
                def.span,
            ));
        }
        dims.push(dim as u32);
    }
    let mut arr_ty = Ty::Int;
    for dim in dims.iter().rev() {
        arr_ty = Ty::array_of(arr_ty, *dim);
    }

    if builder.symbols().is_global_scope() {
        // 全局数组统一用 @g_ 前缀命名，与局部的 @ident_k 互不冲突
        let ir_name = format!("@g_{}", def.name);
        match &def.init {
            None => {
                builder.append(&format!(
                    "global {} = alloc {}, zeroinit\n",
                    ir_name,
                    arr_ty.render_ir()
                ));
            }
            Some(init) => {
                let flat = flatten_init(init, &arr_ty, builder)?;
                let mut cursor = 0;
                let aggregate = render_aggregate(&arr_ty, &flat, &mut cursor)?;
                builder.append(&format!(
                    "global {} = alloc {}, {}\n",
                    ir_name,
                    arr_ty.render_ir(),
                    aggregate
                ));
            }
        }
        builder
            .symbols_mut()
            .define_global(&def.name, &ir_name, arr_ty, SymbolKind::Var, is_const, 0)?;
    } else {
        let addr = builder.new_var(&def.name);
        builder.append(&format!("  {} = alloc {}\n", addr, arr_ty.render_ir()));

        // 没有初始化列表的局部数组内容未定义
        if let Some(init) = &def.init {
            let flat = flatten_init(init, &arr_ty, builder)?;
            let mut cursor = 0;
            store_flattened(&arr_ty, &addr, &flat, &mut cursor, builder)?;
        }
        builder
            .symbols_mut()
            .define(&def.name, &addr, arr_ty, SymbolKind::Var, is_const, 0)?;
    }
    Ok(())
}

/// 把嵌套的初始化列表摊平为行主序的操作数向量，长度恰为目标类型的
/// 标量容量，缺省位置补 `"0"`。
///
/// 规则（与 C 的数组初始化一致）：
/// - 标量按“流动”模式逐个填入下一个 i32 槽，可以跨越维度边界；
/// - 花括号子列表强制对齐到当前位置的下一个子聚合，递归处理后
///   游标恰好前进一个子聚合的容量；
/// - 子列表或顶层列表有剩余元素时报 excess elements 错误；
/// - 标量槽位置出现花括号、聚合槽位置出现标量均为语义错误。
///
/// 全局上下文中叶子是编译期求出的整数字面量；局部上下文中叶子是
/// 对应表达式即时下降得到的操作数。
pub fn flatten_init(
    init: &InitVal,
    target: &Ty,
    builder: &mut IrBuilder,
) -> Result<Vec<String>, CompilerError> {
    let list = match init {
        InitVal::List(list) => list,
        InitVal::Expr(_) => {
            return Err(CompilerError::SemanticError(
                "cannot initialise an array with a scalar expression".to_string(),
            ));
        }
    };
    let mut cursor = 0;
    let result = fill_slots(target, list, &mut cursor, builder)?;
    if cursor < list.len() {
        return Err(CompilerError::SemanticError(
            "excess elements in initialiser list".to_string(),
        ));
    }
    Ok(result)
}

fn fill_slots(
    ty: &Ty,
    list: &[InitVal],
    cursor: &mut usize,
    builder: &mut IrBuilder,
) -> Result<Vec<String>, CompilerError> {
    // 基本情况：目标是标量槽
    if !ty.is_array() {
        if *cursor >= list.len() {
            return Ok(vec!["0".to_string()]);
        }
        match &list[*cursor] {
            InitVal::Expr(expr) => {
                *cursor += 1;
                if builder.symbols().is_global_scope() {
                    Ok(vec![calc_value(expr, builder)?.to_string()])
                } else {
                    Ok(vec![expr.generate_ir(builder)?])
                }
            }
            InitVal::List(_) => Err(CompilerError::SemanticError(
                "expected scalar initialiser, found brace list".to_string(),
            )),
        }
    } else {
        let (elem_ty, len) = match ty {
            Ty::Array(elem, len) => (elem.as_ref(), *len),
            _ => unreachable!(),
        };
        let mut result = Vec::new();
        for _ in 0..len {
            if *cursor >= list.len() {
                // 列表耗尽：余下的槽全部补零
                let mut dummy = 0;
                result.extend(fill_slots(elem_ty, &[], &mut dummy, builder)?);
                continue;
            }
            match &list[*cursor] {
                // 流动模式：标量继续在同一列表上推进
                InitVal::Expr(_) => {
                    result.extend(fill_slots(elem_ty, list, cursor, builder)?);
                }
                // 对齐模式：花括号开启子聚合，用子列表从头填充
                InitVal::List(sub_list) => {
                    let mut sub_cursor = 0;
                    let sub = fill_slots(elem_ty, sub_list, &mut sub_cursor, builder)?;
                    if sub_cursor < sub_list.len() {
                        return Err(CompilerError::SemanticError(
                            "excess elements in initialiser".to_string(),
                        ));
                    }
                    *cursor += 1;
                    result.extend(sub);
                }
            }
        }
        Ok(result)
    }
}

/// 把摊平后的字面量按目标类型还原成嵌套聚合文本，如 `{{1, 2}, {3, 0}}`。
fn render_aggregate(ty: &Ty, flat: &[String], cursor: &mut usize) -> Result<String, CompilerError> {
    match ty {
        Ty::Array(elem, len) => {
            let mut parts = Vec::with_capacity(*len as usize);
            for _ in 0..*len {
                parts.push(render_aggregate(elem, flat, cursor)?);
            }
            Ok(format!("{{{}}}", parts.join(", ")))
        }
        _ => {
            let val = flat.get(*cursor).ok_or_else(|| {
                CompilerError::IRGenerationError("flattened initialiser shorter than type capacity".to_string())
            })?;
            *cursor += 1;
            Ok(val.clone())
        }
    }
}

/// 沿数组树下行，对每个叶子地址发出 `getelemptr` 链与 `store`。
fn store_flattened(
    ty: &Ty,
    ptr: &str,
    flat: &[String],
    cursor: &mut usize,
    builder: &mut IrBuilder,
) -> Result<(), CompilerError> {
    match ty {
        Ty::Array(elem, len) => {
            for i in 0..*len {
                let nxt_ptr = builder.new_reg();
                builder.append(&format!("  {} = getelemptr {}, {}\n", nxt_ptr, ptr, i));
                store_flattened(elem, &nxt_ptr, flat, cursor, builder)?;
            }
            Ok(())
        }
        _ => {
            let val = flat.get(*cursor).ok_or_else(|| {
                CompilerError::IRGenerationError("flattened initialiser shorter than type capacity".to_string())
            })?;
            *cursor += 1;
            builder.append(&format!("  store {}, {}\n", val, ptr));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: i32) -> InitVal {
        InitVal::Expr(Expr::Number(n, Span::default()))
    }

    fn list(items: Vec<InitVal>) -> InitVal {
        InitVal::List(items)
    }

    fn ty_2x2() -> Ty {
        Ty::array_of(Ty::array_of(Ty::Int, 2), 2)
    }

    #[test]
    fn flat_scalars_flow_across_rows() {
        let mut builder = IrBuilder::new(None);
        let init = list(vec![num(1), num(2), num(3)]);
        let flat = flatten_init(&init, &ty_2x2(), &mut builder).unwrap();
        assert_eq!(flat, vec!["1", "2", "3", "0"]);
    }

    #[test]
    fn braces_align_to_sub_aggregates() {
        let mut builder = IrBuilder::new(None);
        let init = list(vec![list(vec![num(1)]), list(vec![num(2), num(3)])]);
        let flat = flatten_init(&init, &ty_2x2(), &mut builder).unwrap();
        assert_eq!(flat, vec!["1", "0", "2", "3"]);
    }

    #[test]
    fn excess_sub_lists_rejected() {
        let mut builder = IrBuilder::new(None);
        let init = list(vec![list(vec![num(1)]), list(vec![num(2)]), list(vec![num(3)])]);
        let err = flatten_init(&init, &ty_2x2(), &mut builder);
        assert!(matches!(err, Err(CompilerError::SemanticError(_))));
    }

    #[test]
    fn excess_scalars_in_sub_list_rejected() {
        let mut builder = IrBuilder::new(None);
        let init = list(vec![list(vec![num(1), num(2), num(3)]), list(vec![num(4)])]);
        let err = flatten_init(&init, &ty_2x2(), &mut builder);
        assert!(matches!(err, Err(CompilerError::SemanticError(_))));
    }

    #[test]
    fn brace_in_scalar_slot_rejected() {
        let mut builder = IrBuilder::new(None);
        let init = list(vec![num(1), list(vec![list(vec![num(2)])])]);
        let err = flatten_init(&init, &ty_2x2(), &mut builder);
        assert!(matches!(err, Err(CompilerError::SemanticError(_))));
    }

    #[test]
    fn scalar_for_whole_array_rejected() {
        let mut builder = IrBuilder::new(None);
        let err = flatten_init(&num(1), &ty_2x2(), &mut builder);
        assert!(matches!(err, Err(CompilerError::SemanticError(_))));
    }

    #[test]
    fn empty_list_zero_fills() {
        let mut builder = IrBuilder::new(None);
        let flat = flatten_init(&list(vec![]), &ty_2x2(), &mut builder).unwrap();
        assert_eq!(flat, vec!["0", "0", "0", "0"]);
    }

    #[test]
    fn renders_nested_aggregate() {
        let flat: Vec<String> = ["1", "2", "3", "0"].iter().map(|s| s.to_string()).collect();
        let mut cursor = 0;
        let agg = render_aggregate(&ty_2x2(), &flat, &mut cursor).unwrap();
        assert_eq!(agg, "{{1, 2}, {3, 0}}");
        assert_eq!(cursor, 4);
    }
}
