use crate::front::ast::*;
use crate::front::ir::{GenerateIR, IrBuilder};
use crate::CompilerError;

impl GenerateIR for Stmt {
    type Output = ();

    fn generate_ir(&self, builder: &mut IrBuilder) -> Result<Self::Output, CompilerError> {
        match self {
            Stmt::Return(expr) => generate_return_ir(expr.as_ref(), builder),
            Stmt::Assign(lval, expr) => generate_assign_ir(lval, expr, builder),
            Stmt::Block(block) => generate_block_ir(block, builder),
            Stmt::Expr(expr) => {
                if let Some(e) = expr {
                    e.generate_ir(builder)?;
                }
                Ok(())
            }
            Stmt::If { cond, then_stmt, else_stmt, .. } => {
                generate_if_ir(cond, then_stmt, else_stmt.as_deref(), builder)
            }
            Stmt::While { cond, body, .. } => generate_while_ir(cond, body, builder),
            Stmt::Break(span) => generate_break_ir(*span, builder),
            Stmt::Continue(span) => generate_continue_ir(*span, builder),
        }
    }
}

impl GenerateIR for BlockItem {
    type Output = ();

    fn generate_ir(&self, builder: &mut IrBuilder) -> Result<Self::Output, CompilerError> {
        match self {
            BlockItem::Decl(decl) => decl.generate_ir(builder),
            BlockItem::Stmt(stmt) => stmt.generate_ir(builder),
        }
    }
}

/// 顺序生成块内语句；一旦当前基本块被封闭，其余语句不可达，直接跳过。
pub fn lower_block_items(items: &Block, builder: &mut IrBuilder) -> Result<(), CompilerError> {
    for item in items {
        if builder.is_block_closed() {
            continue;
        }
        item.generate_ir(builder)?;
    }
    Ok(())
}

/// 语句形式的块自带一层作用域；函数体块由 FuncDef 直接展开，不经过这里。
fn generate_block_ir(items: &Block, builder: &mut IrBuilder) -> Result<(), CompilerError> {
    builder.enter_scope();
    lower_block_items(items, builder)?;
    builder.exit_scope();
    Ok(())
}

fn generate_return_ir(expr: Option<&Expr>, builder: &mut IrBuilder) -> Result<(), CompilerError> {
    let ret_val = match expr {
        Some(e) => Some(e.generate_ir(builder)?),
        None => None,
    };
    match ret_val {
        Some(val) => builder.append(&format!("  ret {}\n", val)),
        None => builder.append("  ret\n"),
    }
    builder.set_block_closed();
    Ok(())
}

/// 对 `x[i1][i2]… = expr` 的赋值。
///
/// 常量不可赋值。指针形参先 load 出指针本体；首个下标走 `getptr`，
/// 其余走 `getelemptr`；走完下标后 store。
fn generate_assign_ir(lval: &LVal, expr: &Expr, builder: &mut IrBuilder) -> Result<(), CompilerError> {
    let sym = builder
        .lookup(&lval.name)
        .ok_or_else(|| builder.error_at_span(format!("assignment to undefined variable `{}`", lval.name), lval.span))?;

    if sym.is_const {
        return Err(builder.error_at_span(
            format!("cannot assign to constant `{}`", lval.name),
            lval.span,
        ));
    }

    let mut cur_ptr = sym.ir_name.clone();
    if sym.ty.is_ptr() {
        let loaded = builder.new_reg();
        builder.append(&format!("  {} = load {}\n", loaded, cur_ptr));
        cur_ptr = loaded;
    }

    for (i, index_expr) in lval.indices.iter().enumerate() {
        let idx_val = index_expr.generate_ir(builder)?;
        let nxt_ptr = builder.new_reg();
        if i == 0 && sym.ty.is_ptr() {
            builder.append(&format!("  {} = getptr {}, {}\n", nxt_ptr, cur_ptr, idx_val));
        } else {
            builder.append(&format!("  {} = getelemptr {}, {}\n", nxt_ptr, cur_ptr, idx_val));
        }
        cur_ptr = nxt_ptr;
    }

    let expr_val = expr.generate_ir(builder)?;
    builder.append(&format!("  store {}, {}\n", expr_val, cur_ptr));
    Ok(())
}

fn generate_if_ir(
    cond: &Expr,
    then_stmt: &Stmt,
    else_stmt: Option<&Stmt>,
    builder: &mut IrBuilder,
) -> Result<(), CompilerError> {
    let cond_val = cond.generate_ir(builder)?;
    let id = builder.alloc_label_id();
    let then_label = builder.new_label("then", id);
    let else_label = builder.new_label("else", id);
    let end_label = builder.new_label("end", id);

    if else_stmt.is_some() {
        builder.append(&format!("  br {}, {}, {}\n", cond_val, then_label, else_label));
    } else {
        builder.append(&format!("  br {}, {}, {}\n", cond_val, then_label, end_label));
    }

    builder.append(&format!("{}:\n", then_label));
    builder.clear_block_closed();
    then_stmt.generate_ir(builder)?;
    if !builder.is_block_closed() {
        builder.append(&format!("  jump {}\n", end_label));
    }

    if let Some(else_s) = else_stmt {
        builder.append(&format!("{}:\n", else_label));
        builder.clear_block_closed();
        else_s.generate_ir(builder)?;
        if !builder.is_block_closed() {
            builder.append(&format!("  jump {}\n", end_label));
        }
    }

    builder.append(&format!("{}:\n", end_label));
    // 每个 end 标签都开启新的基本块
    builder.clear_block_closed();
    Ok(())
}

fn generate_while_ir(cond: &Expr, body: &Stmt, builder: &mut IrBuilder) -> Result<(), CompilerError> {
    let id = builder.alloc_label_id();
    let entry_label = builder.new_label("while_entry", id);
    let body_label = builder.new_label("while_body", id);
    let end_label = builder.new_label("while_end", id);

    builder.push_loop(entry_label.clone(), end_label.clone());
    builder.append(&format!("  jump {}\n", entry_label));

    builder.append(&format!("{}:\n", entry_label));
    let cond_val = cond.generate_ir(builder)?;
    builder.append(&format!("  br {}, {}, {}\n", cond_val, body_label, end_label));

    builder.append(&format!("{}:\n", body_label));
    builder.clear_block_closed();
    body.generate_ir(builder)?;
    if !builder.is_block_closed() {
        builder.append(&format!("  jump {}\n", entry_label));
    }

    builder.append(&format!("{}:\n", end_label));
    builder.pop_loop();
    builder.clear_block_closed();
    Ok(())
}

fn generate_break_ir(span: Span, builder: &mut IrBuilder) -> Result<(), CompilerError> {
    let target = builder
        .break_target()
        .map_err(|_| builder.error_at_span("'break' statement not within loop", span))?;
    builder.append(&format!("  jump {}\n", target));
    builder.set_block_closed();
    Ok(())
}

fn generate_continue_ir(span: Span, builder: &mut IrBuilder) -> Result<(), CompilerError> {
    let target = builder
        .continue_target()
        .map_err(|_| builder.error_at_span("'continue' statement not within loop", span))?;
    builder.append(&format!("  jump {}\n", target));
    builder.set_block_closed();
    Ok(())
}
