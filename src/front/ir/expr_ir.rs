use crate::front::ast::*;
use crate::front::ir::{GenerateIR, IrBuilder};
use crate::front::symbol::SymbolKind;
use crate::front::types::Ty;
use crate::CompilerError;

fn op_mnemonic(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Mod => "mod",
        BinaryOp::Lt => "lt",
        BinaryOp::Gt => "gt",
        BinaryOp::Le => "le",
        BinaryOp::Ge => "ge",
        BinaryOp::Eq => "eq",
        BinaryOp::Ne => "ne",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
    }
}

pub fn generate_unary_ir(
    op: UnaryOp,
    rhs: &Expr,
    builder: &mut IrBuilder,
) -> Result<String, CompilerError> {
    let rhs_val = rhs.generate_ir(builder)?;
    let ret = builder.new_reg();
    match op {
        UnaryOp::Neg => builder.append(&format!("  {} = sub 0, {}\n", ret, rhs_val)),
        UnaryOp::Not => builder.append(&format!("  {} = eq 0, {}\n", ret, rhs_val)),
    }
    Ok(ret)
}

pub fn generate_binary_ir(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    builder: &mut IrBuilder,
) -> Result<String, CompilerError> {
    match op {
        BinaryOp::And => generate_land_ir(lhs, rhs, builder),
        BinaryOp::Or => generate_lor_ir(lhs, rhs, builder),
        _ => {
            let lhs_val = lhs.generate_ir(builder)?;
            let rhs_val = rhs.generate_ir(builder)?;
            let ret = builder.new_reg();
            builder.append(&format!(
                "  {} = {} {}, {}\n",
                ret,
                op_mnemonic(op),
                lhs_val,
                rhs_val
            ));
            Ok(ret)
        }
    }
}

/// 逻辑与的短路求值：
/// ```text
/// @and_res = alloc i32
/// br (lhs != 0), %and_true, %and_false
/// %and_true:  store (rhs != 0), @and_res; jump %and_end
/// %and_false: store 0, @and_res;          jump %and_end
/// %and_end:   load @and_res
/// ```
fn generate_land_ir(lhs: &Expr, rhs: &Expr, builder: &mut IrBuilder) -> Result<String, CompilerError> {
    let tmp_addr = builder.new_var("and_res");
    builder.append(&format!("  {} = alloc i32\n", tmp_addr));

    let lhs_val = lhs.generate_ir(builder)?;
    let id = builder.alloc_label_id();
    let true_label = builder.new_label("and_true", id);
    let false_label = builder.new_label("and_false", id);
    let end_label = builder.new_label("and_end", id);

    let lhs_bool = builder.new_reg();
    builder.append(&format!("  {} = ne {}, 0\n", lhs_bool, lhs_val));
    builder.append(&format!("  br {}, {}, {}\n", lhs_bool, true_label, false_label));

    builder.append(&format!("{}:\n", true_label));
    let rhs_val = rhs.generate_ir(builder)?;
    let rhs_bool = builder.new_reg();
    builder.append(&format!("  {} = ne {}, 0\n", rhs_bool, rhs_val));
    builder.append(&format!("  store {}, {}\n", rhs_bool, tmp_addr));
    builder.append(&format!("  jump {}\n", end_label));

    builder.append(&format!("{}:\n", false_label));
    builder.append(&format!("  store 0, {}\n", tmp_addr));
    builder.append(&format!("  jump {}\n", end_label));

    builder.append(&format!("{}:\n", end_label));
    let ret = builder.new_reg();
    builder.append(&format!("  {} = load {}\n", ret, tmp_addr));
    Ok(ret)
}

/// 逻辑或的短路求值：左值为真时直接存 1，否则对右值归一化后存入。
fn generate_lor_ir(lhs: &Expr, rhs: &Expr, builder: &mut IrBuilder) -> Result<String, CompilerError> {
    let tmp_addr = builder.new_var("or_res");
    builder.append(&format!("  {} = alloc i32\n", tmp_addr));

    let lhs_val = lhs.generate_ir(builder)?;
    let id = builder.alloc_label_id();
    let true_label = builder.new_label("or_true", id);
    let false_label = builder.new_label("or_false", id);
    let end_label = builder.new_label("or_end", id);

    let lhs_bool = builder.new_reg();
    builder.append(&format!("  {} = ne {}, 0\n", lhs_bool, lhs_val));
    builder.append(&format!("  br {}, {}, {}\n", lhs_bool, true_label, false_label));

    builder.append(&format!("{}:\n", true_label));
    builder.append(&format!("  store 1, {}\n", tmp_addr));
    builder.append(&format!("  jump {}\n", end_label));

    builder.append(&format!("{}:\n", false_label));
    let rhs_val = rhs.generate_ir(builder)?;
    let rhs_bool = builder.new_reg();
    builder.append(&format!("  {} = ne {}, 0\n", rhs_bool, rhs_val));
    builder.append(&format!("  store {}, {}\n", rhs_bool, tmp_addr));
    builder.append(&format!("  jump {}\n", end_label));

    builder.append(&format!("{}:\n", end_label));
    let ret = builder.new_reg();
    builder.append(&format!("  {} = load {}\n", ret, tmp_addr));
    Ok(ret)
}

/// 左值读取。
///
/// - 标量常量直接返回其字面值；
/// - 指针形参先 load 出指针本体，首个下标用 `getptr`，其余用 `getelemptr`；
/// - 走完下标后落在 `i32` 地址上则 load 出值；
/// - 部分下标（或整个数组作实参）时执行数组到指针的退化：
///   `getelemptr addr, 0`；裸指针形参直接返回 load 出的指针。
pub fn generate_lval_ir(lval: &LVal, builder: &mut IrBuilder) -> Result<String, CompilerError> {
    let sym = builder
        .lookup(&lval.name)
        .ok_or_else(|| builder.error_at_span(format!("undefined variable `{}`", lval.name), lval.span))?;

    if sym.is_const && lval.indices.is_empty() && sym.ty.is_int() {
        return Ok(sym.const_value.to_string());
    }

    let mut cur_ptr = sym.ir_name.clone();
    let mut cur_ty = sym.ty.clone();

    if let Some(target) = sym.ty.target() {
        let loaded = builder.new_reg();
        builder.append(&format!("  {} = load {}\n", loaded, cur_ptr));
        cur_ptr = loaded;
        cur_ty = target.clone();
    }

    for (i, index_expr) in lval.indices.iter().enumerate() {
        let idx_val = index_expr.generate_ir(builder)?;
        let nxt_ptr = builder.new_reg();
        if i == 0 && sym.ty.is_ptr() {
            builder.append(&format!("  {} = getptr {}, {}\n", nxt_ptr, cur_ptr, idx_val));
        } else {
            builder.append(&format!("  {} = getelemptr {}, {}\n", nxt_ptr, cur_ptr, idx_val));
            if let Some(elem) = cur_ty.elem().cloned() {
                cur_ty = elem;
            }
        }
        cur_ptr = nxt_ptr;
    }

    let is_bare_ptr_param = sym.ty.is_ptr() && lval.indices.is_empty();

    if cur_ty.is_int() && !is_bare_ptr_param {
        let ret = builder.new_reg();
        builder.append(&format!("  {} = load {}\n", ret, cur_ptr));
        return Ok(ret);
    }

    if is_bare_ptr_param {
        return Ok(cur_ptr);
    }

    // 数组（或其子数组）作为指针使用：退化到首元素地址
    let decay_ptr = builder.new_reg();
    builder.append(&format!("  {} = getelemptr {}, 0\n", decay_ptr, cur_ptr));
    Ok(decay_ptr)
}

pub fn generate_call_ir(
    name: &str,
    args: &[Expr],
    span: Span,
    builder: &mut IrBuilder,
) -> Result<String, CompilerError> {
    let sym = builder
        .lookup(name)
        .ok_or_else(|| builder.error_at_span(format!("undefined function `{}`", name), span))?;
    if sym.kind != SymbolKind::Func {
        return Err(builder.error_at_span(format!("`{}` is not a function", name), span));
    }

    let mut arg_vals = Vec::with_capacity(args.len());
    for arg in args {
        arg_vals.push(arg.generate_ir(builder)?);
    }

    let ret = if sym.ty.is_void() {
        builder.append(&format!("  call @{}(", name));
        String::new()
    } else {
        let ret = builder.new_reg();
        builder.append(&format!("  {} = call @{}(", ret, name));
        ret
    };
    builder.append(&arg_vals.join(", "));
    builder.append(")\n");
    Ok(ret)
}

/// 编译期求值。
///
/// 用于数组维度、全局初始化和局部常量初始化。函数调用与非常量左值
/// 不是常量表达式；`&&`/`||` 采用 C 的逻辑语义并短路；除/模零报错；
/// 其余整数运算按二进制补码回绕。
pub fn calc_value(expr: &Expr, builder: &IrBuilder) -> Result<i32, CompilerError> {
    match expr {
        Expr::Number(n, _) => Ok(*n),
        Expr::Unary(op, rhs, _) => {
            let val = calc_value(rhs, builder)?;
            match op {
                UnaryOp::Neg => Ok(val.wrapping_neg()),
                UnaryOp::Not => Ok((val == 0) as i32),
            }
        }
        Expr::Binary(op, lhs, rhs, span) => {
            let lhs_val = calc_value(lhs, builder)?;
            match op {
                BinaryOp::And => {
                    if lhs_val == 0 {
                        return Ok(0);
                    }
                    Ok((calc_value(rhs, builder)? != 0) as i32)
                }
                BinaryOp::Or => {
                    if lhs_val != 0 {
                        return Ok(1);
                    }
                    Ok((calc_value(rhs, builder)? != 0) as i32)
                }
                _ => {
                    let rhs_val = calc_value(rhs, builder)?;
                    match op {
                        BinaryOp::Add => Ok(lhs_val.wrapping_add(rhs_val)),
                        BinaryOp::Sub => Ok(lhs_val.wrapping_sub(rhs_val)),
                        BinaryOp::Mul => Ok(lhs_val.wrapping_mul(rhs_val)),
                        BinaryOp::Div => {
                            if rhs_val == 0 {
                                return Err(builder.error_at_span(
                                    "division by zero in constant expression",
                                    *span,
                                ));
                            }
                            Ok(lhs_val.wrapping_div(rhs_val))
                        }
                        BinaryOp::Mod => {
                            if rhs_val == 0 {
                                return Err(builder.error_at_span(
                                    "remainder by zero in constant expression",
                                    *span,
                                ));
                            }
                            Ok(lhs_val.wrapping_rem(rhs_val))
                        }
                        BinaryOp::Lt => Ok((lhs_val < rhs_val) as i32),
                        BinaryOp::Gt => Ok((lhs_val > rhs_val) as i32),
                        BinaryOp::Le => Ok((lhs_val <= rhs_val) as i32),
                        BinaryOp::Ge => Ok((lhs_val >= rhs_val) as i32),
                        BinaryOp::Eq => Ok((lhs_val == rhs_val) as i32),
                        BinaryOp::Ne => Ok((lhs_val != rhs_val) as i32),
                        BinaryOp::And | BinaryOp::Or => unreachable!(),
                    }
                }
            }
        }
        Expr::LVal(lval) => {
            if !lval.indices.is_empty() {
                return Err(builder.error_at_span(
                    format!("array element `{}` is not a constant expression", lval.name),
                    lval.span,
                ));
            }
            let sym = builder.symbols().lookup(&lval.name).ok_or_else(|| {
                builder.error_at_span(
                    format!("undefined variable `{}` in constant expression", lval.name),
                    lval.span,
                )
            })?;
            if !sym.is_const || !sym.ty.is_int() {
                return Err(builder.error_at_span(
                    format!("`{}` is not a constant", lval.name),
                    lval.span,
                ));
            }
            Ok(sym.const_value)
        }
        Expr::Call(name, _, span) => Err(builder.error_at_span(
            format!("call to `{}` is not a constant expression", name),
            *span,
        )),
    }
}

/// 构造形参的 IR 类型：标量为 `i32`，数组形参退化为指向其余维度的指针。
pub fn build_param_type(param: &FuncParam, builder: &IrBuilder) -> Result<Ty, CompilerError> {
    if !param.is_array {
        return Ok(Ty::Int);
    }
    let mut base = Ty::Int;
    for dim_expr in param.dims.iter().rev() {
        let dim = calc_value(dim_expr, builder)?;
        if dim <= 0 {
            return Err(builder.error_at_span(
                format!("array dimension of parameter `{}` must be positive", param.name),
                param.span,
            ));
        }
        base = Ty::array_of(base, dim as u32);
    }
    Ok(Ty::ptr_to(base))
}

impl GenerateIR for Expr {
    type Output = String;

    fn generate_ir(&self, builder: &mut IrBuilder) -> Result<Self::Output, CompilerError> {
        match self {
            Expr::Number(n, _) => Ok(n.to_string()),
            Expr::LVal(lval) => generate_lval_ir(lval, builder),
            Expr::Unary(op, rhs, _) => generate_unary_ir(*op, rhs, builder),
            Expr::Binary(op, lhs, rhs, _) => generate_binary_ir(*op, lhs, rhs, builder),
            Expr::Call(name, args, span) => generate_call_ir(name, args, *span, builder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::symbol::SymbolKind;

    fn num(n: i32) -> Expr {
        Expr::Number(n, Span::default())
    }

    fn bin(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs), Span::default())
    }

    #[test]
    fn folds_arithmetic() {
        let builder = IrBuilder::new(None);
        let e = bin(BinaryOp::Add, num(1), bin(BinaryOp::Mul, num(2), num(3)));
        assert_eq!(calc_value(&e, &builder).unwrap(), 7);
        let e = bin(BinaryOp::Mod, num(10), num(4));
        assert_eq!(calc_value(&e, &builder).unwrap(), 2);
        let e = Expr::Unary(UnaryOp::Neg, Box::new(num(5)), Span::default());
        assert_eq!(calc_value(&e, &builder).unwrap(), -5);
        let e = Expr::Unary(UnaryOp::Not, Box::new(num(0)), Span::default());
        assert_eq!(calc_value(&e, &builder).unwrap(), 1);
    }

    #[test]
    fn folds_logic_with_c_semantics() {
        let builder = IrBuilder::new(None);
        let e = bin(BinaryOp::And, num(3), num(2));
        assert_eq!(calc_value(&e, &builder).unwrap(), 1);
        let e = bin(BinaryOp::Or, num(0), num(0));
        assert_eq!(calc_value(&e, &builder).unwrap(), 0);
        // 左侧已决定结果时不再求值右侧，右侧的除零不报错
        let div0 = bin(BinaryOp::Div, num(1), num(0));
        let e = bin(BinaryOp::And, num(0), div0);
        assert_eq!(calc_value(&e, &builder).unwrap(), 0);
    }

    #[test]
    fn rejects_division_by_zero() {
        let builder = IrBuilder::new(None);
        let e = bin(BinaryOp::Div, num(1), num(0));
        assert!(matches!(calc_value(&e, &builder), Err(CompilerError::SemanticError(_))));
        let e = bin(BinaryOp::Mod, num(1), num(0));
        assert!(matches!(calc_value(&e, &builder), Err(CompilerError::SemanticError(_))));
    }

    #[test]
    fn wrapping_overflow() {
        let builder = IrBuilder::new(None);
        let e = bin(BinaryOp::Add, num(i32::MAX), num(1));
        assert_eq!(calc_value(&e, &builder).unwrap(), i32::MIN);
        let e = bin(BinaryOp::Div, num(i32::MIN), num(-1));
        assert_eq!(calc_value(&e, &builder).unwrap(), i32::MIN);
    }

    #[test]
    fn reads_constants_from_symbol_table() {
        let mut builder = IrBuilder::new(None);
        builder
            .symbols_mut()
            .define("N", "", Ty::Int, SymbolKind::Var, true, 10)
            .unwrap();
        let e = Expr::LVal(LVal {
            name: "N".to_string(),
            indices: vec![],
            span: Span::default(),
        });
        assert_eq!(calc_value(&e, &builder).unwrap(), 10);
    }

    #[test]
    fn rejects_calls_and_variables() {
        let mut builder = IrBuilder::new(None);
        builder
            .symbols_mut()
            .define("x", "@x_0", Ty::Int, SymbolKind::Var, false, 0)
            .unwrap();
        let var = Expr::LVal(LVal {
            name: "x".to_string(),
            indices: vec![],
            span: Span::default(),
        });
        assert!(calc_value(&var, &builder).is_err());
        let call = Expr::Call("getint".to_string(), vec![], Span::default());
        assert!(calc_value(&call, &builder).is_err());
    }
}
