//! # 汇编代码生成模块
//!
//! 把解析后的 Koopa IR 程序翻译为 RISC-V 汇编。
//!
//! ## 代码生成策略
//!
//! - 每个函数先做一遍预扫描：为所有产生结果的指令分配栈槽、
//!   统计是否需要保存 ra 以及出参区大小，然后才发射指令；
//! - 所有值都落在栈上：计算时把操作数装入 t0/t1，结果写回自己的槽；
//! - t2 为保留 scratch 寄存器，只用于物化大立即数与 getelemptr 的步长，
//!   绝不作为其他指令的操作数；
//! - call 的返回值在 a0，由分发器统一写回栈槽。

use koopa::ir::entities::ValueData;
use koopa::ir::values::{Binary, Branch, Call, GetElemPtr, GetPtr, Jump, Load, Return, Store};
use koopa::ir::{BasicBlock, BinaryOp, FunctionData, Program, Type, TypeKind, Value, ValueKind};

use crate::back::context::Context;
use crate::back::insts::{Instruction, Reg, ARG_REGS};
use crate::back::utils::{emit_addi, emit_lw, emit_sw};
use crate::CompilerError;

pub trait GenerateAsm {
    fn generate(&self, program: &Program, ctx: &mut Context) -> Result<(), CompilerError>;
}

impl GenerateAsm for Program {
    fn generate(&self, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
        // 全局变量：.data 段
        for global_var in self.inst_layout() {
            generate_global_alloc(*global_var, program, ctx)?;
        }

        // 函数：.text 段；声明没有基本块，跳过
        for &func in self.func_layout() {
            let func_data = self.func(func);
            if func_data.layout().entry_bb().is_none() {
                continue;
            }
            func_data.generate(program, ctx)?;
        }
        Ok(())
    }
}

impl GenerateAsm for FunctionData {
    fn generate(&self, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
        let name = self.name()[1..].to_string();
        ctx.reset_for_function();
        ctx.program.push(Instruction::Section(".text".to_string()));
        ctx.program.push(Instruction::Globl(name.clone()));
        ctx.program.push(Instruction::Label(name.clone()));

        // --- 预扫描：栈帧计算 ---
        for (_bb, node) in self.layout().bbs() {
            for &inst in node.insts().keys() {
                let value_data = self.dfg().value(inst);

                if let ValueKind::Call(call) = value_data.kind() {
                    ctx.has_callee = true;
                    ctx.ra_size = 4;
                    ctx.max_call_args = ctx.max_call_args.max(call.args().len());
                }

                if value_data.ty().is_unit() {
                    continue;
                }
                // 产生结果的指令各占 4 字节；alloc 按被分配对象的大小保留
                let size = if let ValueKind::Alloc(_) = value_data.kind() {
                    alloc_size(value_data)?
                } else {
                    4
                };
                ctx.alloc_slot(inst, size);
            }
        }
        ctx.finalize_frame();
        let total = ctx.total_frame_size;

        // --- 基本块标签 ---
        // 首块沿用函数标签；其余块用 函数名_bbN，跨函数不会重名
        let mut bb_index = 0;
        for (bb, _node) in self.layout().bbs() {
            let label = if bb_index == 0 {
                name.clone()
            } else {
                format!("{}_bb{}", name, bb_index - 1)
            };
            ctx.bb_label_map.insert(*bb, label);
            bb_index += 1;
        }

        // --- prologue ---
        if total > 0 {
            emit_addi(ctx, Reg::Sp, Reg::Sp, -total);
        }
        if ctx.has_callee {
            emit_sw(ctx, Reg::Ra, Reg::Sp, total - 4);
        }

        // --- 形参绑定 ---
        // 前 8 个从 a0-a7 拷入自己的栈槽；其余直接别名到调用者出参区
        for (i, &param) in self.params().iter().enumerate() {
            if i < 8 {
                let offset = i as i32 * 4 + ctx.args_size;
                ctx.slot_map.insert(param, offset);
                emit_sw(ctx, ARG_REGS[i], Reg::Sp, offset);
            } else {
                let offset = total + (i as i32 - 8) * 4;
                ctx.slot_map.insert(param, offset);
            }
        }

        // --- 函数体 ---
        let mut bb_iter_index = 0;
        for (bb, node) in self.layout().bbs() {
            if bb_iter_index > 0 {
                let label = bb_label(*bb, ctx)?;
                ctx.program.push(Instruction::Label(label));
            }
            bb_iter_index += 1;
            for &inst in node.insts().keys() {
                generate_inst(inst, self, program, ctx)?;
            }
        }
        Ok(())
    }
}

/// 指令分发。有结果的指令把值算到 t0（call 为 a0），再统一写回栈槽。
fn generate_inst(
    inst: Value,
    func: &FunctionData,
    program: &Program,
    ctx: &mut Context,
) -> Result<(), CompilerError> {
    let value_data = func.dfg().value(inst);
    match value_data.kind() {
        // alloc 的空间在预扫描阶段已经保留
        ValueKind::Alloc(_) => Ok(()),
        ValueKind::Load(load) => generate_load(inst, load, func, ctx),
        ValueKind::Store(store) => generate_store(store, func, ctx),
        ValueKind::GetElemPtr(gep) => generate_get_elem_ptr(inst, gep, func, program, ctx),
        ValueKind::GetPtr(gp) => generate_get_ptr(inst, gp, func, program, ctx),
        ValueKind::Binary(binary) => generate_binary(inst, binary, func, ctx),
        ValueKind::Branch(branch) => generate_branch(branch, func, ctx),
        ValueKind::Jump(jump) => generate_jump(jump, ctx),
        ValueKind::Call(call) => generate_call(inst, call, func, program, ctx),
        ValueKind::Return(ret) => generate_return(ret, func, ctx),
        kind => Err(CompilerError::CodeGenerationError(format!(
            "unhandled value kind in instruction dispatch: {:?}",
            kind
        ))),
    }
}

/// 把一个 IR 值装入指定寄存器。
///
/// - 整数常量：li
/// - 全局 alloc：la 取地址
/// - 局部 alloc：addi reg, sp, slot（取地址）
/// - 其余指令结果与形参引用：lw 从栈槽取值
fn load_to(value: Value, reg: Reg, func: &FunctionData, ctx: &mut Context) -> Result<(), CompilerError> {
    if let Some(name) = ctx.global_map.get(&value).cloned() {
        ctx.program.push(Instruction::La(reg, name));
        return Ok(());
    }
    let value_data = func.dfg().value(value);
    match value_data.kind() {
        ValueKind::Integer(i) => {
            ctx.program.push(Instruction::Li(reg, i.value()));
            Ok(())
        }
        ValueKind::Alloc(_) => {
            let offset = slot_of(value, ctx)?;
            emit_addi(ctx, reg, Reg::Sp, offset);
            Ok(())
        }
        _ => {
            let offset = slot_of(value, ctx)?;
            emit_lw(ctx, reg, Reg::Sp, offset);
            Ok(())
        }
    }
}

fn slot_of(value: Value, ctx: &Context) -> Result<i32, CompilerError> {
    ctx.slot_map.get(&value).copied().ok_or_else(|| {
        CompilerError::CodeGenerationError("no stack slot recorded for value".to_string())
    })
}

fn bb_label(bb: BasicBlock, ctx: &Context) -> Result<String, CompilerError> {
    ctx.bb_label_map.get(&bb).cloned().ok_or_else(|| {
        CompilerError::CodeGenerationError("basic block has no label".to_string())
    })
}

/// 把 `from` 中的结果写回指令自己的栈槽（Unit 类型的指令没有槽）。
fn store_result(
    inst: Value,
    from: Reg,
    func: &FunctionData,
    ctx: &mut Context,
) -> Result<(), CompilerError> {
    if func.dfg().value(inst).ty().is_unit() {
        return Ok(());
    }
    let offset = slot_of(inst, ctx)?;
    emit_sw(ctx, from, Reg::Sp, offset);
    Ok(())
}

fn generate_load(
    inst: Value,
    load: &Load,
    func: &FunctionData,
    ctx: &mut Context,
) -> Result<(), CompilerError> {
    load_to(load.src(), Reg::T0, func, ctx)?;
    ctx.program.push(Instruction::Lw(Reg::T0, 0, Reg::T0));
    store_result(inst, Reg::T0, func, ctx)
}

fn generate_store(store: &Store, func: &FunctionData, ctx: &mut Context) -> Result<(), CompilerError> {
    load_to(store.value(), Reg::T0, func, ctx)?;
    load_to(store.dest(), Reg::T1, func, ctx)?;
    ctx.program.push(Instruction::Sw(Reg::T0, 0, Reg::T1));
    Ok(())
}

fn generate_branch(branch: &Branch, func: &FunctionData, ctx: &mut Context) -> Result<(), CompilerError> {
    load_to(branch.cond(), Reg::T0, func, ctx)?;
    let true_label = bb_label(branch.true_bb(), ctx)?;
    let false_label = bb_label(branch.false_bb(), ctx)?;
    ctx.program.push(Instruction::Bnez(Reg::T0, true_label));
    ctx.program.push(Instruction::J(false_label));
    Ok(())
}

fn generate_jump(jump: &Jump, ctx: &mut Context) -> Result<(), CompilerError> {
    let target_label = bb_label(jump.target(), ctx)?;
    ctx.program.push(Instruction::J(target_label));
    Ok(())
}

/// RV32 调用约定：前 8 个实参经 a0-a7，其余放在当前帧最低处的出参区。
fn generate_call(
    inst: Value,
    call: &Call,
    func: &FunctionData,
    program: &Program,
    ctx: &mut Context,
) -> Result<(), CompilerError> {
    for (i, &arg) in call.args().iter().enumerate() {
        if i < 8 {
            load_to(arg, ARG_REGS[i], func, ctx)?;
        } else {
            load_to(arg, Reg::T0, func, ctx)?;
            emit_sw(ctx, Reg::T0, Reg::Sp, (i as i32 - 8) * 4);
        }
    }
    let callee_name = program.func(call.callee()).name()[1..].to_string();
    ctx.program.push(Instruction::Call(callee_name));
    // 有返回值时 a0 写回本指令的栈槽
    store_result(inst, Reg::A0, func, ctx)
}

fn generate_return(ret: &Return, func: &FunctionData, ctx: &mut Context) -> Result<(), CompilerError> {
    if let Some(value) = ret.value() {
        load_to(value, Reg::A0, func, ctx)?;
    }
    let total = ctx.total_frame_size;
    if ctx.ra_size > 0 {
        emit_lw(ctx, Reg::Ra, Reg::Sp, total - 4);
    }
    if total > 0 {
        emit_addi(ctx, Reg::Sp, Reg::Sp, total);
    }
    ctx.program.push(Instruction::Ret);
    Ok(())
}

fn generate_binary(
    inst: Value,
    binary: &Binary,
    func: &FunctionData,
    ctx: &mut Context,
) -> Result<(), CompilerError> {
    load_to(binary.lhs(), Reg::T0, func, ctx)?;
    load_to(binary.rhs(), Reg::T1, func, ctx)?;

    let (t0, t1) = (Reg::T0, Reg::T1);
    match binary.op() {
        BinaryOp::Add => ctx.program.push(Instruction::Add(t0, t0, t1)),
        BinaryOp::Sub => ctx.program.push(Instruction::Sub(t0, t0, t1)),
        BinaryOp::Mul => ctx.program.push(Instruction::Mul(t0, t0, t1)),
        BinaryOp::Div => ctx.program.push(Instruction::Div(t0, t0, t1)),
        BinaryOp::Mod => ctx.program.push(Instruction::Rem(t0, t0, t1)),
        BinaryOp::And => ctx.program.push(Instruction::And(t0, t0, t1)),
        BinaryOp::Or => ctx.program.push(Instruction::Or(t0, t0, t1)),
        BinaryOp::Xor => ctx.program.push(Instruction::Xor(t0, t0, t1)),
        BinaryOp::Shl => ctx.program.push(Instruction::Sll(t0, t0, t1)),
        BinaryOp::Shr => ctx.program.push(Instruction::Srl(t0, t0, t1)),
        BinaryOp::Sar => ctx.program.push(Instruction::Sra(t0, t0, t1)),
        BinaryOp::Lt => ctx.program.push(Instruction::Slt(t0, t0, t1)),
        BinaryOp::Gt => ctx.program.push(Instruction::Sgt(t0, t0, t1)),
        BinaryOp::Le => {
            ctx.program.push(Instruction::Sgt(t0, t0, t1));
            ctx.program.push(Instruction::Seqz(t0, t0));
        }
        BinaryOp::Ge => {
            ctx.program.push(Instruction::Slt(t0, t0, t1));
            ctx.program.push(Instruction::Seqz(t0, t0));
        }
        BinaryOp::Eq => {
            ctx.program.push(Instruction::Xor(t0, t0, t1));
            ctx.program.push(Instruction::Seqz(t0, t0));
        }
        BinaryOp::NotEq => {
            ctx.program.push(Instruction::Xor(t0, t0, t1));
            ctx.program.push(Instruction::Snez(t0, t0));
        }
    }
    store_result(inst, Reg::T0, func, ctx)
}

fn generate_get_elem_ptr(
    inst: Value,
    gep: &GetElemPtr,
    func: &FunctionData,
    program: &Program,
    ctx: &mut Context,
) -> Result<(), CompilerError> {
    load_to(gep.src(), Reg::T0, func, ctx)?;
    load_to(gep.index(), Reg::T1, func, ctx)?;

    // 步长 = 被指数组的元素大小
    let src_ty = pointee_ty(gep.src(), func, program, ctx)?;
    let stride = match src_ty.kind() {
        TypeKind::Array(elem, _) => elem.size() as i32,
        _ => {
            return Err(CompilerError::CodeGenerationError(format!(
                "getelemptr source is not a pointer to array: {:?}",
                src_ty
            )))
        }
    };

    ctx.program.push(Instruction::Li(Reg::T2, stride));
    ctx.program.push(Instruction::Mul(Reg::T1, Reg::T1, Reg::T2));
    ctx.program.push(Instruction::Add(Reg::T0, Reg::T0, Reg::T1));
    store_result(inst, Reg::T0, func, ctx)
}

fn generate_get_ptr(
    inst: Value,
    gp: &GetPtr,
    func: &FunctionData,
    program: &Program,
    ctx: &mut Context,
) -> Result<(), CompilerError> {
    load_to(gp.src(), Reg::T0, func, ctx)?;
    load_to(gp.index(), Reg::T1, func, ctx)?;

    // 步长 = 指针所指对象的大小
    let stride = pointee_ty(gp.src(), func, program, ctx)?.size() as i32;

    ctx.program.push(Instruction::Li(Reg::T2, stride));
    ctx.program.push(Instruction::Mul(Reg::T1, Reg::T1, Reg::T2));
    ctx.program.push(Instruction::Add(Reg::T0, Reg::T0, Reg::T1));
    store_result(inst, Reg::T0, func, ctx)
}

/// 取指针类型值的被指类型；源可能是全局值，也可能在当前函数的 dfg 里。
fn pointee_ty(
    value: Value,
    func: &FunctionData,
    program: &Program,
    ctx: &Context,
) -> Result<Type, CompilerError> {
    let ty = if ctx.global_map.contains_key(&value) {
        program.borrow_value(value).ty().clone()
    } else {
        func.dfg().value(value).ty().clone()
    };
    match ty.kind() {
        TypeKind::Pointer(base) => Ok(base.clone()),
        _ => Err(CompilerError::CodeGenerationError(format!(
            "pointer arithmetic on non-pointer type: {:?}",
            ty
        ))),
    }
}

fn alloc_size(value_data: &ValueData) -> Result<i32, CompilerError> {
    match value_data.ty().kind() {
        TypeKind::Pointer(base) => Ok(base.size() as i32),
        _ => Err(CompilerError::CodeGenerationError(format!(
            "alloc value has non-pointer type: {:?}",
            value_data.ty()
        ))),
    }
}

/// 全局变量：.data 段、.global、标签与初始化数据。
fn generate_global_alloc(
    value: Value,
    program: &Program,
    ctx: &mut Context,
) -> Result<(), CompilerError> {
    let init = {
        let value_data = program.borrow_value(value);
        let ga = match value_data.kind() {
            ValueKind::GlobalAlloc(ga) => ga,
            _ => return Ok(()),
        };

        let name_with_at = value_data.name().clone().ok_or_else(|| {
            CompilerError::CodeGenerationError("global variable has no name".to_string())
        })?;
        // IR 里全局名形如 @g_x；汇编符号去掉前缀
        let var_name = if let Some(stripped) = name_with_at.strip_prefix("@g_") {
            stripped.to_string()
        } else if let Some(stripped) = name_with_at.strip_prefix('@') {
            stripped.to_string()
        } else {
            name_with_at
        };

        ctx.global_map.insert(value, var_name.clone());
        ctx.program.push(Instruction::Section(".data".to_string()));
        ctx.program.push(Instruction::Global(var_name.clone()));
        ctx.program.push(Instruction::Label(var_name));
        ga.init()
    };
    emit_global_init(init, program, ctx)
}

fn emit_global_init(value: Value, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
    let elems: Vec<Value>;
    {
        let value_data = program.borrow_value(value);
        match value_data.kind() {
            ValueKind::Integer(i) => {
                ctx.program.push(Instruction::Word(i.value()));
                return Ok(());
            }
            ValueKind::ZeroInit(_) => {
                ctx.program.push(Instruction::Zero(value_data.ty().size() as i32));
                return Ok(());
            }
            ValueKind::Aggregate(agg) => {
                elems = agg.elems().to_vec();
            }
            kind => {
                return Err(CompilerError::CodeGenerationError(format!(
                    "unsupported global initialiser: {:?}",
                    kind
                )))
            }
        }
    }
    for elem in elems {
        emit_global_init(elem, program, ctx)?;
    }
    Ok(())
}
