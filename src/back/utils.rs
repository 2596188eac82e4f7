use crate::back::context::Context;
use crate::back::insts::{Instruction, Reg};

/// RISC-V I 型指令的立即数范围
pub fn in_imm12_range(value: i32) -> bool {
    (-2048..=2047).contains(&value)
}

/// 12 位安全的 addi：越界时经由 t2 物化立即数。
/// t2 是保留寄存器，调用方不得把它用作其他指令的操作数。
pub fn emit_addi(ctx: &mut Context, rd: Reg, rs: Reg, imm: i32) {
    if in_imm12_range(imm) {
        ctx.program.push(Instruction::Addi(rd, rs, imm));
    } else {
        ctx.program.push(Instruction::Li(Reg::T2, imm));
        ctx.program.push(Instruction::Add(rd, rs, Reg::T2));
    }
}

/// 12 位安全的 lw
pub fn emit_lw(ctx: &mut Context, rd: Reg, base: Reg, offset: i32) {
    if in_imm12_range(offset) {
        ctx.program.push(Instruction::Lw(rd, offset, base));
    } else {
        ctx.program.push(Instruction::Li(Reg::T2, offset));
        ctx.program.push(Instruction::Add(Reg::T2, Reg::T2, base));
        ctx.program.push(Instruction::Lw(rd, 0, Reg::T2));
    }
}

/// 12 位安全的 sw
pub fn emit_sw(ctx: &mut Context, src: Reg, base: Reg, offset: i32) {
    if in_imm12_range(offset) {
        ctx.program.push(Instruction::Sw(src, offset, base));
    } else {
        ctx.program.push(Instruction::Li(Reg::T2, offset));
        ctx.program.push(Instruction::Add(Reg::T2, Reg::T2, base));
        ctx.program.push(Instruction::Sw(src, 0, Reg::T2));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imm12_boundaries() {
        assert!(in_imm12_range(-2048));
        assert!(in_imm12_range(2047));
        assert!(!in_imm12_range(2048));
        assert!(!in_imm12_range(-2049));
    }

    #[test]
    fn addi_windows_large_immediates() {
        let mut ctx = Context::new();
        emit_addi(&mut ctx, Reg::Sp, Reg::Sp, -2048);
        assert_eq!(ctx.program.dump(), "  addi sp, sp, -2048\n");

        let mut ctx = Context::new();
        emit_addi(&mut ctx, Reg::Sp, Reg::Sp, -2064);
        assert_eq!(ctx.program.dump(), "  li t2, -2064\n  add sp, sp, t2\n");
    }

    #[test]
    fn lw_sw_window_large_offsets() {
        let mut ctx = Context::new();
        emit_lw(&mut ctx, Reg::T0, Reg::Sp, 2047);
        assert_eq!(ctx.program.dump(), "  lw t0, 2047(sp)\n");

        let mut ctx = Context::new();
        emit_sw(&mut ctx, Reg::T0, Reg::Sp, 2048);
        assert_eq!(
            ctx.program.dump(),
            "  li t2, 2048\n  add t2, t2, sp\n  sw t0, 0(t2)\n"
        );
    }
}
