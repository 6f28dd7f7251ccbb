//! Human-readable prototype listing, in the layout of `luac -l -l`

use std::fmt::Write;

use super::{Constant, Prototype};
use crate::lua::instruction::Instruction;
use crate::lua::opcodes::{OpArgMode, OpMode};
use crate::lua::value::Value;

/// Render `proto` and every nested prototype
pub fn listing(proto: &Prototype) -> String {
    let mut out = String::new();
    write_proto(&mut out, proto);
    out
}

fn write_proto(out: &mut String, proto: &Prototype) {
    write_header(out, proto);
    write_code(out, proto);
    write_detail(out, proto);
    for nested in &proto.protos {
        write_proto(out, nested);
    }
}

fn write_header(out: &mut String, proto: &Prototype) {
    let kind = if proto.line_defined > 0 { "function" } else { "main" };
    let vararg = if proto.is_vararg { "+" } else { "" };

    let _ = writeln!(
        out,
        "\n{} <{}:{},{}> ({} instructions)",
        kind,
        proto.source,
        proto.line_defined,
        proto.last_line_defined,
        proto.code.len()
    );
    let _ = writeln!(
        out,
        "{}{} params, {} slots, {} upvalues, {} locals, {} constants, {} functions",
        proto.num_params,
        vararg,
        proto.max_stack_size,
        proto.upvalues.len(),
        proto.loc_vars.len(),
        proto.constants.len(),
        proto.protos.len()
    );
}

fn write_code(out: &mut String, proto: &Prototype) {
    for (pc, word) in proto.code.iter().enumerate() {
        let line = proto
            .line_info
            .get(pc)
            .map_or_else(|| "-".to_string(), |l| l.to_string());
        let i = Instruction(*word);
        let name = i.info().map_or("UNKNOWN", |info| info.name);
        let _ = writeln!(out, "\t{}\t[{}]\t{:<9}\t{}", pc + 1, line, name, operands(i));
    }
}

/// RK operands naming a constant print as `-1-index`
fn rk(arg: usize) -> i64 {
    if arg > 0xff {
        -1 - (arg & 0xff) as i64
    } else {
        arg as i64
    }
}

fn operands(i: Instruction) -> String {
    let Some(info) = i.info() else {
        return format!("{:#010x}", i.0);
    };

    match info.mode {
        OpMode::ABC => {
            let (a, b, c) = i.abc();
            let mut s = a.to_string();
            if info.arg_b_mode != OpArgMode::N {
                let _ = write!(s, " {}", rk(b));
            }
            if info.arg_c_mode != OpArgMode::N {
                let _ = write!(s, " {}", rk(c));
            }
            s
        }
        OpMode::ABx => {
            let (a, bx) = i.abx();
            match info.arg_b_mode {
                OpArgMode::K => format!("{} {}", a, -1 - bx as i64),
                OpArgMode::U => format!("{} {}", a, bx),
                _ => a.to_string(),
            }
        }
        OpMode::AsBx => {
            let (a, sbx) = i.asbx();
            format!("{} {}", a, sbx)
        }
        OpMode::Ax => (-1 - i.ax() as i64).to_string(),
    }
}

fn constant(k: &Constant) -> String {
    match k {
        Constant::String(s) => format!("{:?}", s.to_str_lossy()),
        other => Value::from(other).to_string(),
    }
}

fn write_detail(out: &mut String, proto: &Prototype) {
    let _ = writeln!(out, "constants ({}):", proto.constants.len());
    for (i, k) in proto.constants.iter().enumerate() {
        let _ = writeln!(out, "\t{}\t{}", i + 1, constant(k));
    }

    let _ = writeln!(out, "locals ({}):", proto.loc_vars.len());
    for (i, var) in proto.loc_vars.iter().enumerate() {
        let _ = writeln!(out, "\t{}\t{}\t{}\t{}", i, var.name, var.start_pc + 1, var.end_pc + 1);
    }

    let _ = writeln!(out, "upvalues ({}):", proto.upvalues.len());
    for (i, up) in proto.upvalues.iter().enumerate() {
        let name = proto.upvalue_names.get(i).map_or("-", String::as_str);
        let _ = writeln!(out, "\t{}\t{}\t{}\t{}", i, name, u8::from(up.in_stack), up.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{LocVar, UpvalueDesc};
    use crate::lua::instruction::rk_as_k;
    use crate::lua::opcodes::OpCode;

    fn sample() -> Prototype {
        let inner = Prototype {
            source: "@demo.lua".to_string(),
            line_defined: 2,
            last_line_defined: 4,
            max_stack_size: 2,
            code: vec![Instruction::encode_abc(OpCode::Return, 0, 1, 0).0],
            ..Prototype::default()
        };
        Prototype {
            source: "@demo.lua".to_string(),
            is_vararg: true,
            max_stack_size: 3,
            code: vec![
                Instruction::encode_abx(OpCode::LoadK, 0, 0).0,
                Instruction::encode_abc(OpCode::Add, 1, 0, rk_as_k(1)).0,
                Instruction::encode_asbx(OpCode::Jmp, 0, -2).0,
                Instruction::encode_abc(OpCode::Return, 0, 1, 0).0,
            ],
            constants: vec![Constant::String("hi".into()), Constant::Number(0.5)],
            upvalues: vec![UpvalueDesc { in_stack: true, index: 0 }],
            upvalue_names: vec!["_ENV".to_string()],
            line_info: vec![1, 1, 2, 5],
            loc_vars: vec![LocVar { name: "x".to_string(), start_pc: 1, end_pc: 4 }],
            protos: vec![inner.into()],
            ..Prototype::default()
        }
    }

    #[test]
    fn test_header_counts() {
        let text = listing(&sample());
        assert!(text.contains("main <@demo.lua:0,0> (4 instructions)"));
        assert!(text.contains("0+ params, 3 slots, 1 upvalues, 1 locals, 2 constants, 1 functions"));
        assert!(text.contains("function <@demo.lua:2,4> (1 instructions)"));
    }

    #[test]
    fn test_operands_and_detail() {
        let text = listing(&sample());
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines.contains(&"\t1\t[1]\tLOADK    \t0 -1"));
        assert!(lines.contains(&"\t2\t[1]\tADD      \t1 0 -2"));
        assert!(lines.contains(&"\t3\t[2]\tJMP      \t0 -2"));
        assert!(lines.contains(&"\t1\t\"hi\""));
        assert!(lines.contains(&"\t0\tx\t2\t5"));
        assert!(lines.contains(&"\t0\t_ENV\t1\t0"));
    }
}
