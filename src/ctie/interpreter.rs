//! A stack machine that interprets MIR directly, used to execute pure
//! functions on constant arguments at compile time.

use crate::error::{Error, Result};
use crate::mir::{BinOp, Instr, LabelId, MirFunction, MirModule, Reg, UnOp};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(*b as i64),
            Value::Str(_) => None,
        }
    }
}

/// Hard limits enforced per top-level eligible call. Exceeding either
/// revokes eligibility for that call rather than failing the whole
/// compilation.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    pub max_instructions: u64,
    pub max_depth: u32,
}

impl Default for Budget {
    fn default() -> Self {
        Self { max_instructions: 100_000, max_depth: 256 }
    }
}

/// Strings emitted via the `@emit` compile-time-block intrinsic, which the
/// interpreter special-cases as a host call rather than a real function.
pub const EMIT_INTRINSIC: &str = "@emit";

pub struct Interpreter<'m> {
    module: &'m MirModule,
    budget: Budget,
    instructions_run: u64,
    pub emitted: Vec<String>,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m MirModule, budget: Budget) -> Self {
        Self { module, budget, instructions_run: 0, emitted: Vec::new() }
    }

    pub fn run(&mut self, function: &str, args: &[Value]) -> Result<Option<Value>> {
        self.call(function, args, 0)
    }

    fn call(&mut self, name: &str, args: &[Value], depth: u32) -> Result<Option<Value>> {
        if depth > self.budget.max_depth {
            return Err(Error::CTIEBudgetExceeded { function: name.to_string() });
        }
        let f = self
            .module
            .functions
            .get(name)
            .ok_or_else(|| Error::CTIETrap { function: name.to_string(), message: "unknown function".into() })?;

        let mut frame: HashMap<Reg, Value> = HashMap::new();
        for ((reg, _ty), arg) in f.params.iter().zip(args.iter()) {
            frame.insert(*reg, arg.clone());
        }

        self.exec_body(f, &mut frame, depth)
    }

    fn exec_body(
        &mut self,
        f: &MirFunction,
        frame: &mut HashMap<Reg, Value>,
        depth: u32,
    ) -> Result<Option<Value>> {
        let labels: HashMap<LabelId, usize> = f
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(i, instr)| match instr {
                Instr::Label(id) => Some((*id, i)),
                _ => None,
            })
            .collect();

        let mut pc = 0usize;
        while pc < f.instructions.len() {
            self.instructions_run += 1;
            if self.instructions_run > self.budget.max_instructions {
                return Err(Error::CTIEBudgetExceeded { function: f.name.clone() });
            }

            let trap = |msg: &str| Error::CTIETrap { function: f.name.clone(), message: msg.to_string() };

            match &f.instructions[pc] {
                Instr::ConstInt { dst, value, .. } => {
                    frame.insert(*dst, Value::Int(*value));
                }
                Instr::ConstBool { dst, value } => {
                    frame.insert(*dst, Value::Bool(*value));
                }
                Instr::ConstString { dst, value } => {
                    frame.insert(*dst, Value::Str(value.clone()));
                }
                Instr::Move { dst, src } => {
                    let v = frame.get(src).cloned().ok_or_else(|| trap("read of undefined register"))?;
                    frame.insert(*dst, v);
                }
                Instr::Bin { dst, op, lhs, rhs, .. } => {
                    let l = frame.get(lhs).cloned().ok_or_else(|| trap("read of undefined register"))?;
                    let r = frame.get(rhs).cloned().ok_or_else(|| trap("read of undefined register"))?;
                    let v = eval_bin(*op, &l, &r).map_err(|_| trap("arithmetic trap"))?;
                    frame.insert(*dst, v);
                }
                Instr::Un { dst, op, operand, .. } => {
                    let o = frame.get(operand).cloned().ok_or_else(|| trap("read of undefined register"))?;
                    frame.insert(*dst, eval_un(*op, &o));
                }
                Instr::LoadVar { dst, var } => {
                    let v = frame.get(var).cloned().ok_or_else(|| trap("read of undefined variable"))?;
                    frame.insert(*dst, v);
                }
                Instr::StoreVar { var, src } => {
                    let v = frame.get(src).cloned().ok_or_else(|| trap("read of undefined register"))?;
                    frame.insert(*var, v);
                }
                Instr::Label(_) | Instr::Nop => {}
                Instr::Jump(target) => {
                    pc = *labels.get(target).ok_or_else(|| trap("jump to unknown label"))?;
                    continue;
                }
                Instr::JumpIfTrue { cond, target } => {
                    let c = frame.get(cond).and_then(Value::as_int).ok_or_else(|| trap("undefined condition"))?;
                    if c != 0 {
                        pc = *labels.get(target).ok_or_else(|| trap("jump to unknown label"))?;
                        continue;
                    }
                }
                Instr::JumpIfFalse { cond, target } => {
                    let c = frame.get(cond).and_then(Value::as_int).ok_or_else(|| trap("undefined condition"))?;
                    if c == 0 {
                        pc = *labels.get(target).ok_or_else(|| trap("jump to unknown label"))?;
                        continue;
                    }
                }
                Instr::Call { dst, callee, args } => {
                    let arg_values: Vec<Value> = args
                        .iter()
                        .map(|r| frame.get(r).cloned().ok_or_else(|| trap("read of undefined register")))
                        .collect::<Result<_>>()?;
                    if callee == EMIT_INTRINSIC {
                        if let Some(Value::Str(s)) = arg_values.first() {
                            self.emitted.push(s.clone());
                        }
                    } else {
                        let result = self.call(callee, &arg_values, depth + 1)?;
                        if let (Some(d), Some(v)) = (dst, result) {
                            frame.insert(*d, v);
                        }
                    }
                }
                Instr::Return(reg) => {
                    return Ok(reg.and_then(|r| frame.get(&r).cloned()));
                }
                Instr::Halt => return Ok(None),
                other => return Err(trap(&format!("unsupported in compile-time execution: {:?}", other))),
            }
            pc += 1;
        }
        Ok(None)
    }
}

fn eval_bin(op: BinOp, l: &Value, r: &Value) -> std::result::Result<Value, ()> {
    if let (Some(a), Some(b)) = (l.as_int(), r.as_int()) {
        let v = match op {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::Div => {
                if b == 0 {
                    return Err(());
                }
                a.wrapping_div(b)
            }
            BinOp::Mod => {
                if b == 0 {
                    return Err(());
                }
                a.wrapping_rem(b)
            }
            BinOp::Eq => return Ok(Value::Bool(a == b)),
            BinOp::Ne => return Ok(Value::Bool(a != b)),
            BinOp::Lt => return Ok(Value::Bool(a < b)),
            BinOp::Le => return Ok(Value::Bool(a <= b)),
            BinOp::Gt => return Ok(Value::Bool(a > b)),
            BinOp::Ge => return Ok(Value::Bool(a >= b)),
            BinOp::And => a & b,
            BinOp::Or => a | b,
            BinOp::Xor => a ^ b,
            BinOp::Shl => a.wrapping_shl(b as u32),
            BinOp::Shr => a.wrapping_shr(b as u32),
        };
        Ok(Value::Int(v))
    } else {
        Err(())
    }
}

fn eval_un(op: UnOp, v: &Value) -> Value {
    match (op, v.as_int()) {
        (UnOp::Neg, Some(n)) => Value::Int(-n),
        (UnOp::Not, Some(n)) => Value::Bool(n == 0),
        (UnOp::BitNot, Some(n)) => Value::Int(!n),
        _ => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn interprets_simple_arithmetic() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("add", Type::u8());
        let r0 = f.fresh_reg();
        let r1 = f.fresh_reg();
        let r2 = f.fresh_reg();
        f.params = vec![(r0, Type::u8()), (r1, Type::u8())];
        f.push(Instr::Bin { dst: r2, op: BinOp::Add, lhs: r0, rhs: r1, ty: Type::u8() });
        f.push(Instr::Return(Some(r2)));
        module.add_function(f);

        let mut interp = Interpreter::new(&module, Budget::default());
        let result = interp.run("add", &[Value::Int(10), Value::Int(20)]).unwrap();
        assert_eq!(result, Some(Value::Int(30)));
    }

    #[test]
    fn division_by_zero_traps() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("div", Type::u8());
        let r0 = f.fresh_reg();
        let r1 = f.fresh_reg();
        let r2 = f.fresh_reg();
        f.params = vec![(r0, Type::u8()), (r1, Type::u8())];
        f.push(Instr::Bin { dst: r2, op: BinOp::Div, lhs: r0, rhs: r1, ty: Type::u8() });
        f.push(Instr::Return(Some(r2)));
        module.add_function(f);

        let mut interp = Interpreter::new(&module, Budget::default());
        let result = interp.run("div", &[Value::Int(1), Value::Int(0)]);
        assert!(matches!(result, Err(Error::CTIETrap { .. })));
    }

    #[test]
    fn instruction_budget_is_enforced() {
        let mut module = MirModule::new("m");
        let mut f = MirFunction::new("spin", Type::Void);
        let l0 = f.fresh_label();
        f.entry = l0;
        f.push(Instr::Label(l0));
        f.push(Instr::Jump(l0));
        module.add_function(f);

        let mut interp = Interpreter::new(&module, Budget { max_instructions: 10, max_depth: 8 });
        let result = interp.run("spin", &[]);
        assert!(matches!(result, Err(Error::CTIEBudgetExceeded { .. })));
    }
}
