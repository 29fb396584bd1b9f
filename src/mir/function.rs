//! MIR function and module containers.

use super::instruction::{Instr, LabelId, Reg};
use crate::types::Type;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: LabelId,
    pub instructions: Vec<Instr>,
    pub successors: Vec<LabelId>,
    pub predecessors: Vec<LabelId>,
}

impl BasicBlock {
    pub fn new(label: LabelId) -> Self {
        Self {
            label,
            instructions: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConvention {
    /// Self-modifying-code calling convention: arguments are written into
    /// patch slots before `CALL`.
    SelfModifying,
    /// Conventional stack-based parameter passing.
    Stack,
}

#[derive(Debug, Clone)]
pub struct MirFunction {
    pub name: String,
    pub params: Vec<(Reg, Type)>,
    pub ret: Type,
    /// Flat instruction stream in emission order; `blocks` indexes into
    /// conceptual ranges of it once control-flow analysis has run. Kept
    /// flat (rather than a graph of owned blocks) so passes can do a
    /// single linear scan, matching how the optimizer pipeline processes
    /// instructions.
    pub instructions: Vec<Instr>,
    pub entry: LabelId,
    pub next_reg: u32,
    pub next_label: u32,
    /// Filled in by the SMC-decision pass.
    pub convention: Option<CallConvention>,
    /// Set for the duration of CTIE: true once purity analysis has
    /// determined this function touches no globals, memory outside its
    /// own locals, or impure calls.
    pub is_pure: Option<bool>,
}

impl MirFunction {
    pub fn new(name: impl Into<String>, ret: Type) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            ret,
            instructions: Vec::new(),
            entry: LabelId(0),
            next_reg: 0,
            next_label: 1,
            convention: None,
            is_pure: None,
        }
    }

    pub fn fresh_reg(&mut self) -> Reg {
        let r = Reg(self.next_reg);
        self.next_reg += 1;
        r
    }

    pub fn fresh_label(&mut self) -> LabelId {
        let l = LabelId(self.next_label);
        self.next_label += 1;
        l
    }

    pub fn push(&mut self, instr: Instr) {
        self.instructions.push(instr);
    }

    /// Partitions the flat instruction stream into basic blocks at labels
    /// and terminators, wiring predecessor/successor edges. Recomputed
    /// on demand by passes that need block structure (the optimizer's
    /// invalidation-at-labels passes work directly on the flat stream and
    /// don't need this).
    pub fn basic_blocks(&self) -> Vec<BasicBlock> {
        let mut blocks = Vec::new();
        let mut current = BasicBlock::new(self.entry);
        let mut label_index: HashMap<LabelId, usize> = HashMap::new();

        for instr in &self.instructions {
            if let Instr::Label(id) = instr {
                if !current.instructions.is_empty() || current.label != *id {
                    label_index.insert(current.label, blocks.len());
                    blocks.push(std::mem::replace(&mut current, BasicBlock::new(*id)));
                } else {
                    current.label = *id;
                }
                continue;
            }
            let is_term = instr.is_terminator();
            current.instructions.push(instr.clone());
            if is_term {
                label_index.insert(current.label, blocks.len());
                let next_label = self.peek_next_label(&blocks, &current);
                blocks.push(std::mem::replace(&mut current, BasicBlock::new(next_label)));
            }
        }
        if !current.instructions.is_empty() {
            label_index.insert(current.label, blocks.len());
            blocks.push(current);
        }

        for i in 0..blocks.len() {
            let targets = match blocks[i].instructions.last() {
                Some(Instr::Jump(t)) => vec![*t],
                Some(Instr::JumpIfTrue { target, .. }) => {
                    let mut v = vec![*target];
                    if i + 1 < blocks.len() {
                        v.push(blocks[i + 1].label);
                    }
                    v
                }
                Some(Instr::JumpIfFalse { target, .. }) => {
                    let mut v = vec![*target];
                    if i + 1 < blocks.len() {
                        v.push(blocks[i + 1].label);
                    }
                    v
                }
                Some(Instr::Return(_)) | Some(Instr::Halt) | Some(Instr::TailCall { .. }) => vec![],
                _ => {
                    if i + 1 < blocks.len() {
                        vec![blocks[i + 1].label]
                    } else {
                        vec![]
                    }
                }
            };
            blocks[i].successors = targets;
        }
        let edges: Vec<(LabelId, LabelId)> = blocks
            .iter()
            .flat_map(|b| b.successors.iter().map(move |s| (b.label, *s)))
            .collect();
        for (from, to) in edges {
            if let Some(&idx) = label_index.get(&to) {
                blocks[idx].predecessors.push(from);
            }
        }
        blocks
    }

    fn peek_next_label(&self, _blocks: &[BasicBlock], current: &BasicBlock) -> LabelId {
        // Synthetic fallthrough label; distinct from any user label id
        // space since label ids are always allocated via fresh_label.
        LabelId(current.label.0.wrapping_add(1_000_000))
    }
}

#[derive(Debug, Default)]
pub struct MirModule {
    pub name: String,
    pub functions: HashMap<String, MirFunction>,
    pub function_order: Vec<String>,
    pub string_table: Vec<String>,
    pub globals: HashMap<String, Type>,
}

impl MirModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn add_function(&mut self, f: MirFunction) {
        self.function_order.push(f.name.clone());
        self.functions.insert(f.name.clone(), f);
    }

    pub fn intern_string(&mut self, s: &str) -> usize {
        if let Some(idx) = self.string_table.iter().position(|x| x == s) {
            return idx;
        }
        self.string_table.push(s.to_string());
        self.string_table.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::instruction::BinOp;

    #[test]
    fn basic_blocks_split_at_jumps() {
        let mut f = MirFunction::new("add", Type::u8());
        let r0 = f.fresh_reg();
        let r1 = f.fresh_reg();
        let r2 = f.fresh_reg();
        let l1 = f.fresh_label();
        f.push(Instr::ConstInt { dst: r0, value: 1, ty: Type::u8() });
        f.push(Instr::Jump(l1));
        f.push(Instr::Label(l1));
        f.push(Instr::Bin { dst: r2, op: BinOp::Add, lhs: r0, rhs: r1, ty: Type::u8() });
        f.push(Instr::Return(Some(r2)));

        let blocks = f.basic_blocks();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].successors, vec![l1]);
    }
}
