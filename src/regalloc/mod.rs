//! Three-tier register allocator: physical registers, then the shadow
//! register bank, then memory spill slots. Liveness is computed per basic
//! block and joined at labels; virtual registers that are live
//! simultaneously interfere, and a simplify/select graph coloring (the
//! same shape as a classic Chaitin-Briggs allocator) assigns colors from
//! whichever tier is cheapest.

pub mod analysis;

use crate::mir::{Instr, LabelId, MirFunction, Reg};
use std::collections::{HashMap, HashSet, VecDeque};

/// Where a virtual register ends up after allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Physical(u8),
    Shadow(u8),
    Spill(u32),
}

/// Register classes available to allocate into, in priority order. A
/// target with no shadow bank (most non-Z80 backends) sets `shadow` to 0.
#[derive(Debug, Clone, Copy)]
pub struct RegisterClass {
    pub physical: u8,
    pub shadow: u8,
}

impl RegisterClass {
    pub fn z80() -> Self {
        // B, C, D, E, H, L: six colorable 8-bit registers. `A` is kept out
        // of the pool entirely — the backend always routes arithmetic
        // through it as a transient scratch, never as a live-value home.
        Self { physical: 6, shadow: 6 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Allocation {
    pub locations: HashMap<Reg, Location>,
    pub spill_slots: u32,
}

impl Allocation {
    pub fn location(&self, r: Reg) -> Option<Location> {
        self.locations.get(&r).copied()
    }

    pub fn is_spilled(&self, r: Reg) -> bool {
        matches!(self.locations.get(&r), Some(Location::Spill(_)))
    }
}

/// Live sets at each basic-block boundary, from a backward dataflow fixed
/// point over the block graph joined at labels.
fn compute_block_live_sets(f: &MirFunction) -> (Vec<crate::mir::BasicBlock>, Vec<HashSet<Reg>>, Vec<HashSet<Reg>>) {
    let blocks = f.basic_blocks();
    let label_index: HashMap<LabelId, usize> =
        blocks.iter().enumerate().map(|(i, b)| (b.label, i)).collect();

    let mut live_in: Vec<HashSet<Reg>> = vec![HashSet::new(); blocks.len()];
    let mut live_out: Vec<HashSet<Reg>> = vec![HashSet::new(); blocks.len()];

    loop {
        let mut changed = false;
        for i in (0..blocks.len()).rev() {
            let mut out: HashSet<Reg> = HashSet::new();
            for succ in &blocks[i].successors {
                if let Some(&idx) = label_index.get(succ) {
                    out.extend(live_in[idx].iter().copied());
                }
            }
            let mut inset = out.clone();
            for instr in blocks[i].instructions.iter().rev() {
                if let Some(dst) = instr.result() {
                    inset.remove(&dst);
                }
                inset.extend(instr.uses());
            }
            if inset != live_in[i] {
                live_in[i] = inset;
                changed = true;
            }
            if out != live_out[i] {
                live_out[i] = out;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    (blocks, live_in, live_out)
}

/// Builds the interference graph: two registers interfere when one is
/// live at a point where the other is defined, or both are simultaneously
/// live across a block boundary.
fn build_interference(f: &MirFunction) -> HashMap<Reg, HashSet<Reg>> {
    let (blocks, _live_in, live_out) = compute_block_live_sets(f);
    let mut graph: HashMap<Reg, HashSet<Reg>> = HashMap::new();
    let touch = |a: Reg, b: Reg, graph: &mut HashMap<Reg, HashSet<Reg>>| {
        if a != b {
            graph.entry(a).or_default().insert(b);
            graph.entry(b).or_default().insert(a);
        } else {
            graph.entry(a).or_default();
        }
    };

    for (bi, block) in blocks.iter().enumerate() {
        let mut live = live_out[bi].clone();
        for instr in block.instructions.iter().rev() {
            if let Some(dst) = instr.result() {
                for &other in &live {
                    touch(dst, other, &mut graph);
                }
                graph.entry(dst).or_default();
                live.remove(&dst);
            }
            for used in instr.uses() {
                graph.entry(used).or_default();
                live.insert(used);
            }
        }
    }

    graph
}

/// Allocates every virtual register a function defines or uses into the
/// given register classes, spilling to memory when both tiers are
/// exhausted at a coloring point.
pub fn allocate(f: &MirFunction, class: RegisterClass) -> Allocation {
    let interference = build_interference(f);
    let k = class.physical as usize + class.shadow as usize;

    let mut remaining: HashSet<Reg> = interference.keys().copied().collect();
    let mut simplify_worklist: VecDeque<Reg> = VecDeque::new();
    let mut spill_worklist: Vec<Reg> = Vec::new();
    let mut select_stack: Vec<Reg> = Vec::new();

    let degree = |r: Reg, remaining: &HashSet<Reg>, graph: &HashMap<Reg, HashSet<Reg>>| -> usize {
        graph.get(&r).map(|n| n.iter().filter(|x| remaining.contains(x)).count()).unwrap_or(0)
    };

    for &r in &remaining {
        if degree(r, &remaining, &interference) < k {
            simplify_worklist.push_back(r);
        } else {
            spill_worklist.push(r);
        }
    }

    loop {
        if let Some(r) = simplify_worklist.pop_front() {
            remaining.remove(&r);
            select_stack.push(r);
            if let Some(neighbors) = interference.get(&r) {
                for &n in neighbors {
                    if remaining.contains(&n) && degree(n, &remaining, &interference) < k && !simplify_worklist.contains(&n) {
                        spill_worklist.retain(|x| *x != n);
                        simplify_worklist.push_back(n);
                    }
                }
            }
        } else if let Some(r) = spill_worklist.pop() {
            remaining.remove(&r);
            select_stack.push(r);
        } else {
            break;
        }
    }

    let mut locations: HashMap<Reg, Location> = HashMap::new();
    let mut next_spill = 0u32;

    while let Some(r) = select_stack.pop() {
        let used: HashSet<Location> = interference
            .get(&r)
            .map(|n| n.iter().filter_map(|x| locations.get(x).copied()).collect())
            .unwrap_or_default();

        let mut assigned = None;
        for i in 0..class.physical {
            let loc = Location::Physical(i);
            if !used.contains(&loc) {
                assigned = Some(loc);
                break;
            }
        }
        if assigned.is_none() {
            for i in 0..class.shadow {
                let loc = Location::Shadow(i);
                if !used.contains(&loc) {
                    assigned = Some(loc);
                    break;
                }
            }
        }
        let loc = assigned.unwrap_or_else(|| {
            let slot = next_spill;
            next_spill += 1;
            Location::Spill(slot)
        });
        locations.insert(r, loc);
    }

    Allocation { locations, spill_slots: next_spill }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::BinOp;
    use crate::types::Type;

    #[test]
    fn non_overlapping_ranges_share_a_register() {
        let mut f = MirFunction::new("f", Type::u8());
        let a = f.fresh_reg();
        let b = f.fresh_reg();
        f.push(Instr::ConstInt { dst: a, value: 1, ty: Type::u8() });
        f.push(Instr::Return(Some(a)));
        f.push(Instr::ConstInt { dst: b, value: 2, ty: Type::u8() });
        f.push(Instr::Return(Some(b)));

        let alloc = allocate(&f, RegisterClass { physical: 1, shadow: 0 });
        assert!(matches!(alloc.location(a), Some(Location::Physical(_))));
        assert!(matches!(alloc.location(b), Some(Location::Physical(_))));
        assert_eq!(alloc.spill_slots, 0);
    }

    #[test]
    fn overlapping_ranges_spill_when_out_of_registers() {
        let mut f = MirFunction::new("f", Type::u8());
        let a = f.fresh_reg();
        let b = f.fresh_reg();
        let c = f.fresh_reg();
        f.push(Instr::ConstInt { dst: a, value: 1, ty: Type::u8() });
        f.push(Instr::ConstInt { dst: b, value: 2, ty: Type::u8() });
        f.push(Instr::Bin { dst: c, op: BinOp::Add, lhs: a, rhs: b, ty: Type::u8() });
        f.push(Instr::Return(Some(c)));

        let alloc = allocate(&f, RegisterClass { physical: 1, shadow: 0 });
        assert_eq!(alloc.spill_slots, 1);
    }

    #[test]
    fn shadow_bank_absorbs_overflow_before_spilling() {
        let mut f = MirFunction::new("f", Type::u8());
        let a = f.fresh_reg();
        let b = f.fresh_reg();
        let c = f.fresh_reg();
        f.push(Instr::ConstInt { dst: a, value: 1, ty: Type::u8() });
        f.push(Instr::ConstInt { dst: b, value: 2, ty: Type::u8() });
        f.push(Instr::Bin { dst: c, op: BinOp::Add, lhs: a, rhs: b, ty: Type::u8() });
        f.push(Instr::Return(Some(c)));

        let alloc = allocate(&f, RegisterClass { physical: 1, shadow: 1 });
        assert_eq!(alloc.spill_slots, 0);
    }
}
