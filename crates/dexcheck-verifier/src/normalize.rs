use std::collections::BTreeMap;

use buggy::{Bug, BugExt as _, bug};
use dexcheck_bytecode::{Instruction, LabelId, LineNumber, MethodBody, TryCatchRange};

/// Collapses every run of adjacent label markers into one canonical label
/// and rewrites all label references to match.
///
/// The result always starts with a label, so the method entry is a join
/// point. Canonical labels are numbered densely in order of appearance,
/// which makes the operation idempotent.
///
/// A label that is referenced but never placed, or placed twice, is a
/// contract violation of whoever built the body.
pub fn normalize(body: &MethodBody) -> Result<MethodBody, Bug> {
    let mut canonical: BTreeMap<LabelId, LabelId> = BTreeMap::new();
    let mut instructions = Vec::with_capacity(body.instructions.len().saturating_add(1));
    let mut label_count: u32 = 0;

    let mut fresh = |instructions: &mut Vec<Instruction>| -> Result<LabelId, Bug> {
        let l = LabelId(label_count);
        label_count = label_count.checked_add(1).assume("label count must not wrap")?;
        instructions.push(Instruction::Label(l));
        Ok(l)
    };

    let mut current = Some(fresh(&mut instructions)?);
    for instr in &body.instructions {
        match instr {
            Instruction::Label(l) => {
                let c = match current {
                    Some(c) => c,
                    None => {
                        let c = fresh(&mut instructions)?;
                        current = Some(c);
                        c
                    }
                };
                if canonical.insert(*l, c).is_some() {
                    bug!("label placed more than once");
                }
            }
            other => {
                current = None;
                instructions.push(other.clone());
            }
        }
    }

    let resolve = |l: &LabelId| -> Result<LabelId, Bug> {
        canonical
            .get(l)
            .copied()
            .assume("referenced label must be placed")
    };

    for instr in &mut instructions {
        match instr {
            Instruction::Target { target, .. } => *target = resolve(target)?,
            Instruction::Switch { targets, .. } => {
                for t in targets.iter_mut() {
                    *t = resolve(t)?;
                }
            }
            Instruction::Label(_) | Instruction::Simple { .. } | Instruction::Const { .. } => {}
        }
    }

    let try_ranges = body
        .try_ranges
        .iter()
        .map(|r| -> Result<TryCatchRange, Bug> {
            let mut handlers = r.handlers.clone();
            for h in &mut handlers {
                h.label = resolve(&h.label)?;
            }
            Ok(TryCatchRange {
                start: resolve(&r.start)?,
                end: resolve(&r.end)?,
                handlers,
                catch_all: r.catch_all.as_ref().map(resolve).transpose()?,
            })
        })
        .collect::<Result<Vec<_>, Bug>>()?;

    let line_numbers = body
        .line_numbers
        .iter()
        .map(|ln| -> Result<LineNumber, Bug> {
            Ok(LineNumber {
                label: resolve(&ln.label)?,
                line: ln.line,
            })
        })
        .collect::<Result<Vec<_>, Bug>>()?;

    Ok(MethodBody {
        instructions,
        try_ranges,
        line_numbers,
        label_count,
    })
}
