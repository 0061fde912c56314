use buggy::{Bug, BugExt as _};
use dexcheck_bytecode::{Instruction, LabelId, MethodBody, TypeDesc};

use crate::RegisterState;

/// Per-instruction bookkeeping for one verification run.
#[derive(Clone, Debug, Default)]
pub struct InstructionInfo {
    /// Covered by at least one try range.
    pub in_try: bool,
    /// Reachable by an edge other than fallthrough, so it keeps its own
    /// [`RegisterState`].
    pub is_branch_target: bool,
    /// Processed at least once.
    pub visited: bool,
    /// Queued for (re)processing.
    pub changed: bool,
    /// Exception types caught here, if this is a handler label. `None`
    /// stands for a catch-all.
    pub catches: Vec<Option<TypeDesc>>,
    /// The stored state of a branch target.
    pub state: Option<RegisterState>,
}

impl InstructionInfo {
    /// True for the first instruction of an exception handler.
    pub fn is_handler(&self) -> bool {
        !self.catches.is_empty()
    }
}

/// A try range resolved to instruction indexes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedTry {
    /// First covered index.
    pub start: usize,
    /// First index past the range.
    pub end: usize,
    /// Handler and catch-all indexes.
    pub handlers: Vec<usize>,
}

/// Dense per-instruction metadata for a normalized body.
#[derive(Clone, Debug)]
pub struct InstructionIndex {
    infos: Vec<InstructionInfo>,
    labels: Vec<Option<usize>>,
    tries: Vec<ResolvedTry>,
}

impl InstructionIndex {
    /// Indexes `body`, which must already be normalized.
    ///
    /// Marks try coverage, then branch targets: the entry, every branch
    /// and switch target, and every handler.
    pub fn build(body: &MethodBody) -> Result<Self, Bug> {
        let infos = vec![InstructionInfo::default(); body.instructions.len()];
        let mut labels = vec![None; body.label_count as usize];

        for (idx, instr) in body.instructions.iter().enumerate() {
            if let Instruction::Label(l) = instr {
                *labels
                    .get_mut(l.index())
                    .assume("label must be below label_count")? = Some(idx);
            }
        }

        let mut index = Self {
            infos,
            labels,
            tries: Vec::with_capacity(body.try_ranges.len()),
        };

        for range in &body.try_ranges {
            let start = index.label_index(range.start)?;
            let end = index.label_index(range.end)?;
            for info in index.infos.get_mut(start..end).into_iter().flatten() {
                info.in_try = true;
            }
            let mut handlers = Vec::new();
            for h in &range.handlers {
                let at = index.label_index(h.label)?;
                index.info_mut(at)?.catches.push(Some(h.exception.clone()));
                handlers.push(at);
            }
            if let Some(all) = range.catch_all {
                let at = index.label_index(all)?;
                index.info_mut(at)?.catches.push(None);
                handlers.push(at);
            }
            index.tries.push(ResolvedTry {
                start,
                end,
                handlers,
            });
        }

        if let Some(entry) = index.infos.first_mut() {
            entry.is_branch_target = true;
        }
        for instr in &body.instructions {
            match instr {
                Instruction::Target { target, .. } => {
                    let at = index.label_index(*target)?;
                    index.info_mut(at)?.is_branch_target = true;
                }
                Instruction::Switch { targets, .. } => {
                    for t in targets {
                        let at = index.label_index(*t)?;
                        index.info_mut(at)?.is_branch_target = true;
                    }
                }
                Instruction::Label(_) | Instruction::Simple { .. } | Instruction::Const { .. } => {}
            }
        }
        for info in &mut index.infos {
            if info.is_handler() {
                info.is_branch_target = true;
            }
        }

        Ok(index)
    }

    /// Number of indexed instructions, labels included.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// True for an empty body.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// The instruction index where `label` is placed.
    pub fn label_index(&self, label: LabelId) -> Result<usize, Bug> {
        self.labels
            .get(label.index())
            .copied()
            .flatten()
            .assume("label must be placed")
    }

    /// Metadata for instruction `idx`.
    pub fn info(&self, idx: usize) -> Result<&InstructionInfo, Bug> {
        self.infos.get(idx).assume("instruction index must be in range")
    }

    /// Mutable metadata for instruction `idx`.
    pub fn info_mut(&mut self, idx: usize) -> Result<&mut InstructionInfo, Bug> {
        self.infos
            .get_mut(idx)
            .assume("instruction index must be in range")
    }

    /// Every instruction's metadata in order.
    pub fn iter(&self) -> impl Iterator<Item = &InstructionInfo> {
        self.infos.iter()
    }

    /// The resolved try ranges.
    pub fn tries(&self) -> &[ResolvedTry] {
        &self.tries
    }

    /// Handler indexes of every try range covering `idx`.
    pub fn handlers_covering(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.tries
            .iter()
            .filter(move |t| (t.start..t.end).contains(&idx))
            .flat_map(|t| t.handlers.iter().copied())
    }

    /// Takes ownership of every stored branch-target state.
    pub(crate) fn take_states(&mut self) -> impl Iterator<Item = (usize, RegisterState)> + '_ {
        self.infos
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, info)| info.state.take().map(|s| (idx, s)))
    }
}
