use dexcheck_types::{RegType, RegTypeKind, TypeLattice};

use crate::RegisterError;

/// How a `move-result*` claims the pending result.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResultKind {
    /// `move-result`
    Scalar,
    /// `move-result-wide`
    Wide,
    /// `move-result-object`
    Object,
}

/// The type of every register at one program point.
///
/// Registers `0..locals` live in the local array and the rest in the
/// parameter array. Wide values occupy two consecutive registers, which
/// may straddle the two arrays.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegisterState {
    locals: Vec<RegType>,
    params: Vec<RegType>,
    result: [RegType; 2],
    this_initialized: bool,
    monitor_depth: Option<u32>,
}

impl RegisterState {
    /// Creates a state with every register undefined.
    pub fn new(locals: usize, params: usize) -> Self {
        Self {
            locals: vec![RegType::UNDEFINED; locals],
            params: vec![RegType::UNDEFINED; params],
            result: [RegType::UNDEFINED; 2],
            this_initialized: true,
            monitor_depth: Some(0),
        }
    }

    /// Total number of registers.
    pub fn len(&self) -> usize {
        self.locals.len().saturating_add(self.params.len())
    }

    /// True if the frame has no registers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn out_of_range(&self, reg: usize) -> RegisterError {
        RegisterError::OutOfRange {
            reg,
            count: self.len(),
        }
    }

    fn slot(&self, reg: usize) -> Option<&RegType> {
        match reg.checked_sub(self.locals.len()) {
            None => self.locals.get(reg),
            Some(p) => self.params.get(p),
        }
    }

    fn slot_mut(&mut self, reg: usize) -> Result<&mut RegType, RegisterError> {
        let err = self.out_of_range(reg);
        match reg.checked_sub(self.locals.len()) {
            None => self.locals.get_mut(reg),
            Some(p) => self.params.get_mut(p),
        }
        .ok_or(err)
    }

    /// The type held by `reg`.
    pub fn get(&self, reg: usize) -> Result<RegType, RegisterError> {
        self.slot(reg).copied().ok_or_else(|| self.out_of_range(reg))
    }

    /// Every register in order, locals first.
    pub fn iter(&self) -> impl Iterator<Item = RegType> + '_ {
        self.locals.iter().chain(&self.params).copied()
    }

    /// Writes a single-register value.
    ///
    /// Fails without writing if `ty` is one half of a wide value.
    pub fn set_scalar(
        &mut self,
        lattice: &TypeLattice<'_>,
        reg: usize,
        ty: RegType,
    ) -> Result<(), RegisterError> {
        let kind = lattice.kind(ty);
        if kind.is_low_half() || kind.is_high_half() {
            return Err(RegisterError::HalfWrite(reg));
        }
        *self.slot_mut(reg)? = ty;
        Ok(())
    }

    /// Writes a wide value to `reg` and `reg + 1`.
    pub fn set_wide(
        &mut self,
        lattice: &TypeLattice<'_>,
        reg: usize,
        lo: RegType,
        hi: RegType,
    ) -> Result<(), RegisterError> {
        if !lattice.check_wide_pair(lo, hi) {
            return Err(RegisterError::BadWidePair(reg));
        }
        let next = reg.checked_add(1).ok_or_else(|| self.out_of_range(reg))?;
        // Check both slots before writing either.
        self.get(next)?;
        *self.slot_mut(reg)? = lo;
        *self.slot_mut(next)? = hi;
        Ok(())
    }

    /// Writes any value, as one register or a wide pair.
    pub fn set(
        &mut self,
        lattice: &TypeLattice<'_>,
        reg: usize,
        ty: RegType,
    ) -> Result<(), RegisterError> {
        match lattice.high_half(ty) {
            Some(hi) => self.set_wide(lattice, reg, ty, hi),
            None => self.set_scalar(lattice, reg, ty),
        }
    }

    /// Makes `self` an exact copy of `other`.
    pub fn copy_from(&mut self, other: &Self) {
        self.clone_from(other);
    }

    /// Merges `other` into `self` register by register and reports whether
    /// anything changed.
    ///
    /// Monitor depths that disagree become unknown.
    pub fn merge(&mut self, lattice: &TypeLattice<'_>, other: &Self) -> bool {
        let mut changed = false;
        let pairs = self
            .locals
            .iter_mut()
            .zip(&other.locals)
            .chain(self.params.iter_mut().zip(&other.params))
            .chain(self.result.iter_mut().zip(&other.result));
        for (mine, theirs) in pairs {
            let merged = lattice.merge(*mine, *theirs);
            if merged != *mine {
                *mine = merged;
                changed = true;
            }
        }
        if self.this_initialized && !other.this_initialized {
            self.this_initialized = false;
            changed = true;
        }
        if self.monitor_depth.is_some() && self.monitor_depth != other.monitor_depth {
            self.monitor_depth = None;
            changed = true;
        }
        changed
    }

    /// Records the value produced by an invoke or `filled-new-array`.
    pub fn set_result(&mut self, lattice: &TypeLattice<'_>, ty: RegType) {
        let hi = lattice.high_half(ty).unwrap_or(RegType::UNDEFINED);
        self.result = [ty, hi];
    }

    /// The pending result slots.
    pub fn result(&self) -> [RegType; 2] {
        self.result
    }

    /// Drops any pending result.
    pub fn clear_result(&mut self) {
        self.result = [RegType::UNDEFINED; 2];
    }

    /// Moves the pending result into `dst` and clears it.
    pub fn consume_result(
        &mut self,
        lattice: &TypeLattice<'_>,
        dst: usize,
        kind: ResultKind,
    ) -> Result<RegType, RegisterError> {
        let [lo, hi] = self.result;
        let k = lattice.kind(lo);
        if k.is_undefined() {
            return Err(RegisterError::NoResult);
        }
        match kind {
            ResultKind::Scalar if k.is_category1_types() => self.set_scalar(lattice, dst, lo)?,
            ResultKind::Object if k.is_reference_types() => self.set_scalar(lattice, dst, lo)?,
            ResultKind::Wide if k.check_wide_pair(lattice.kind(hi)) => {
                self.set_wide(lattice, dst, lo, hi)?
            }
            ResultKind::Scalar => return Err(RegisterError::ResultMismatch("move-result")),
            ResultKind::Object => return Err(RegisterError::ResultMismatch("move-result-object")),
            ResultKind::Wide => return Err(RegisterError::ResultMismatch("move-result-wide")),
        }
        self.clear_result();
        Ok(lo)
    }

    /// Reports whether `reg` holds a value assignable to `expected`.
    pub fn verify(
        &self,
        lattice: &TypeLattice<'_>,
        reg: usize,
        expected: RegType,
    ) -> Result<bool, RegisterError> {
        Ok(lattice.is_assignable_from(expected, self.get(reg)?))
    }

    /// Reports whether `reg` and `reg + 1` hold a matched wide pair whose
    /// low half is assignable to `expected_lo`.
    pub fn verify_wide(
        &self,
        lattice: &TypeLattice<'_>,
        reg: usize,
        expected_lo: RegType,
    ) -> Result<bool, RegisterError> {
        let lo = self.get(reg)?;
        let next = reg.checked_add(1).ok_or_else(|| self.out_of_range(reg))?;
        let hi = self.get(next)?;
        Ok(lattice.is_assignable_from(expected_lo, lo) && lattice.check_wide_pair(lo, hi))
    }

    /// Replaces every copy of the uninitialized `uninit` with its
    /// initialized type. Initializing `this` also sets
    /// [`RegisterState::this_initialized`].
    pub fn mark_refs_as_initialized(&mut self, lattice: &TypeLattice<'_>, uninit: RegType) {
        let init = lattice.initialized(uninit);
        for slot in self.locals.iter_mut().chain(self.params.iter_mut()) {
            if *slot == uninit {
                *slot = init;
            }
        }
        if matches!(lattice.kind(uninit), RegTypeKind::UninitializedThis { .. }) {
            self.this_initialized = true;
        }
    }

    /// Turns every register holding `marker` into `Conflict`.
    pub fn invalidate_refs(&mut self, marker: RegType) {
        for slot in self.locals.iter_mut().chain(self.params.iter_mut()) {
            if *slot == marker {
                *slot = RegType::CONFLICT;
            }
        }
    }

    /// Whether the superclass constructor has run on `this`. Always true
    /// outside constructors.
    pub fn this_initialized(&self) -> bool {
        self.this_initialized
    }

    /// Overrides [`RegisterState::this_initialized`].
    pub fn set_this_initialized(&mut self, init: bool) {
        self.this_initialized = init;
    }

    /// Monitors currently held, or `None` once paths with different depths
    /// have merged.
    pub fn monitor_depth(&self) -> Option<u32> {
        self.monitor_depth
    }

    /// Records a `monitor-enter`.
    pub fn monitor_enter(&mut self) {
        self.monitor_depth = self.monitor_depth.and_then(|d| d.checked_add(1));
    }

    /// Records a `monitor-exit`. Returns false when no monitor is held.
    pub fn monitor_exit(&mut self) -> bool {
        match self.monitor_depth {
            Some(0) => false,
            Some(d) => {
                self.monitor_depth = d.checked_sub(1);
                true
            }
            None => true,
        }
    }
}
