use std::collections::BTreeMap;

use buggy::BugExt as _;
use dexcheck_bytecode::{LabelId, Method, MethodBody};
use dexcheck_types::TypeLattice;
use tracing::{debug, instrument};

use crate::{
    RegisterState, VerifyError, engine::Engine, normalize::normalize, shape::check_structure,
};

/// Tuning knobs shared by every method a [`Verifier`] checks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Config {
    pub precise_constants: bool,
    pub max_visits: Option<usize>,
    pub allow_soft_failures: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            precise_constants: true,
            max_visits: None,
            allow_soft_failures: true,
        }
    }
}

/// Verifies methods against a type lattice.
///
/// ```ignore
/// let table = TypeTable::new();
/// let pool = ClassPool::new();
/// let lattice = TypeLattice::new(&table, &pool);
/// let verified = Verifier::new(&lattice)
///     .max_visits(Some(10_000))
///     .verify(&method)?;
/// ```
#[derive(Clone, Debug)]
pub struct Verifier<'a> {
    lattice: TypeLattice<'a>,
    config: Config,
}

impl<'a> Verifier<'a> {
    /// Creates a verifier with the default settings: precise constants,
    /// no visit budget, and soft failures recorded rather than returned.
    pub fn new(lattice: &TypeLattice<'a>) -> Self {
        Self {
            lattice: *lattice,
            config: Config::default(),
        }
    }

    /// Whether `const` yields precise constants. Imprecise constants keep
    /// their value but are marked as inferred.
    #[must_use]
    pub fn precise_constants(mut self, precise: bool) -> Self {
        self.config.precise_constants = precise;
        self
    }

    /// Bounds the number of instruction visits per method. `None` means
    /// unbounded.
    #[must_use]
    pub fn max_visits(mut self, max: Option<usize>) -> Self {
        self.config.max_visits = max;
        self
    }

    /// When false, the first soft failure is returned as an error.
    #[must_use]
    pub fn allow_soft_failures(mut self, allow: bool) -> Self {
        self.config.allow_soft_failures = allow;
        self
    }

    /// Verifies one method.
    ///
    /// Returns the first hard failure, or the verified method with every
    /// soft failure recorded on it.
    #[instrument(skip_all, fields(method = %method))]
    pub fn verify(&self, method: &Method) -> Result<VerifiedMethod, VerifyError> {
        debug!(instructions = method.body.op_count(), "verifying");
        let body = normalize(&method.body)?;
        check_structure(method, &body)?;

        let outcome = Engine::new(self.lattice, self.config, method, &body)?.run()?;

        let mut index = outcome.index;
        let mut states = BTreeMap::new();
        for (idx, state) in index.take_states() {
            let label = body
                .instructions
                .get(idx)
                .and_then(|i| i.as_label())
                .assume("branch targets must be labels")?;
            states.insert(label, state);
        }

        debug!(
            visits = outcome.visits,
            soft_failures = outcome.soft_failures.len(),
            "verified"
        );
        Ok(VerifiedMethod {
            body,
            states,
            soft_failures: outcome.soft_failures,
            visits: outcome.visits,
        })
    }
}

/// A method that passed verification.
#[derive(Clone, Debug)]
pub struct VerifiedMethod {
    body: MethodBody,
    states: BTreeMap<LabelId, RegisterState>,
    soft_failures: Vec<VerifyError>,
    visits: usize,
}

impl VerifiedMethod {
    /// The normalized body the states refer to.
    pub fn body(&self) -> &MethodBody {
        &self.body
    }

    /// The register state on entry to the join point at `label` of the
    /// normalized body, if it was reached.
    pub fn state_at(&self, label: LabelId) -> Option<&RegisterState> {
        self.states.get(&label)
    }

    /// Every reached join point and its entry state, in label order.
    pub fn states(&self) -> impl Iterator<Item = (LabelId, &RegisterState)> {
        self.states.iter().map(|(l, s)| (*l, s))
    }

    /// Soft failures, each recorded once.
    pub fn soft_failures(&self) -> &[VerifyError] {
        &self.soft_failures
    }

    /// True if the method must run with runtime rechecks.
    pub fn has_soft_failures(&self) -> bool {
        !self.soft_failures.is_empty()
    }

    /// Instructions processed before the fixed point was reached.
    pub fn visits(&self) -> usize {
        self.visits
    }
}
