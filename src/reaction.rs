use itertools::chain;
use tinyvec::TinyVec;

pub const MAX_INPUTS: usize = 4;
pub const MAX_STOI: usize = 4;

/// The propensity function of a reaction channel under stochastic mass-action kinetics.
#[derive(Clone, Debug, PartialEq)]
pub struct MassAction {
    /// The inputs to the reaction, as `(species, multiplicity)` pairs.
    pub inputs: TinyVec<[(usize, u64); MAX_INPUTS]>,
    /// The rate constant of the reaction.
    pub rate: f64,
}

impl MassAction {
    pub fn new(inputs: impl IntoIterator<Item = (usize, u64)>, rate: f64) -> MassAction {
        MassAction {
            inputs: inputs.into_iter().collect(),
            rate,
        }
    }

    /// Computes the number of combinations of input molecules.
    /// Returns `None` if an input has a negative count.
    pub fn input_product(&self, counts: &[i64]) -> Option<u64> {
        self.inputs
            .iter()
            .map(|&(species, count)| {
                u64::try_from(counts[species])
                    .ok()
                    .map(|available| binomial(available, count))
            })
            .product()
    }

    /// Computes the rate at which reaction events occur.
    /// A negative input count gives NaN, which propensity bookkeeping rejects.
    pub fn propensity(&self, counts: &[i64]) -> f64 {
        self.input_product(counts)
            .map_or(f64::NAN, |product| product as f64 * self.rate)
    }
}

/// A struct describing a single chemical reaction.
#[derive(Clone, Debug, PartialEq)]
pub struct Reaction {
    /// The inputs to the reaction.
    pub inputs: TinyVec<[(usize, u64); MAX_INPUTS]>,
    /// The change to the chemical counts for every firing of the reaction.
    pub stoichiometry: TinyVec<[(usize, i64); MAX_STOI]>,
    /// The rate constant of the reaction.
    pub rate: f64,
}

impl Reaction {
    pub fn new(
        inputs: impl IntoIterator<Item = (usize, u64)>,
        stoichiometry: impl IntoIterator<Item = (usize, i64)>,
        rate: f64,
    ) -> Reaction {
        Reaction {
            inputs: inputs.into_iter().collect(),
            stoichiometry: stoichiometry.into_iter().collect(),
            rate,
        }
    }

    /// The propensity function of the reaction.
    pub fn mass_action(&self) -> MassAction {
        MassAction {
            inputs: self.inputs.clone(),
            rate: self.rate,
        }
    }

    pub fn all_reactants(&self) -> impl Iterator<Item = usize> + '_ {
        chain!(
            self.inputs.iter().map(|(r, _)| *r),
            self.stoichiometry.iter().map(|(r, _)| *r)
        )
    }
}

/// Computes n choose k, of the number of subsets of size k of a set of size n.
pub fn binomial(n: u64, k: u64) -> u64 {
    match k {
        0 => 1,
        1 => n,
        2 => n * n.saturating_sub(1) / 2,
        k if k > n => 0,
        k => {
            let mut res = 1;
            for i in 0..k {
                res = res * (n - i) / (i + 1);
            }
            res
        }
    }
}
