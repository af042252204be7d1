use rand::Rng;
use rand_distr::Exp;

/// A default seed for seeded RNGs.
pub const DEFAULT_SEED: u64 = 0x123456789abcdef;

/// Picks the first weight whose cumulative sum exceeds `draw`.
///
/// Rounding can leave `draw` just above the total, in which case the last
/// positive weight is chosen. Returns `None` only if all weights are zero.
pub fn weighted_choice(weights: impl IntoIterator<Item = f64>, draw: f64) -> Option<usize> {
    let mut cumsum = 0.;
    let mut last_positive = None;
    for (idx, weight) in weights.into_iter().enumerate() {
        if weight <= 0. {
            continue;
        }
        cumsum += weight;
        if draw < cumsum {
            return Some(idx);
        }
        last_positive = Some(idx);
    }
    last_positive
}

/// Samples the time until the next event of a process with the given total propensity.
/// A process with zero propensity never fires.
pub fn waiting_time(propensity: f64, rng: &mut impl Rng) -> f64 {
    match Exp::new(propensity) {
        Ok(exp) if propensity > 0. => rng.sample(exp),
        _ => f64::INFINITY,
    }
}
