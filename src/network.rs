use itertools::Itertools;

use crate::{
    error::{Error, Result},
    reaction::{MassAction, Reaction},
    sparse::CscMatrix,
};

/// The static description of the chemistry: which species react how,
/// and which reaction channels need refreshing after an event.
#[derive(Clone, Debug)]
pub struct ReactionNetwork {
    species_names: Vec<String>,
    propensities: Vec<MassAction>,
    /// The stoichiometry matrix N, species by reactions.
    stoichiometry: CscMatrix<i64>,
    /// The dependency graph G, reactions by (species + reactions).
    ///
    /// Column `s` lists the reactions depending on species `s`, and column
    /// `species + j` lists the reactions to refresh after reaction `j` fires.
    dependency: CscMatrix<()>,
}

impl ReactionNetwork {
    /// Builds a network from its sparse matrices, validating their shapes.
    pub fn new(
        species_names: Vec<String>,
        propensities: Vec<MassAction>,
        stoichiometry: CscMatrix<i64>,
        dependency: CscMatrix<()>,
    ) -> Result<ReactionNetwork> {
        let species = species_names.len();
        let reactions = propensities.len();
        let invalid = |msg: String| Err(Error::InvalidNetwork(msg));

        if stoichiometry.rows() != species || stoichiometry.cols() != reactions {
            return invalid(format!(
                "the stoichiometry matrix is {}x{}, expected {species}x{reactions}",
                stoichiometry.rows(),
                stoichiometry.cols()
            ));
        }
        if dependency.rows() != reactions || dependency.cols() != species + reactions {
            return invalid(format!(
                "the dependency graph is {}x{}, expected {reactions}x{}",
                dependency.rows(),
                dependency.cols(),
                species + reactions
            ));
        }
        if let Some((idx, _)) = propensities
            .iter()
            .enumerate()
            .find(|(_, p)| p.inputs.iter().any(|&(s, _)| s >= species))
        {
            return invalid(format!("reaction {idx} has an input out of range"));
        }

        Ok(ReactionNetwork {
            species_names,
            propensities,
            stoichiometry,
            dependency,
        })
    }

    /// Builds a network from mass-action reactions, deriving N and G.
    pub fn from_reactions(species_names: Vec<String>, reactions: &[Reaction]) -> Result<ReactionNetwork> {
        let species = species_names.len();
        if let Some(idx) = reactions
            .iter()
            .position(|r| r.all_reactants().any(|s| s >= species))
        {
            return Err(Error::InvalidNetwork(format!(
                "reaction {idx} refers to an undefined species"
            )));
        }

        // Computing the graph of which reaction updates which other reactions.
        // We already have the reaction -> species edges, and now need the species -> reaction edges,
        // and then we take the product.
        let mut species_reactions = vec![Vec::new(); species];
        for (idx, reaction) in reactions.iter().enumerate() {
            for &(input, _) in &reaction.inputs {
                species_reactions[input].push(idx);
            }
        }
        for dependents in &mut species_reactions {
            dependents.dedup();
        }
        let reaction_updates = reactions.iter().map(|reaction| {
            reaction
                .stoichiometry
                .iter()
                .flat_map(|&(s, _)| species_reactions[s].iter().copied())
                .sorted()
                .dedup()
                .map(|r| (r, ()))
                .collect_vec()
        });
        let dependency_columns = species_reactions
            .iter()
            .map(|dependents| dependents.iter().map(|&r| (r, ())).collect_vec())
            .chain(reaction_updates)
            .collect_vec();

        let stoichiometry = CscMatrix::from_columns(
            species,
            reactions.iter().map(|r| r.stoichiometry.iter().copied()),
        )?;
        let dependency = CscMatrix::from_columns(reactions.len(), dependency_columns)?;
        let propensities = reactions.iter().map(Reaction::mass_action).collect();

        Self::new(species_names, propensities, stoichiometry, dependency)
    }

    pub fn num_species(&self) -> usize {
        self.species_names.len()
    }

    pub fn num_reactions(&self) -> usize {
        self.propensities.len()
    }

    pub fn species_names(&self) -> &[String] {
        &self.species_names
    }

    pub fn propensity(&self, reaction: usize) -> &MassAction {
        &self.propensities[reaction]
    }

    /// The `(species, change)` pairs of a reaction.
    pub fn stoichiometry(&self, reaction: usize) -> impl Iterator<Item = (usize, i64)> + '_ {
        self.stoichiometry.column(reaction)
    }

    /// All reactions with their stoichiometric deltas, in order.
    pub fn reactions(
        &self,
    ) -> impl Iterator<Item = (usize, impl Iterator<Item = (usize, i64)> + '_)> + '_ {
        (0..self.num_reactions()).map(|j| (j, self.stoichiometry(j)))
    }

    /// The reactions whose propensity must be refreshed after reaction `reaction` fires.
    pub fn reaction_dependents(&self, reaction: usize) -> &[usize] {
        self.dependency
            .column_rows(self.num_species() + reaction)
    }

    /// The reactions whose propensity must be refreshed after the count of `species` changes.
    pub fn species_dependents(&self, species: usize) -> &[usize] {
        self.dependency.column_rows(species)
    }

    /// Fires a reaction once.
    pub fn apply(&self, reaction: usize, counts: &mut [i64]) {
        for (species, change) in self.stoichiometry(reaction) {
            counts[species] += change;
        }
    }
}

/// The diffusion rate of every species between every pair of subdomains.
#[derive(Clone, Debug, PartialEq)]
pub struct SubdomainDiffusion {
    num_species: usize,
    num_types: usize,
    /// Indexed by `[species][from][to]`.
    rates: Vec<f64>,
}

impl SubdomainDiffusion {
    pub fn new(num_species: usize, num_types: usize, rates: Vec<f64>) -> Result<SubdomainDiffusion> {
        if rates.len() != num_species * num_types * num_types {
            return Err(Error::InvalidNetwork(format!(
                "the subdomain diffusion matrix has {} entries, expected {num_species}x{num_types}x{num_types}",
                rates.len()
            )));
        }
        Ok(SubdomainDiffusion {
            num_species,
            num_types,
            rates,
        })
    }

    /// Every species diffuses at its own rate between all subdomains.
    pub fn uniform(num_types: usize, species_rates: &[f64]) -> SubdomainDiffusion {
        let rates = species_rates
            .iter()
            .flat_map(|&rate| std::iter::repeat_n(rate, num_types * num_types))
            .collect();
        SubdomainDiffusion {
            num_species: species_rates.len(),
            num_types,
            rates,
        }
    }

    pub fn num_species(&self) -> usize {
        self.num_species
    }

    pub fn num_types(&self) -> usize {
        self.num_types
    }

    pub fn rate(&self, species: usize, from: usize, to: usize) -> f64 {
        self.rates[(species * self.num_types + from) * self.num_types + to]
    }

    pub fn set_rate(&mut self, species: usize, from: usize, to: usize, rate: f64) {
        self.rates[(species * self.num_types + from) * self.num_types + to] = rate;
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn derives_matrices_from_reactions() {
        // A -> B, B + C -> A
        let reactions = [
            Reaction::new([(0, 1)], [(0, -1), (1, 1)], 1.),
            Reaction::new([(1, 1), (2, 1)], [(0, 1), (1, -1), (2, -1)], 2.),
        ];
        let network = ReactionNetwork::from_reactions(names(&["A", "B", "C"]), &reactions).unwrap();
        assert_eq!(network.num_species(), 3);
        assert_eq!(network.num_reactions(), 2);
        assert_eq!(network.stoichiometry(0).collect_vec(), vec![(0, -1), (1, 1)]);

        assert_eq!(network.species_dependents(0), &[0]);
        assert_eq!(network.species_dependents(1), &[1]);
        assert_eq!(network.species_dependents(2), &[1]);
        // A -> B changes A and B, so both reactions are refreshed.
        assert_eq!(network.reaction_dependents(0), &[0, 1]);
        assert_eq!(network.reaction_dependents(1), &[0, 1]);

        let mut counts = vec![0, 3, 2];
        network.apply(1, &mut counts);
        assert_eq!(counts, vec![1, 2, 1]);

        let deltas = network
            .reactions()
            .map(|(j, delta)| (j, delta.collect_vec()))
            .collect_vec();
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[1].1, vec![(0, 1), (1, -1), (2, -1)]);
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let propensities = vec![MassAction::new([(0, 1)], 1.)];
        let n = CscMatrix::from_columns(2, [[(0, -1i64)]]).unwrap();
        let g = CscMatrix::pattern(1, vec![0], vec![0, 1, 1, 1]).unwrap();
        assert!(ReactionNetwork::new(names(&["A", "B"]), propensities.clone(), n.clone(), g).is_ok());

        let bad_g = CscMatrix::pattern(1, vec![0], vec![0, 1, 1]).unwrap();
        assert!(ReactionNetwork::new(names(&["A", "B"]), propensities.clone(), n.clone(), bad_g).is_err());
        let g = CscMatrix::pattern(1, vec![0], vec![0, 1, 1, 1]).unwrap();
        assert!(ReactionNetwork::new(names(&["A"]), propensities, n, g).is_err());

        let undefined = [Reaction::new([(3, 1)], [(3, -1)], 1.)];
        assert!(ReactionNetwork::from_reactions(names(&["A"]), &undefined).is_err());
    }

    #[test]
    fn subdomain_rates() {
        let mut diffusion = SubdomainDiffusion::uniform(2, &[0.5, 1.5]);
        assert_eq!(diffusion.rate(0, 1, 0), 0.5);
        assert_eq!(diffusion.rate(1, 0, 1), 1.5);
        diffusion.set_rate(1, 0, 1, 0.);
        assert_eq!(diffusion.rate(1, 0, 1), 0.);
        assert_eq!(diffusion.rate(1, 1, 0), 1.5);
        assert!(SubdomainDiffusion::new(2, 2, vec![0.; 7]).is_err());
    }
}
