use bon::Builder;
use rand::Rng;
use tracing::{debug, error, info};

use crate::{
    error::{Error, Result},
    network::{ReactionNetwork, SubdomainDiffusion},
    particle::{ParticleIdx, ParticleSystem},
    propensity::{self, VoxelRates},
    scheduler::EventQueue,
    spatial_index::SpatialIndex,
    utils::{waiting_time, weighted_choice},
};

/// The chemistry to simulate on top of a particle system.
#[derive(Clone, Debug, Builder)]
pub struct RdmeConfig {
    pub network: ReactionNetwork,
    pub subdomain_diffusion: SubdomainDiffusion,
    /// Initial molecule counts, indexed by `voxel * species + species_idx`.
    /// If absent, the counts already stored on the particles are used.
    pub u0: Option<Vec<i64>>,
}

/// A single event fired by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Reaction {
        voxel: ParticleIdx,
        reaction: usize,
    },
    Diffusion {
        source: ParticleIdx,
        destination: ParticleIdx,
        species: usize,
    },
}

impl Event {
    /// The voxel whose scheduled event fired.
    pub fn voxel(&self) -> ParticleIdx {
        match *self {
            Event::Reaction { voxel, .. } => voxel,
            Event::Diffusion { source, .. } => source,
        }
    }
}

/// The number of events fired during a single macro step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepSummary {
    pub reactions: u64,
    pub diffusions: u64,
}

/// The final counters of a torn down simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RdmeTotals {
    pub time: f64,
    pub total_reactions: u64,
    pub total_diffusion: u64,
}

/// The runtime state of the Next Subvolume Method.
///
/// Every particle is a voxel. The chemical counts live on the particles, while the
/// propensities and next event times of the voxels are kept here.
#[derive(Clone, Debug)]
pub struct Rdme {
    network: ReactionNetwork,
    subdomain_diffusion: SubdomainDiffusion,
    voxels: Vec<VoxelRates>,
    queue: EventQueue,
    time: f64,
    total_reactions: u64,
    total_diffusion: u64,
}

impl Rdme {
    /// Sets up the chemistry on the particles, finds their neighbors,
    /// computes all propensities and schedules the first event of every voxel.
    pub fn initialize<I: SpatialIndex>(
        system: &mut ParticleSystem<I>,
        config: RdmeConfig,
        rng: &mut impl Rng,
    ) -> Result<Rdme> {
        let RdmeConfig {
            network,
            subdomain_diffusion,
            u0,
        } = config;
        let species = network.num_species();
        let invalid = |msg: String| Err(Error::InvalidNetwork(msg));

        if system.params.num_species != species {
            return invalid(format!(
                "the system has {} species, the network has {species}",
                system.params.num_species
            ));
        }
        if system.params.num_reactions != network.num_reactions() {
            return invalid(format!(
                "the system has {} reactions, the network has {}",
                system.params.num_reactions,
                network.num_reactions()
            ));
        }
        if subdomain_diffusion.num_species() != species {
            return invalid(format!(
                "the subdomain diffusion matrix covers {} species, expected {species}",
                subdomain_diffusion.num_species()
            ));
        }
        if let Some(particle) = system
            .particles
            .iter()
            .find(|p| p.particle_type >= subdomain_diffusion.num_types())
        {
            return invalid(format!(
                "particle {} has type {}, but there are only {} subdomains",
                particle.id,
                particle.particle_type,
                subdomain_diffusion.num_types()
            ));
        }
        if let Some(u0) = u0 {
            if u0.len() != system.len() * species {
                return invalid(format!(
                    "expected {} initial counts for {} voxels, got {}",
                    system.len() * species,
                    system.len(),
                    u0.len()
                ));
            }
            for (particle, counts) in system.particles.iter_mut().zip(u0.chunks(species.max(1))) {
                particle.xx.clear();
                particle.xx.extend_from_slice(counts);
            }
        }

        if let Some(particle) = system.particles.iter().find(|p| p.xx.iter().any(|&c| c < 0)) {
            return invalid(format!(
                "particle {} starts with negative counts {:?}",
                particle.id, particle.xx
            ));
        }

        let mut rdme = Rdme {
            voxels: vec![VoxelRates::new(network.num_reactions(), species); system.len()],
            queue: EventQueue::new(system.len()),
            network,
            subdomain_diffusion,
            time: 0.,
            total_reactions: 0,
            total_diffusion: 0,
        };

        system.update_neighbors()?;
        for voxel in system.particles.indices() {
            rdme.voxels[voxel.index()].refresh_all_reactions(
                voxel,
                &rdme.network,
                &system.particles[voxel].xx,
            )?;
        }
        rdme.refresh_diffusion_rates(system, rng)?;
        info!(
            voxels = system.len(),
            species,
            reactions = rdme.network.num_reactions(),
            "initialized reaction-diffusion state"
        );
        Ok(rdme)
    }

    /// Recomputes the per-species diffusion rates of all voxels from their neighbor lists,
    /// and draws new event times for all voxels.
    fn refresh_diffusion_rates<I>(
        &mut self,
        system: &ParticleSystem<I>,
        rng: &mut impl Rng,
    ) -> Result<()> {
        for voxel in system.particles.indices() {
            let rates = &mut self.voxels[voxel.index()];
            rates.refresh_topology(voxel, &system.particles, &self.subdomain_diffusion)?;
            let next = self.time + waiting_time(rates.total(), rng);
            self.queue.schedule(voxel, next);
        }
        Ok(())
    }

    /// Runs a macro step: refreshes the neighbor topology from the current particle positions,
    /// then fires events until `duration` has passed.
    #[tracing::instrument(skip_all, fields(time = self.time, duration = duration))]
    pub fn advance<I: SpatialIndex>(
        &mut self,
        system: &mut ParticleSystem<I>,
        duration: f64,
        rng: &mut impl Rng,
    ) -> Result<StepSummary> {
        self.check_voxels(system)?;
        if system.update_neighbors()? {
            self.refresh_diffusion_rates(system, rng)?;
        }

        let end_time = self.time + duration;
        let mut summary = StepSummary::default();
        while let Some((time, event)) = self.dispatch(system, end_time, rng)? {
            debug!(time, ?event, "fired event");
            match event {
                Event::Reaction { .. } => summary.reactions += 1,
                Event::Diffusion { .. } => summary.diffusions += 1,
            }
        }
        self.time = end_time;

        info!(
            reactions = summary.reactions,
            diffusions = summary.diffusions,
            total_reactions = self.total_reactions,
            total_diffusion = self.total_diffusion,
            "finished step"
        );
        Ok(summary)
    }

    /// Fires the globally earliest event, if it happens no later than `end_time`.
    ///
    /// Returns the time of the event and the event itself.
    pub fn dispatch<I>(
        &mut self,
        system: &mut ParticleSystem<I>,
        end_time: f64,
        rng: &mut impl Rng,
    ) -> Result<Option<(f64, Event)>> {
        self.check_voxels(system)?;
        let Some((time, voxel)) = self.queue.peek() else {
            return Ok(None);
        };
        if time > end_time {
            return Ok(None);
        }
        self.time = time;

        let rates = &self.voxels[voxel.index()];
        let total = rates.total();
        let is_reaction = rng.random::<f64>() * total < rates.srrate;

        let event = if is_reaction {
            let reaction = weighted_choice(
                rates.rrate.iter().copied(),
                rng.random::<f64>() * rates.srrate,
            )
            .ok_or_else(|| self.exhausted(voxel))?;
            let counts = &mut system.particles[voxel].xx;
            self.network.apply(reaction, counts);
            self.total_reactions += 1;
            if let Some((species, count)) = self
                .network
                .stoichiometry(reaction)
                .map(|(species, _)| (species, counts[species]))
                .find(|&(_, count)| count < 0)
            {
                error!(voxel = voxel.index(), species, reaction, count, "negative molecule count");
                return Err(Error::NegativeCount {
                    voxel: voxel.index(),
                    species,
                    reaction,
                    count,
                });
            }

            self.refresh_voxel(
                system,
                voxel,
                self.network.reaction_dependents(reaction).to_vec(),
                rng,
            )?;
            Event::Reaction { voxel, reaction }
        } else {
            let (species, destination) = self.sample_diffusion(system, voxel, rng)?;
            system.particles[voxel].xx[species] -= 1;
            system.particles[destination].xx[species] += 1;
            self.total_diffusion += 1;

            let dependents = self.network.species_dependents(species).to_vec();
            self.refresh_voxel(system, voxel, dependents.iter().copied(), rng)?;
            self.refresh_voxel(system, destination, dependents, rng)?;
            Event::Diffusion {
                source: voxel,
                destination,
                species,
            }
        };
        Ok(Some((time, event)))
    }

    /// Chooses the species and destination of a diffusion event out of `voxel`.
    fn sample_diffusion<I>(
        &self,
        system: &ParticleSystem<I>,
        voxel: ParticleIdx,
        rng: &mut impl Rng,
    ) -> Result<(usize, ParticleIdx)> {
        let rates = &self.voxels[voxel.index()];
        let counts = &system.particles[voxel].xx;
        let species = weighted_choice(
            rates
                .ddiag
                .iter()
                .zip(counts)
                .map(|(&rate, &count)| rate * count as f64),
            rng.random::<f64>() * rates.sdrate,
        )
        .ok_or_else(|| self.exhausted(voxel))?;

        let channels = propensity::diffusion_channels(
            &system.particles,
            voxel,
            species,
            &self.subdomain_diffusion,
        );
        let draw = rng.random::<f64>() * rates.ddiag[species];
        let neighbor = weighted_choice(channels.map(|(_, rate)| rate), draw)
            .ok_or_else(|| self.exhausted(voxel))?;
        Ok((species, system.particles[voxel].neighbors[neighbor].particle))
    }

    /// Recomputes the propensities of a voxel whose counts changed and reschedules it.
    fn refresh_voxel<I>(
        &mut self,
        system: &ParticleSystem<I>,
        voxel: ParticleIdx,
        reactions: impl IntoIterator<Item = usize>,
        rng: &mut impl Rng,
    ) -> Result<()> {
        let counts = &system.particles[voxel].xx;
        let rates = &mut self.voxels[voxel.index()];
        rates.refresh_reactions(voxel, &self.network, counts, reactions)?;
        rates.refresh_diffusion(voxel, counts)?;
        let next = self.time + waiting_time(rates.total(), rng);
        self.queue.schedule(voxel, next);
        Ok(())
    }

    /// Particles cannot be added once the voxels are set up.
    fn check_voxels<I>(&self, system: &ParticleSystem<I>) -> Result<()> {
        if system.particles.len() == self.voxels.len() {
            Ok(())
        } else {
            Err(Error::VoxelCountChanged {
                expected: self.voxels.len(),
                found: system.particles.len(),
            })
        }
    }

    /// The error for a scheduled voxel none of whose channels can fire.
    fn exhausted(&self, voxel: ParticleIdx) -> Error {
        let rates = &self.voxels[voxel.index()];
        Error::InvalidPropensity {
            voxel: voxel.index(),
            channel: rates.rrate.len() + rates.ddiag.len(),
            value: rates.total(),
        }
    }

    /// Tears down the runtime state, returning its final counters.
    /// The particles, with their chemical counts, stay with the particle system.
    pub fn destroy(self) -> RdmeTotals {
        RdmeTotals {
            time: self.time,
            total_reactions: self.total_reactions,
            total_diffusion: self.total_diffusion,
        }
    }

    /// The current simulated time.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn total_reactions(&self) -> u64 {
        self.total_reactions
    }

    pub fn total_diffusion(&self) -> u64 {
        self.total_diffusion
    }

    pub fn network(&self) -> &ReactionNetwork {
        &self.network
    }

    pub fn subdomain_diffusion(&self) -> &SubdomainDiffusion {
        &self.subdomain_diffusion
    }

    pub fn voxel_rates(&self, voxel: ParticleIdx) -> &VoxelRates {
        &self.voxels[voxel.index()]
    }

    /// The scheduled time of the next event of a voxel, infinite if it has no propensity.
    pub fn next_event_time(&self, voxel: ParticleIdx) -> f64 {
        self.queue.time_of(voxel)
    }

    /// The voxel with the globally earliest event, and the time of that event.
    pub fn peek_next(&mut self) -> Option<(f64, ParticleIdx)> {
        self.queue.peek()
    }

    /// The `(destination, rate)` pairs at which a molecule of `species` leaves `voxel`.
    pub fn diffusion_channels<'t, I>(
        &'t self,
        system: &'t ParticleSystem<I>,
        voxel: ParticleIdx,
        species: usize,
    ) -> impl Iterator<Item = (ParticleIdx, f64)> + 't {
        propensity::diffusion_channels(&system.particles, voxel, species, &self.subdomain_diffusion)
    }

    /// The total molecule count of every species over all voxels.
    pub fn species_totals<I>(&self, system: &ParticleSystem<I>) -> Vec<i64> {
        let mut totals = vec![0; self.network.num_species()];
        for particle in &system.particles {
            for (total, count) in totals.iter_mut().zip(&particle.xx) {
                *total += count;
            }
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        particle::{Particle, SystemParams},
        reaction::{MassAction, Reaction},
        sparse::CscMatrix,
        utils::DEFAULT_SEED,
    };

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// A row of particles `spacing` apart, all of type 0.
    fn line(n: usize, spacing: f64, species: usize, reactions: usize) -> ParticleSystem {
        let mut system = ParticleSystem::new(
            SystemParams::builder()
                .h(1.)
                .num_species(species)
                .num_reactions(reactions)
                .build(),
        );
        for id in 0..n {
            system
                .add_particle(
                    Particle::builder()
                        .id(id)
                        .x([id as f64 * spacing, 0., 0.])
                        .build(),
                )
                .unwrap();
        }
        system
    }

    fn diffusion_only(system: &mut ParticleSystem, u0: Vec<i64>, rng: &mut StdRng) -> Rdme {
        let network = ReactionNetwork::from_reactions(names(&["X"]), &[]).unwrap();
        let config = RdmeConfig::builder()
            .network(network)
            .subdomain_diffusion(SubdomainDiffusion::uniform(1, &[1.]))
            .u0(u0)
            .build();
        Rdme::initialize(system, config, rng).unwrap()
    }

    #[test]
    fn initialize_validates_shapes() {
        let rng = &mut StdRng::seed_from_u64(DEFAULT_SEED);
        let mut system = line(2, 0.5, 1, 0);
        let network = ReactionNetwork::from_reactions(names(&["X"]), &[]).unwrap();
        let config = RdmeConfig::builder()
            .network(network.clone())
            .subdomain_diffusion(SubdomainDiffusion::uniform(1, &[1.]))
            .u0(vec![1, 2, 3])
            .build();
        assert!(matches!(
            Rdme::initialize(&mut system, config, rng),
            Err(Error::InvalidNetwork(_))
        ));

        let config = RdmeConfig::builder()
            .network(network.clone())
            .subdomain_diffusion(SubdomainDiffusion::uniform(1, &[1., 2.]))
            .build();
        assert!(Rdme::initialize(&mut system, config, rng).is_err());

        let config = RdmeConfig::builder()
            .network(network)
            .subdomain_diffusion(SubdomainDiffusion::uniform(1, &[1.]))
            .u0(vec![1, -1])
            .build();
        assert!(matches!(
            Rdme::initialize(&mut system, config, rng),
            Err(Error::InvalidNetwork(_))
        ));
    }

    #[test]
    fn negative_counts_abort_step() {
        let rng = &mut StdRng::seed_from_u64(DEFAULT_SEED);
        let mut system = line(1, 1., 1, 1);
        // A synthesis-rate propensity whose firing consumes A.
        let stoichiometry = CscMatrix::from_columns(1, [[(0, -1i64)]]).unwrap();
        let dependency = CscMatrix::pattern(1, vec![0], vec![0, 0, 1]).unwrap();
        let network = ReactionNetwork::new(
            names(&["A"]),
            vec![MassAction::new([], 1.)],
            stoichiometry,
            dependency,
        )
        .unwrap();
        let config = RdmeConfig::builder()
            .network(network)
            .subdomain_diffusion(SubdomainDiffusion::uniform(1, &[0.]))
            .u0(vec![0])
            .build();
        let mut rdme = Rdme::initialize(&mut system, config, rng).unwrap();

        let err = rdme.advance(&mut system, 10., rng).unwrap_err();
        assert!(matches!(
            err,
            Error::NegativeCount {
                voxel: 0,
                species: 0,
                reaction: 0,
                count: -1
            }
        ));
        assert_eq!(rdme.total_reactions(), 1);
    }

    #[test]
    fn particles_added_after_setup_are_rejected() {
        let rng = &mut StdRng::seed_from_u64(DEFAULT_SEED);
        let mut system = line(1, 1., 1, 0);
        let mut rdme = diffusion_only(&mut system, vec![1], rng);
        system
            .add_particle(Particle::builder().id(1).x([0.5, 0., 0.]).build())
            .unwrap();

        let err = rdme.advance(&mut system, 1., rng).unwrap_err();
        assert!(matches!(
            err,
            Error::VoxelCountChanged {
                expected: 1,
                found: 2
            }
        ));
        assert!(rdme.dispatch(&mut system, 1., rng).is_err());
    }

    #[test]
    fn initial_propensities_and_schedule() {
        let rng = &mut StdRng::seed_from_u64(DEFAULT_SEED);
        let mut system = line(3, 0.6, 1, 0);
        let rdme = diffusion_only(&mut system, vec![3, 0, 0], rng);

        let first = rdme.voxel_rates(ParticleIdx::new(0));
        let neighbors = &system.particles[ParticleIdx::new(0)].neighbors;
        assert_eq!(neighbors.len(), 1);
        let d_i_j = neighbors[0].d_i_j;
        assert_eq!(first.ddiag, vec![d_i_j]);
        assert_eq!(first.sdrate, 3. * d_i_j);
        assert!(rdme.next_event_time(ParticleIdx::new(0)).is_finite());
        // Voxels without molecules never fire.
        assert_eq!(rdme.next_event_time(ParticleIdx::new(1)), f64::INFINITY);
        assert_eq!(rdme.next_event_time(ParticleIdx::new(2)), f64::INFINITY);
    }

    #[test]
    fn diffusion_moves_single_molecules() {
        let rng = &mut StdRng::seed_from_u64(DEFAULT_SEED);
        let mut system = line(4, 0.4, 1, 0);
        let mut rdme = diffusion_only(&mut system, vec![5, 0, 0, 2], rng);

        for _ in 0..200 {
            let before: Vec<i64> = system.particles.iter().map(|p| p.xx[0]).collect();
            let Some((_, event)) = rdme.dispatch(&mut system, f64::INFINITY, rng).unwrap() else {
                panic!("the molecules should keep diffusing");
            };
            let Event::Diffusion {
                source,
                destination,
                species,
            } = event
            else {
                panic!("there are no reactions");
            };
            assert_eq!(species, 0);
            assert!(system.particles[source]
                .neighbors
                .iter()
                .any(|n| n.particle == destination));
            for voxel in system.particles.indices() {
                let change = system.particles[voxel].xx[0] - before[voxel.index()];
                let expected = if voxel == source {
                    -1
                } else if voxel == destination {
                    1
                } else {
                    0
                };
                assert_eq!(change, expected);
            }
            assert_eq!(rdme.species_totals(&system), vec![7]);
        }
        assert_eq!(rdme.total_diffusion(), 200);
        assert_eq!(rdme.total_reactions(), 0);
    }

    #[test]
    fn events_only_touch_affected_voxels() {
        let rng = &mut StdRng::seed_from_u64(DEFAULT_SEED);
        let mut system = line(6, 0.6, 2, 1);
        let network =
            ReactionNetwork::from_reactions(names(&["A", "B"]), &[Reaction::new([(0, 1)], [(0, -1), (1, 1)], 0.5)])
                .unwrap();
        let config = RdmeConfig::builder()
            .network(network)
            .subdomain_diffusion(SubdomainDiffusion::uniform(1, &[1., 0.3]))
            .u0(vec![4, 0, 0, 2, 6, 1, 0, 0, 3, 3, 1, 0])
            .build();
        let mut rdme = Rdme::initialize(&mut system, config, rng).unwrap();

        for _ in 0..300 {
            let rates_before: Vec<VoxelRates> = system
                .particles
                .indices()
                .map(|v| rdme.voxel_rates(v).clone())
                .collect();
            let times_before: Vec<f64> = system
                .particles
                .indices()
                .map(|v| rdme.next_event_time(v))
                .collect();

            let Some((_, event)) = rdme.dispatch(&mut system, f64::INFINITY, rng).unwrap() else {
                break;
            };
            let touched = match event {
                Event::Reaction { voxel, .. } => vec![voxel],
                Event::Diffusion {
                    source,
                    destination,
                    ..
                } => vec![source, destination],
            };
            for voxel in system.particles.indices() {
                if touched.contains(&voxel) {
                    continue;
                }
                assert_eq!(rdme.voxel_rates(voxel), &rates_before[voxel.index()]);
                assert_eq!(rdme.next_event_time(voxel), times_before[voxel.index()]);
            }
        }
    }

    #[test]
    fn dispatches_globally_earliest_voxel() {
        let rng = &mut StdRng::seed_from_u64(DEFAULT_SEED);
        let mut system = line(5, 0.7, 1, 0);
        let mut rdme = diffusion_only(&mut system, vec![2, 3, 0, 1, 4], rng);

        for _ in 0..200 {
            let earliest = system
                .particles
                .indices()
                .map(|v| (rdme.next_event_time(v), v))
                .filter(|(time, _)| time.is_finite())
                .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            let (time, event) = rdme
                .dispatch(&mut system, f64::INFINITY, rng)
                .unwrap()
                .unwrap();
            assert_eq!(Some((time, event.voxel())), earliest);
            assert_eq!(rdme.time(), time);
        }
    }

    #[test]
    fn advance_stops_at_step_boundary() {
        let rng = &mut StdRng::seed_from_u64(DEFAULT_SEED);
        let mut system = line(3, 0.5, 1, 0);
        let mut rdme = diffusion_only(&mut system, vec![10, 0, 10], rng);

        let summary = rdme.advance(&mut system, 0.5, rng).unwrap();
        assert_eq!(rdme.time(), 0.5);
        assert_eq!(summary.diffusions, rdme.total_diffusion());
        for voxel in system.particles.indices() {
            assert!(rdme.next_event_time(voxel) > 0.5);
        }
        rdme.advance(&mut system, 0.25, rng).unwrap();
        assert_eq!(rdme.time(), 0.75);
        assert_eq!(rdme.species_totals(&system), vec![20]);

        let totals = rdme.destroy();
        assert_eq!(totals.time, 0.75);
        assert!(totals.total_diffusion > 0);
    }

    #[test]
    fn unchanged_topology_keeps_schedule() {
        let rng = &mut StdRng::seed_from_u64(DEFAULT_SEED);
        let mut system = line(3, 0.5, 1, 0);
        let mut rdme = diffusion_only(&mut system, vec![4, 0, 4], rng);
        let scheduled = |rdme: &Rdme, system: &ParticleSystem| -> Vec<f64> {
            system
                .particles
                .indices()
                .map(|v| rdme.next_event_time(v))
                .collect()
        };

        let initial = scheduled(&rdme, &system);
        rdme.advance(&mut system, 0., rng).unwrap();
        assert_eq!(scheduled(&rdme, &system), initial);

        system.particles[ParticleIdx::new(2)].x = [0.9, 0., 0.];
        rdme.advance(&mut system, 0., rng).unwrap();
        assert_ne!(scheduled(&rdme, &system), initial);
    }

    #[test]
    fn isolated_voxels_never_fire() {
        let rng = &mut StdRng::seed_from_u64(DEFAULT_SEED);
        let mut system = line(2, 3., 1, 0);
        let mut rdme = diffusion_only(&mut system, vec![10, 0], rng);
        assert_eq!(rdme.peek_next(), None);
        let summary = rdme.advance(&mut system, 100., rng).unwrap();
        assert_eq!(summary, StepSummary::default());
        assert_eq!(system.particles[ParticleIdx::new(0)].xx, vec![10]);
    }

    #[test]
    fn moved_particles_change_topology() {
        let rng = &mut StdRng::seed_from_u64(DEFAULT_SEED);
        let mut system = line(2, 3., 1, 0);
        let mut rdme = diffusion_only(&mut system, vec![10, 0], rng);
        rdme.advance(&mut system, 1., rng).unwrap();
        assert_eq!(rdme.total_diffusion(), 0);

        // The dynamics solver brings the particles within range.
        system.particles[ParticleIdx::new(1)].x = [0.5, 0., 0.];
        rdme.advance(&mut system, 100., rng).unwrap();
        assert!(rdme.total_diffusion() > 0);
        assert_eq!(rdme.species_totals(&system), vec![10]);
    }

    #[test]
    fn degenerate_geometry_aborts_step() {
        let rng = &mut StdRng::seed_from_u64(DEFAULT_SEED);
        let mut system = line(2, 3., 1, 0);
        let mut rdme = diffusion_only(&mut system, vec![1, 0], rng);
        for particle in system.particles.iter_mut() {
            particle.mass = 0.;
        }
        system.particles[ParticleIdx::new(1)].x = [0.5, 0., 0.];
        let err = rdme.advance(&mut system, 1., rng).unwrap_err();
        assert!(matches!(err, Error::DegenerateCoefficient(_)));
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let run = || {
            let rng = &mut StdRng::seed_from_u64(DEFAULT_SEED);
            let mut system = line(4, 0.5, 1, 0);
            let mut rdme = diffusion_only(&mut system, vec![5, 5, 0, 0], rng);
            rdme.advance(&mut system, 2., rng).unwrap();
            (
                system.particles.iter().map(|p| p.xx.clone()).collect::<Vec<_>>(),
                rdme.total_diffusion(),
            )
        };
        assert_eq!(run(), run());
    }
}
