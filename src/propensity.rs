use crate::{
    error::{Error, Result},
    indexed_vec::IndexedVec,
    network::{ReactionNetwork, SubdomainDiffusion},
    particle::{Particle, ParticleIdx},
};

/// The propensities of a single voxel.
///
/// Channel numbers in errors count reaction channels first, followed by one
/// diffusion channel per species.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VoxelRates {
    /// The total reaction propensity, the sum of `rrate`.
    pub srrate: f64,
    /// The propensity of every reaction channel.
    pub rrate: Vec<f64>,
    /// The total diffusion propensity.
    pub sdrate: f64,
    /// The total rate at which a single molecule of each species leaves the voxel.
    pub ddiag: Vec<f64>,
}

impl VoxelRates {
    pub fn new(num_reactions: usize, num_species: usize) -> VoxelRates {
        VoxelRates {
            srrate: 0.,
            rrate: vec![0.; num_reactions],
            sdrate: 0.,
            ddiag: vec![0.; num_species],
        }
    }

    /// The total propensity of the voxel.
    pub fn total(&self) -> f64 {
        self.srrate + self.sdrate
    }

    /// Recomputes the given reaction channels, then the total reaction propensity.
    pub fn refresh_reactions(
        &mut self,
        voxel: ParticleIdx,
        network: &ReactionNetwork,
        counts: &[i64],
        channels: impl IntoIterator<Item = usize>,
    ) -> Result<()> {
        for channel in channels {
            let rate = network.propensity(channel).propensity(counts);
            self.rrate[channel] = checked(voxel, channel, rate)?;
        }
        self.srrate = self.rrate.iter().sum();
        Ok(())
    }

    /// Recomputes every reaction channel.
    pub fn refresh_all_reactions(
        &mut self,
        voxel: ParticleIdx,
        network: &ReactionNetwork,
        counts: &[i64],
    ) -> Result<()> {
        self.refresh_reactions(voxel, network, counts, 0..network.num_reactions())
    }

    /// Recomputes the total diffusion propensity from the per-species rates.
    pub fn refresh_diffusion(&mut self, voxel: ParticleIdx, counts: &[i64]) -> Result<()> {
        let mut sdrate = 0.;
        for (species, (&rate, &count)) in self.ddiag.iter().zip(counts).enumerate() {
            sdrate += checked(voxel, self.rrate.len() + species, rate * count as f64)?;
        }
        self.sdrate = sdrate;
        Ok(())
    }

    /// Recomputes the per-species rates from the neighbor list, then the total diffusion propensity.
    pub fn refresh_topology(
        &mut self,
        voxel: ParticleIdx,
        particles: &IndexedVec<Particle>,
        diffusion: &SubdomainDiffusion,
    ) -> Result<()> {
        for (species, ddiag) in self.ddiag.iter_mut().enumerate() {
            *ddiag = diffusion_channels(particles, voxel, species, diffusion)
                .map(|(_, rate)| rate)
                .sum();
        }
        self.refresh_diffusion(voxel, &particles[voxel].xx)
    }
}

/// Rejects negative and NaN rates, which signal corrupted bookkeeping.
fn checked(voxel: ParticleIdx, channel: usize, rate: f64) -> Result<f64> {
    if rate >= 0. {
        Ok(rate)
    } else {
        Err(Error::InvalidPropensity {
            voxel: voxel.index(),
            channel,
            value: rate,
        })
    }
}

/// The `(destination, rate)` pairs at which a single molecule of `species` leaves `voxel`.
///
/// The rate towards a neighbor is its diffusion-transport coefficient scaled by the
/// species' diffusion rate between the two subdomains.
pub fn diffusion_channels<'t>(
    particles: &'t IndexedVec<Particle>,
    voxel: ParticleIdx,
    species: usize,
    diffusion: &'t SubdomainDiffusion,
) -> impl Iterator<Item = (ParticleIdx, f64)> + 't {
    let me = &particles[voxel];
    me.neighbors.iter().map(move |neighbor| {
        let to = particles[neighbor.particle].particle_type;
        let rate = neighbor.d_i_j * diffusion.rate(species, me.particle_type, to);
        (neighbor.particle, rate)
    })
}
