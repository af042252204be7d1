use bon::Builder;
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    indexed_vec::{Idx, IndexedVec},
    kernel::{self, Body},
    spatial_index::{distance_squared, RTreeIndex, SearchMode, SpatialIndex},
};

/// The index of a particle in its system's arena. In the chemical engine a particle is a voxel.
pub type ParticleIdx = Idx<Particle>;

/// The boundary condition of an axis, applied by the dynamics solver.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryCondition {
    /// Particles are free to leave the domain along the axis.
    #[default]
    None,
    /// Particles leaving one side re-enter at the other.
    Periodic,
}

/// A neighbor of a particle, with the quantities derived from their separation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    pub particle: ParticleIdx,
    /// The separation distance, in `[0, h]`.
    pub r: f64,
    /// The kernel derivative at `r`.
    pub dwdr: f64,
    /// The diffusion-transport coefficient towards the neighbor.
    pub d_i_j: f64,
}

/// A single simulation entity.
#[derive(Clone, Debug, Builder)]
pub struct Particle {
    pub id: usize,
    #[builder(default)]
    pub x: [f64; 3],
    #[builder(default)]
    pub v: [f64; 3],
    #[builder(default = 1.)]
    pub mass: f64,
    #[builder(default = 1.)]
    pub rho: f64,
    /// The viscosity.
    #[builder(default = 0.01)]
    pub nu: f64,
    #[builder(default)]
    pub solid: bool,
    /// The subdomain the particle belongs to.
    #[builder(default)]
    pub particle_type: usize,
    /// The molecule count of each chemical species.
    #[builder(default)]
    pub xx: Vec<i64>,
    /// Scratch values of the data functions.
    #[builder(default)]
    pub data_fn: Vec<f64>,
    /// Rebuilt from scratch on every neighbor search.
    #[builder(skip)]
    pub neighbors: Vec<Neighbor>,
}

impl Particle {
    /// A fluid particle at the origin, with unit mass and density.
    pub fn new(id: usize) -> Particle {
        Particle::builder().id(id).build()
    }

    pub fn distance_squared(&self, other: &Particle) -> f64 {
        distance_squared(&self.x, &other.x)
    }

    pub fn distance(&self, other: &Particle) -> f64 {
        self.distance_squared(other).sqrt()
    }

    fn geometry(&self) -> Geometry {
        (self.x, self.mass, self.rho, self.particle_type)
    }

    fn body(&self) -> Body {
        Body {
            id: self.id,
            mass: self.mass,
            rho: self.rho,
        }
    }
}

/// The particle state that neighbor lists and diffusion rates are derived from.
type Geometry = ([f64; 3], f64, f64, usize);

/// Global parameters of a particle system.
#[derive(Clone, Debug, Builder)]
pub struct SystemParams {
    #[builder(default = 3)]
    pub dimension: usize,
    /// The support radius.
    pub h: f64,
    #[builder(default)]
    pub boundary_conditions: [BoundaryCondition; 3],
    #[builder(default)]
    pub gravity: [f64; 3],
    /// The number of subdomain types.
    #[builder(default = 1)]
    pub num_types: usize,
    #[builder(default)]
    pub num_species: usize,
    #[builder(default)]
    pub num_reactions: usize,
    #[builder(default)]
    pub num_data_fn: usize,
    #[builder(default)]
    pub search_mode: SearchMode,
    /// If set, neighbor lists are built once and reused by every step.
    #[builder(default)]
    pub static_domain: bool,
}

/// The full particle collection, together with the spatial index over it.
#[derive(Debug, Clone)]
pub struct ParticleSystem<I = RTreeIndex> {
    pub params: SystemParams,
    pub particles: IndexedVec<Particle>,
    index: I,
    ids: FxHashSet<usize>,
    /// The geometry the neighbor lists were last built from.
    resolved: Vec<Geometry>,
    /// Whether the neighbor lists reflect the current particle set.
    neighbors_built: bool,
}

impl ParticleSystem<RTreeIndex> {
    pub fn new(params: SystemParams) -> Self {
        Self::with_index(params, RTreeIndex::default())
    }
}

impl<I: SpatialIndex> ParticleSystem<I> {
    pub fn with_index(params: SystemParams, index: I) -> Self {
        ParticleSystem {
            params,
            particles: IndexedVec::new(),
            index,
            ids: FxHashSet::default(),
            resolved: Vec::new(),
            neighbors_built: false,
        }
    }

    /// Adds a particle, sizing its chemical and data-function vectors to the system.
    pub fn add_particle(&mut self, mut particle: Particle) -> Result<ParticleIdx> {
        if !self.ids.insert(particle.id) {
            return Err(Error::DuplicateParticle(particle.id));
        }
        particle.xx.resize(self.params.num_species, 0);
        particle.data_fn.resize(self.params.num_data_fn, 0.);
        particle.neighbors.clear();
        self.neighbors_built = false;
        Ok(self.particles.push(particle))
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Drops the coordinates beyond the system's dimension.
    fn project(&self, x: &[f64; 3]) -> [f64; 3] {
        let mut projected = *x;
        projected[self.params.dimension.min(3)..].fill(0.);
        projected
    }

    /// Rebuilds the spatial index from the current particle positions.
    pub fn rebuild_index(&mut self) {
        let projected: Vec<[f64; 3]> = self
            .particles
            .iter()
            .map(|p| self.project(&p.x))
            .collect();
        self.index.rebuild(&projected);
        debug!(particles = projected.len(), "rebuilt spatial index");
    }

    /// Rebuilds the index and every neighbor list.
    ///
    /// Nothing is rebuilt if no particle moved or changed its mass, density or type since
    /// the last rebuild. For a static domain, the lists are only built on the first call
    /// after particles were added.
    /// Returns whether the neighbor lists were rebuilt.
    #[tracing::instrument(skip(self), fields(particles = self.particles.len()))]
    pub fn update_neighbors(&mut self) -> Result<bool> {
        if !matches!(self.params.dimension, 2 | 3) {
            return Err(Error::InvalidDimension(self.params.dimension));
        }
        if self.neighbors_built
            && (self.params.static_domain
                || self.particles.iter().map(Particle::geometry).eq(self.resolved.iter().copied()))
        {
            return Ok(false);
        }
        self.rebuild_index();
        for idx in self.particles.indices() {
            self.find_neighbors(idx)?;
        }
        self.resolved = self.particles.iter().map(Particle::geometry).collect();
        self.neighbors_built = true;
        Ok(true)
    }

    /// Replaces the neighbor list of a particle with all particles within the support radius.
    ///
    /// The spatial index must be up to date with the particle positions.
    pub fn find_neighbors(&mut self, idx: ParticleIdx) -> Result<()> {
        let h = self.params.h;
        let me = &self.particles[idx];
        let query = self.project(&me.x);
        let hits = self.index.query_radius(&query, h, self.params.search_mode)?;

        let mut neighbors = Vec::with_capacity(hits.len());
        for hit in hits {
            let neighbor_idx = ParticleIdx::new(hit.index);
            // Compared by identity, since the distance to itself is zero.
            if neighbor_idx == idx {
                continue;
            }
            let neighbor = &self.particles[neighbor_idx];
            let r2 = hit
                .dist2
                .unwrap_or_else(|| distance_squared(&query, &self.project(&neighbor.x)));
            let Some(coupling) = kernel::couple(&me.body(), &neighbor.body(), r2, h)? else {
                continue;
            };
            trace!(
                me = me.id,
                neighbor = neighbor.id,
                r = coupling.r,
                dx = me.x[0] - neighbor.x[0],
                dy = me.x[1] - neighbor.x[1],
                dz = me.x[2] - neighbor.x[2],
                "found neighbor"
            );
            neighbors.push(Neighbor {
                particle: neighbor_idx,
                r: coupling.r,
                dwdr: coupling.dwdr,
                d_i_j: coupling.d_i_j,
            });
        }
        self.particles[idx].neighbors = neighbors;
        Ok(())
    }
}
