mod error;
pub use error::{CoefficientDiagnostic, Error, Result};
mod indexed_vec;
pub use indexed_vec::{Idx, IndexedVec};
pub mod kernel;
mod network;
pub use network::{ReactionNetwork, SubdomainDiffusion};
mod parsers;
pub use parsers::{Model, ParseState};
mod particle;
pub use particle::{BoundaryCondition, Neighbor, Particle, ParticleIdx, ParticleSystem, SystemParams};
mod propensity;
pub use propensity::VoxelRates;
mod rdme;
pub use rdme::{Event, Rdme, RdmeConfig, RdmeTotals, StepSummary};
mod reaction;
pub use reaction::{MassAction, Reaction};
mod scheduler;
pub use scheduler::EventQueue;
mod sparse;
pub use sparse::CscMatrix;
mod spatial_index;
pub use spatial_index::{BruteForceIndex, Hit, RTreeIndex, SearchMode, SpatialIndex};
mod tests;
mod utils;
pub use utils::DEFAULT_SEED;
