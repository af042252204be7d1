use std::path::PathBuf;

use thiserror::Error;

/// The intermediate quantities of a diffusion coefficient that evaluated to NaN.
#[derive(Clone, Debug, PartialEq)]
pub struct CoefficientDiagnostic {
    /// The id of the particle whose neighbor list was being built.
    pub particle: usize,
    /// The id of the neighbor.
    pub neighbor: usize,
    pub r: f64,
    pub h: f64,
    pub alpha: f64,
    pub dwdr: f64,
    pub wfd: f64,
    pub mass: f64,
    pub rho: f64,
    pub neighbor_mass: f64,
    pub neighbor_rho: f64,
}

/// Errors that terminate a simulation run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "got NaN calculating D_i_j for particle {} and neighbor {}: r={:e} h={:e} alpha={:e} dWdr={:e} wfd={:e} mass={:e} rho={:e} n.mass={:e} n.rho={:e}",
        .0.particle, .0.neighbor, .0.r, .0.h, .0.alpha, .0.dwdr, .0.wfd, .0.mass, .0.rho, .0.neighbor_mass, .0.neighbor_rho
    )]
    DegenerateCoefficient(Box<CoefficientDiagnostic>),

    #[error("invalid propensity {value} for channel {channel} of voxel {voxel}")]
    InvalidPropensity {
        voxel: usize,
        channel: usize,
        value: f64,
    },

    #[error("species {species} of voxel {voxel} dropped to {count} molecules after reaction {reaction}")]
    NegativeCount {
        voxel: usize,
        species: usize,
        reaction: usize,
        count: i64,
    },

    #[error("the system has {found} particles, but the reaction-diffusion state was set up for {expected}")]
    VoxelCountChanged { expected: usize, found: usize },

    #[error("unsupported dimension {0}, expected 2 or 3")]
    InvalidDimension(usize),

    #[error("failed to allocate {requested} slots for the neighbor search")]
    Allocation { requested: usize },

    #[error("a particle with id {0} already exists")]
    DuplicateParticle(usize),

    #[error("invalid reaction-diffusion network: {0}")]
    InvalidNetwork(String),

    #[error("failed to parse line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
