//! The kernel math coupling particle geometry to diffusion.
//!
//! The smoothing kernel is the 3D quintic (Lucy) kernel
//! `W(r) = alpha (1 + 3R) (1 - R)^3` with `R = r / h`, and the diffusion-transport
//! coefficient follows Tartakovsky et al. (2007) as used by Drawert et al. (2019).

use std::f64::consts::PI;

use crate::error::{CoefficientDiagnostic, Error, Result};

/// Regularizes `r^2 / (r^2 + EPSILON h^2)` so coincident particles do not blow up.
pub const EPSILON: f64 = 0.01;

/// `1260 / (16 pi)`, the magnitude of the 3D kernel gradient prefactor.
const WFD_3D: f64 = 25.066903536973515383e0;

/// The physical state of a particle that the resolver reads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Body {
    pub id: usize,
    pub mass: f64,
    pub rho: f64,
}

/// The quantities cached on an accepted neighbor relation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coupling {
    pub r: f64,
    pub dwdr: f64,
    pub d_i_j: f64,
}

/// The 3D normalization constant of the kernel.
pub fn alpha(h: f64) -> f64 {
    105. / (16. * PI * h * h * h)
}

/// The derivative of the kernel with respect to `r`.
pub fn dwdr(r: f64, h: f64) -> f64 {
    let big_r = r / h;
    alpha(h) * (-12. * r / (h * h)) * ((1. - big_r) * (1. - big_r))
}

/// The finite-difference kernel gradient, `dW/dr / r` in closed form.
pub fn wfd(r: f64, h: f64) -> f64 {
    let ih = 1. / h;
    let ihsq = ih * ih;
    let dhr = h - r;
    -WFD_3D * dhr * dhr * ihsq * ihsq * ihsq * ih
}

/// Computes the coupling between `me` and `neighbor` given their squared distance.
///
/// Returns `Ok(None)` if the pair lies outside the support radius, which happens since
/// range queries may slightly overshoot the radius.
/// A NaN coefficient is a fatal error carrying all intermediate quantities.
pub fn couple(me: &Body, neighbor: &Body, r2: f64, h: f64) -> Result<Option<Coupling>> {
    let r = r2.sqrt();
    if r > h {
        return Ok(None);
    }

    let dwdr = dwdr(r, h);
    let wfd = wfd(r, h);
    let d_i_j = -2.0 * (me.mass * neighbor.mass) / (me.mass + neighbor.mass)
        * (me.rho + neighbor.rho)
        / (me.rho * neighbor.rho)
        * r2
        * wfd
        / (r2 + EPSILON * h * h);

    if d_i_j.is_nan() {
        let diagnostic = CoefficientDiagnostic {
            particle: me.id,
            neighbor: neighbor.id,
            r,
            h,
            alpha: alpha(h),
            dwdr,
            wfd,
            mass: me.mass,
            rho: me.rho,
            neighbor_mass: neighbor.mass,
            neighbor_rho: neighbor.rho,
        };
        tracing::error!(?diagnostic, "degenerate diffusion coefficient");
        return Err(Error::DegenerateCoefficient(Box::new(diagnostic)));
    }

    Ok(Some(Coupling { r, dwdr, d_i_j }))
}
