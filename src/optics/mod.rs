//! Optics of the reflective SAIM substrate.

pub mod fresnel;
pub mod profile;
pub mod refractive_index;

pub use fresnel::{field_intensity, phase_difference, snell, wavenumber, OxideStack};
pub use profile::{intensity_profiles, IntensityProfile, ProfileSettings};
pub use refractive_index::{Compound, IndexSample, RefractiveIndexTable};
