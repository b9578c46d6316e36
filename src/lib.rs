//! Forward simulation utilities for single-particle cryo-EM:
//!
//! * [`ctf`]: the contrast transfer function as a 1D profile, a 2D image, and a
//!   Fourier-space filter for stacks of projections.
//! * [`orientation`]: quasi-uniform sampling of projection directions with the
//!   P94 iso-latitude grid or the SK97 spiral.
//!
//! The two are independent. [`mrc`] reads and writes the image stacks the CTF
//! is applied to, and [`config`] loads both parameter sets from TOML.

pub mod config;
pub mod ctf;
mod error;
mod fft2;
pub mod mrc;
pub mod orientation;

pub use crate::config::Config;
pub use crate::ctf::{apply_ctf, normalise_to_u8_range, wavelength, CtfError, CtfParams};
pub use crate::error::{Error, Result};
pub use crate::fft2::{fft2, fft2_shift_inplace, ifft2, ifft2_shift_inplace};
pub use crate::orientation::{
    sample, sample_p94, sample_sk97, OrientationSampler, Orientations, SamplingError,
    SamplingMethod,
};
