//! Forward model of the electron-microscope contrast transfer function.
//!
//! The formula follows Rohou & Grigorieff (CTFFIND4, JSB 192, 2015) and
//! Singer & Sigworth (Annu. Rev. Biomed. Data Sci. 3, 2020):
//!
//! `CTF(s, θ) = -sin(π·λ·s²·Δf + (π/2)·λ·s²·ΔΔf·cos(2(θ-θ₀)) - (π/2)·λ³·s⁴·Cs + φ + asin(Q)) · exp(-B·s²/4)`

use crate::fft2::{fft2, ifft2, ifft2_shift_inplace};
use log::{debug, info};
use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};
use num_complex::Complex;
use serde::Deserialize;
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CtfError {
    #[error("Accelerating voltage must be positive and finite, got {0} kV")]
    InvalidVoltage(f64),

    #[error("Pixel size must be positive and finite, got {0} Å/pixel")]
    InvalidPixelSize(f64),

    #[error("Image size must be a positive even number of pixels, got {0}")]
    InvalidImageSize(usize),

    #[error("Amplitude contrast must lie in [-100, 100] percent, got {0}")]
    AmplitudeContrastOutOfRange(f64),

    #[error("Projection shape {found:?} does not match CTF shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// Relativistic electron wavelength in Å for an accelerating voltage in kV.
///
/// Numerically simplified form: `12.2639 / sqrt(V + 0.97845e-6·V²)` with `V` in volts.
pub fn wavelength(voltage_kv: f64) -> f64 {
    12.2639 / (voltage_kv * 1000.0 + 0.97845 * voltage_kv * voltage_kv).sqrt()
}

/// Microscope and specimen parameters of the CTF.
///
/// Units follow the usual cryo-EM conventions, not SI.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CtfParams {
    /// Defocus Δf, µm.
    pub defocus: f64,
    /// Astigmatism magnitude ΔΔf (max - min defocus), µm.
    pub astigmatism_magnitude: f64,
    /// Direction of maximum defocus θ₀, degrees.
    pub astigmatism_angle: f64,
    /// Additional phase shift φ (e.g. phase plate), degrees.
    pub phase_shift: f64,
    /// Å/pixel.
    pub pixel_size: f64,
    /// Accelerating voltage, kV.
    pub voltage: f64,
    /// Spherical aberration Cs, mm.
    pub spherical_aberration: f64,
    /// Amplitude contrast Q, percent.
    pub amplitude_contrast_fraction: f64,
    /// Edge length of the square CTF image, pixels.
    pub image_size: usize,
    /// B-factor, Å².
    pub b_factor: f64,
}

impl Default for CtfParams {
    fn default() -> Self {
        CtfParams {
            defocus: 1.5,
            astigmatism_magnitude: 0.0,
            astigmatism_angle: 0.0,
            phase_shift: 0.0,
            pixel_size: 1.0,
            voltage: 300.0,
            spherical_aberration: 2.7,
            amplitude_contrast_fraction: 0.0,
            image_size: 256,
            b_factor: 0.0,
        }
    }
}

impl CtfParams {
    /// Electron wavelength in Å for the configured voltage.
    pub fn wavelength(&self) -> f64 {
        wavelength(self.voltage)
    }

    /// Checks every parameter used by the 2D image and stack operations.
    pub fn validate(&self) -> Result<(), CtfError> {
        self.check_optics()?;
        if !(self.pixel_size.is_finite() && self.pixel_size > 0.0) {
            return Err(CtfError::InvalidPixelSize(self.pixel_size));
        }
        if self.image_size == 0 || self.image_size % 2 != 0 {
            return Err(CtfError::InvalidImageSize(self.image_size));
        }
        Ok(())
    }

    // The subset of parameters needed for a pointwise evaluation.
    fn check_optics(&self) -> Result<(), CtfError> {
        if !(self.voltage.is_finite() && self.voltage > 0.0) {
            return Err(CtfError::InvalidVoltage(self.voltage));
        }
        // negated comparison also rejects NaN
        if !(self.amplitude_contrast_fraction.abs() <= 100.0) {
            return Err(CtfError::AmplitudeContrastOutOfRange(
                self.amplitude_contrast_fraction,
            ));
        }
        Ok(())
    }

    /// Constant phase term: phase shift plus amplitude-contrast phase, radians.
    fn phase_offset(&self) -> f64 {
        self.phase_shift * PI / 180.0 + (self.amplitude_contrast_fraction / 100.0).asin()
    }

    /// Evaluates the CTF at spatial frequency `s` (1/Å) and azimuth `theta` (degrees).
    ///
    /// `s = 0` is valid and gives `-sin(φ + asin(Q))` for any azimuth.
    pub fn ctf_value(&self, s: f64, theta: f64) -> Result<f64, CtfError> {
        self.check_optics()?;
        Ok(self.evaluate(self.wavelength(), self.phase_offset(), s, theta))
    }

    /// Radial CTF profile along azimuth `theta` at each of the frequencies in `s`.
    pub fn ctf1d(&self, s: &[f64], theta: f64) -> Result<Vec<f64>, CtfError> {
        self.check_optics()?;
        let wl = self.wavelength();
        let d = self.phase_offset();
        Ok(s.iter().map(|&s| self.evaluate(wl, d, s, theta)).collect())
    }

    fn evaluate(&self, wl: f64, d: f64, s: f64, theta: f64) -> f64 {
        // defocus, µm -> Å
        let a = PI * wl * s * s * self.defocus * 1e4;
        // astigmatism, µm -> Å
        let b = PI / 2.0
            * wl
            * s
            * s
            * self.astigmatism_magnitude
            * 1e4
            * (2.0 * (theta - self.astigmatism_angle) * PI / 180.0).cos();
        // spherical aberration, mm -> Å
        let c = -PI / 2.0 * wl * wl * wl * s * s * s * s * self.spherical_aberration * 1e7;
        let envelope = (-self.b_factor * s * s / 4.0).exp();
        -(a + b + c + d).sin() * envelope
    }

    /// Nyquist frequency in 1/Å.
    pub fn nyquist(&self) -> f64 {
        0.5 / self.pixel_size
    }

    /// Centered frequency axis `k · s_interval` for `k` in `[-n/2, n/2)`, 1/Å.
    pub fn frequency_axis(&self) -> Array1<f64> {
        let n = self.image_size;
        let half = n / 2;
        let s_interval = if half > 0 {
            self.nyquist() / half as f64
        } else {
            0.0
        };
        Array1::from_shape_fn(n, |k| (k as f64 - half as f64) * s_interval)
    }

    /// 2D CTF image with the zero frequency at `(n/2, n/2)`.
    ///
    /// Element `(i, j)` holds the CTF at `(sx[i], sy[j])`. The image must be
    /// quadrant swapped (see [`CtfParams::ctf2d_shifted`]) before being used
    /// as a filter on an unshifted spectrum.
    pub fn ctf2d(&self) -> Result<Array2<f64>, CtfError> {
        self.validate()?;

        let n = self.image_size;
        let wl = self.wavelength();
        let d = self.phase_offset();
        let axis = self.frequency_axis();
        debug!(
            "ctf2d: {}x{} wavelength={:.6} Å nyquist={:.6} 1/Å interval={:.6e} 1/Å",
            n,
            n,
            wl,
            self.nyquist(),
            self.nyquist() / (n / 2) as f64
        );

        let mut ctf_img = Array2::zeros([n, n]);
        Zip::indexed(&mut ctf_img).par_for_each(|(i, j), e| {
            let sx = axis[i];
            let sy = axis[j];
            let s = (sx * sx + sy * sy).sqrt();
            let theta = sy.atan2(sx) * 180.0 / PI;
            *e = self.evaluate(wl, d, s, theta);
        });
        Ok(ctf_img)
    }

    /// 2D CTF image with the zero frequency moved to `(0, 0)`, ready to multiply a raw FFT.
    pub fn ctf2d_shifted(&self) -> Result<Array2<f64>, CtfError> {
        let mut ctf_img = self.ctf2d()?;
        ifft2_shift_inplace(ctf_img.view_mut());
        Ok(ctf_img)
    }

    /// Degrades every projection of `stack` (axis 0 indexes projections) with this CTF.
    pub fn apply_to_stack(&self, stack: ArrayView3<f64>) -> Result<Array3<f64>, CtfError> {
        let ctf = self.ctf2d_shifted()?;
        let (count, h, w) = stack.dim();
        if (h, w) != ctf.dim() {
            return Err(CtfError::ShapeMismatch {
                expected: ctf.dim(),
                found: (h, w),
            });
        }
        info!("Applying CTF to {} projections of {}x{}", count, h, w);

        let mut out = Array3::zeros(stack.raw_dim());
        for (projection, mut degraded) in stack.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0)))
        {
            degraded.assign(&apply_ctf(projection, ctf.view())?);
        }
        Ok(out)
    }
}

/// Filters a real projection by a corner-centered CTF: `Re(ifft2(fft2(p) · ctf))`.
pub fn apply_ctf(
    projection: ArrayView2<f64>,
    ctf_shifted: ArrayView2<f64>,
) -> Result<Array2<f64>, CtfError> {
    if projection.dim() != ctf_shifted.dim() {
        return Err(CtfError::ShapeMismatch {
            expected: ctf_shifted.dim(),
            found: projection.dim(),
        });
    }

    let mut spectrum = fft2(projection.mapv(|v| Complex::new(v, 0.0)));
    Zip::from(&mut spectrum)
        .and(&ctf_shifted)
        .par_for_each(|e, &c| *e *= c);
    Ok(ifft2(spectrum).mapv(|v| v.re))
}

/// Linearly rescales `image` to `[0, 255]` for 8-bit export.
///
/// A constant image maps to all zeros.
pub fn normalise_to_u8_range(image: ArrayView2<f64>) -> Array2<f64> {
    let min = image.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = image.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !(range > 0.0) {
        return Array2::zeros(image.raw_dim());
    }
    image.mapv(|v| (v - min) * 255.0 / range)
}
