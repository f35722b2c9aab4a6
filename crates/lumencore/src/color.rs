//! RGB spectral samples.
//!
//! The renderer carries color as three-channel float RGB everywhere past the
//! image-map boundary (see `image::colorspace`); this module is the
//! arithmetic `Spectrum` type every texture, material, and light operates on.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Spectrum {
    pub const BLACK: Spectrum = Spectrum { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: Spectrum = Spectrum { r: 1.0, g: 1.0, b: 1.0 };

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Spectrum { r, g, b }
    }

    pub const fn splat(v: f32) -> Self {
        Spectrum { r: v, g: v, b: v }
    }

    pub fn is_black(&self) -> bool {
        self.r == 0.0 && self.g == 0.0 && self.b == 0.0
    }

    pub fn has_nan(&self) -> bool {
        self.r.is_nan() || self.g.is_nan() || self.b.is_nan()
    }

    /// Rec. 709 relative luminance.
    pub fn luminance(&self) -> f32 {
        0.2126 * self.r + 0.7152 * self.g + 0.0722 * self.b
    }

    pub fn max_component(&self) -> f32 {
        self.r.max(self.g).max(self.b)
    }

    pub fn clamp(&self, lo: f32, hi: f32) -> Spectrum {
        Spectrum::new(self.r.clamp(lo, hi), self.g.clamp(lo, hi), self.b.clamp(lo, hi))
    }

    pub fn lerp(a: Spectrum, b: Spectrum, t: f32) -> Spectrum {
        a + (b - a) * t
    }

    pub fn sqrt(&self) -> Spectrum {
        Spectrum::new(self.r.max(0.0).sqrt(), self.g.max(0.0).sqrt(), self.b.max(0.0).sqrt())
    }

    pub fn powf(&self, e: f32) -> Spectrum {
        Spectrum::new(self.r.max(0.0).powf(e), self.g.max(0.0).powf(e), self.b.max(0.0).powf(e))
    }

    /// Clamp the magnitude of this sample to `sqrt_max_value.powi(2)`, the
    /// firefly-suppression policy `path.clamping.variance.maxvalue` selects.
    /// Direction is preserved; only magnitude is clipped.
    pub fn variance_clamped(&self, sqrt_max_value: f32) -> Spectrum {
        if sqrt_max_value <= 0.0 {
            return *self;
        }
        let max_value = sqrt_max_value * sqrt_max_value;
        let lum = self.luminance();
        if lum <= max_value || lum <= 0.0 {
            *self
        } else {
            *self * (max_value / lum)
        }
    }
}

impl Default for Spectrum {
    fn default() -> Self {
        Spectrum::BLACK
    }
}

impl Add for Spectrum {
    type Output = Spectrum;
    fn add(self, rhs: Spectrum) -> Spectrum {
        Spectrum::new(self.r + rhs.r, self.g + rhs.g, self.b + rhs.b)
    }
}

impl AddAssign for Spectrum {
    fn add_assign(&mut self, rhs: Spectrum) {
        *self = *self + rhs;
    }
}

impl Sub for Spectrum {
    type Output = Spectrum;
    fn sub(self, rhs: Spectrum) -> Spectrum {
        Spectrum::new(self.r - rhs.r, self.g - rhs.g, self.b - rhs.b)
    }
}

impl Mul for Spectrum {
    type Output = Spectrum;
    fn mul(self, rhs: Spectrum) -> Spectrum {
        Spectrum::new(self.r * rhs.r, self.g * rhs.g, self.b * rhs.b)
    }
}

impl Mul<f32> for Spectrum {
    type Output = Spectrum;
    fn mul(self, rhs: f32) -> Spectrum {
        Spectrum::new(self.r * rhs, self.g * rhs, self.b * rhs)
    }
}

impl MulAssign<f32> for Spectrum {
    fn mul_assign(&mut self, rhs: f32) {
        *self = *self * rhs;
    }
}

impl Div<f32> for Spectrum {
    type Output = Spectrum;
    fn div(self, rhs: f32) -> Spectrum {
        Spectrum::new(self.r / rhs, self.g / rhs, self.b / rhs)
    }
}
