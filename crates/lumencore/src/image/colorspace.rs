//! Color-space conversion for image maps: no-op, inverse-gamma, or a
//! delegated OpenColorIO-style transform. Conversion always promotes to
//! float RGB(A) internally and demotes back to the map's original storage
//! type afterwards, so repeated conversions never compound precision loss
//! beyond the storage type's own.

use super::{ImageMap, StorageKind};
use std::sync::Arc;

/// Hook for an external OCIO-compatible transform. Binding to a real OCIO
/// config is out of scope for this crate (it is a file-format/config
/// collaborator, not renderer core) — callers that need `Ocio` install one
/// of these.
pub trait ColorTransform: Send + Sync {
    fn apply(&self, rgb: [f32; 3]) -> [f32; 3];
}

#[derive(Clone)]
pub enum ColorSpace {
    Nop,
    Luxcore { gamma: f32 },
    Ocio { config_name: String, color_space_name: String, transform: Arc<dyn ColorTransform> },
}

impl std::fmt::Debug for ColorSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorSpace::Nop => write!(f, "ColorSpace::Nop"),
            ColorSpace::Luxcore { gamma } => write!(f, "ColorSpace::Luxcore {{ gamma: {gamma} }}"),
            ColorSpace::Ocio { config_name, color_space_name, .. } => {
                write!(f, "ColorSpace::Ocio {{ config_name: {config_name:?}, color_space_name: {color_space_name:?} }}")
            }
        }
    }
}

impl ColorSpace {
    /// Apply this transform to every pixel of `map`, in place. The storage
    /// type is preserved: values are promoted to float, transformed, then
    /// demoted back.
    pub fn apply(&self, map: &mut ImageMap) {
        if matches!(self, ColorSpace::Nop) {
            return;
        }
        let kind = match &map.storage {
            super::PixelStorage::Byte(_) => StorageKind::Byte,
            super::PixelStorage::Half(_) => StorageKind::Half,
            super::PixelStorage::Float(_) => StorageKind::Float,
        };
        map.convert_storage(StorageKind::Float);
        if let super::PixelStorage::Float(buf) = &mut map.storage {
            let channels = map.channels as usize;
            for pixel in buf.chunks_mut(channels) {
                let rgb = [pixel[0], if channels > 1 { pixel[1] } else { pixel[0] }, if channels > 2 { pixel[2] } else { pixel[0] }];
                let out = match self {
                    ColorSpace::Nop => rgb,
                    ColorSpace::Luxcore { gamma } => [rgb[0].max(0.0).powf(*gamma), rgb[1].max(0.0).powf(*gamma), rgb[2].max(0.0).powf(*gamma)],
                    ColorSpace::Ocio { transform, .. } => transform.apply(rgb),
                };
                pixel[0] = out[0];
                if channels > 1 {
                    pixel[1] = out[1];
                }
                if channels > 2 {
                    pixel[2] = out[2];
                }
            }
        }
        map.convert_storage(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PixelStorage;

    #[test]
    fn luxcore_gamma_matches_power_law() {
        let mut m = ImageMap::new(2, 2, 1, PixelStorage::Float(vec![0.0, 0.5, 0.5, 1.0])).unwrap();
        m.wrap = super::super::WrapMode::Repeat;
        ColorSpace::Luxcore { gamma: 2.2 }.apply(&mut m);
        let v = m.texel_spectrum(1, 0).r;
        assert!((v - 0.5f32.powf(2.2)).abs() < 1e-5, "{v}");
    }
}
