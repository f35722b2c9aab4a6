//! Resize policies applied to loaded image maps. The default keeps the map
//! exactly as loaded; `images.minmem`/`images.maxmem` select a budget-aware
//! policy that downsamples maps over budget and leaves rarely-used maps
//! alone (no upsampling is ever performed).

use super::ImageMap;

pub trait ResizePolicy: Send + Sync {
    /// Possibly mutate `map` in place to respect this policy. `use_count`
    /// is how many texture nodes reference the map, used by
    /// below-minimum-use policies.
    fn maybe_resize(&self, map: &mut ImageMap, use_count: u32);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoResize;

impl ResizePolicy for NoResize {
    fn maybe_resize(&self, _map: &mut ImageMap, _use_count: u32) {}
}

fn storage_bytes(map: &ImageMap) -> u64 {
    let texel_bytes: u64 = match &map.storage {
        super::PixelStorage::Byte(_) => 1,
        super::PixelStorage::Half(_) => 2,
        super::PixelStorage::Float(_) => 4,
    };
    map.width as u64 * map.height as u64 * map.channels as u64 * texel_bytes
}

fn downsample_half(map: &ImageMap) -> ImageMap {
    let new_w = (map.width / 2).max(1);
    let new_h = (map.height / 2).max(1);
    let channels = map.channels;
    let mut out = vec![0.0f32; (new_w * new_h * channels as u32) as usize];
    for y in 0..new_h {
        for x in 0..new_w {
            for c in 0..channels {
                let s00 = map.texel_component((x * 2) as i64, (y * 2) as i64, c);
                let s10 = map.texel_component((x * 2 + 1) as i64, (y * 2) as i64, c);
                let s01 = map.texel_component((x * 2) as i64, (y * 2 + 1) as i64, c);
                let s11 = map.texel_component((x * 2 + 1) as i64, (y * 2 + 1) as i64, c);
                let idx = (y * new_w + x) as usize * channels as usize + c as usize;
                out[idx] = (s00 + s10 + s01 + s11) * 0.25;
            }
        }
    }
    let mut m = ImageMap::new(new_w, new_h, channels, super::PixelStorage::Float(out)).expect("downsample preserves channel count");
    m.wrap = map.wrap;
    m.filter = map.filter;
    m
}

/// Rescales maps whose storage exceeds `max_mem_bytes` by repeated 2x
/// downsampling, and flags (via `log::debug!`) maps referenced fewer than
/// `min_use_count` times as candidates a higher-level cache could evict —
/// this policy only performs the memory-budget half of that contract; use
/// eviction is left to the scene's image-map cache.
pub struct BudgetResize {
    pub max_mem_bytes: u64,
    pub min_use_count: u32,
}

impl ResizePolicy for BudgetResize {
    fn maybe_resize(&self, map: &mut ImageMap, use_count: u32) {
        if use_count < self.min_use_count {
            log::debug!("image map used only {use_count} times (below {}), eligible for eviction", self.min_use_count);
        }
        let mut guard = 0;
        while storage_bytes(map) > self.max_mem_bytes && map.width > 1 && map.height > 1 && guard < 16 {
            *map = downsample_half(map);
            guard += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PixelStorage;

    #[test]
    fn budget_resize_shrinks_until_under_budget() {
        let mut m = ImageMap::new(8, 8, 1, PixelStorage::Float(vec![1.0; 64])).unwrap();
        let policy = BudgetResize { max_mem_bytes: 32, min_use_count: 1 };
        policy.maybe_resize(&mut m, 5);
        assert!((m.width * m.height * m.channels as u32 * 4) as u64 <= 32);
    }

    #[test]
    fn no_resize_leaves_map_untouched() {
        let mut m = ImageMap::new(4, 4, 1, PixelStorage::Float(vec![0.0; 16])).unwrap();
        NoResize.maybe_resize(&mut m, 0);
        assert_eq!((m.width, m.height), (4, 4));
    }
}
