//! Wrap-mode periodicity and LuxCore-style gamma conversion on a tiny 2x2
//! image map, independent of the texture graph that normally wraps one.

use lumencore::image::colorspace::ColorSpace;
use lumencore::image::{FilterMode, ImageMap, PixelStorage, WrapMode};
use lumencore::math::Vec2;

fn two_by_two_gradient() -> ImageMap {
    // Row-major: (0,0)=0.0 (1,0)=0.5 (0,1)=0.5 (1,1)=1.0
    ImageMap::new(2, 2, 1, PixelStorage::Float(vec![0.0, 0.5, 0.5, 1.0])).unwrap()
}

#[test]
fn repeat_wrap_is_periodic_in_the_image_width() {
    let map = two_by_two_gradient();
    assert_eq!(map.wrap, WrapMode::Repeat);
    for k in -3..4 {
        let wrapped = map.texel_component(1 + k * 2, 0, 0);
        assert!((wrapped - 0.5).abs() < 1e-6, "texel(1 + {k}*2, 0) should repeat texel(1, 0)");
    }
}

#[test]
fn luxcore_gamma_and_repeat_wrap_match_the_analytic_value() {
    let mut map = two_by_two_gradient();
    map.filter = FilterMode::Nearest;
    ColorSpace::Luxcore { gamma: 2.2 }.apply(&mut map);

    let expected = 0.5f32.powf(2.2);
    let at_origin = map.get_spectrum(Vec2::new(0.5, 0.5));
    let wrapped = map.get_spectrum(Vec2::new(1.5, 1.5));

    assert!((at_origin.r - expected).abs() < 1e-6, "got {}, want {expected}", at_origin.r);
    assert!((wrapped.r - at_origin.r).abs() < 1e-6, "wrapped sample should equal the unwrapped one under repeat");
}
