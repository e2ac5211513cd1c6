use ndarray::Array2;

/// Pixel-wise normalized difference `(a - b) / (a + b)`.
///
/// Division is intentionally unguarded: where both inputs are zero the
/// result is NaN, which downstream consumers treat as nodata.
pub fn normalized_difference(a: &Array2<f32>, b: &Array2<f32>) -> Array2<f32> {
    (a - b) / (a + b)
}

/// Enhanced Vegetation Index from NIR (B08), red (B04) and blue (B02)
pub fn evi(b08: &Array2<f32>, b04: &Array2<f32>, b02: &Array2<f32>) -> Array2<f32> {
    (b08 - b04) * 2.5 / (b08 + &(b04 * 6.0) - &(b02 * 7.5) + 1.0)
}

/// Scene-classification codes that count as usable ground.
///
/// 4 vegetation, 5 bare soil, 6 water, 11 snow; 10 (thin cirrus) is
/// usable only when the caller opts in.
pub fn visible_land_fraction(scl: &Array2<f32>, keep_cirrus: bool) -> f64 {
    let total = scl.len();
    if total == 0 {
        return 0.0;
    }
    let visible = scl
        .iter()
        .filter(|&&code| {
            matches!(code as u8, 4 | 5 | 6 | 11) || (keep_cirrus && code as u8 == 10)
        })
        .count();
    visible as f64 / total as f64
}
