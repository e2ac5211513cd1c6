use crate::types::{ProductLevel, Resolution};

/// Map a requested band/resolution pair to the native tier that must
/// actually be downloaded.
///
/// Several bands are only distributed at 20m or 60m and are resampled after
/// download; B08 only exists natively at 10m and is always fetched there and
/// downsampled. Level-1C products ship a single 10m tier regardless of band.
/// Pure lookup, no error cases: anything outside the table passes through
/// unchanged.
pub fn derive_download_resolution(
    requested: Resolution,
    band: &str,
    level: ProductLevel,
) -> Resolution {
    if level == ProductLevel::L1C {
        return Resolution::R10m;
    }
    match requested {
        Resolution::R10m => match band {
            "B01" | "B09" => Resolution::R60m,
            "B05" | "B06" | "B07" | "B11" | "B12" | "B8A" | "SCL" => Resolution::R20m,
            _ => requested,
        },
        Resolution::R20m => match band {
            "B08" => Resolution::R10m,
            "B01" | "B09" => Resolution::R60m,
            _ => requested,
        },
        Resolution::R60m => match band {
            "B08" => Resolution::R10m,
            _ => requested,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProductLevel::{L1C, L2A};
    use crate::types::Resolution::{R10m, R20m, R60m};

    #[test]
    fn test_coastal_band_always_fetched_at_60m() {
        assert_eq!(derive_download_resolution(R10m, "B01", L2A), R60m);
        assert_eq!(derive_download_resolution(R20m, "B01", L2A), R60m);
        assert_eq!(derive_download_resolution(R60m, "B01", L2A), R60m);
        assert_eq!(derive_download_resolution(R10m, "B09", L2A), R60m);
    }

    #[test]
    fn test_nir_band_always_fetched_at_10m() {
        assert_eq!(derive_download_resolution(R60m, "B08", L2A), R10m);
        assert_eq!(derive_download_resolution(R20m, "B08", L2A), R10m);
        assert_eq!(derive_download_resolution(R10m, "B08", L2A), R10m);
    }

    #[test]
    fn test_native_band_passes_through() {
        assert_eq!(derive_download_resolution(R10m, "B04", L2A), R10m);
        assert_eq!(derive_download_resolution(R20m, "B04", L2A), R20m);
        assert_eq!(derive_download_resolution(R60m, "B05", L2A), R60m);
    }

    #[test]
    fn test_20m_native_bands_at_10m_request() {
        for band in ["B05", "B06", "B07", "B11", "B12", "B8A", "SCL"] {
            assert_eq!(derive_download_resolution(R10m, band, L2A), R20m);
        }
    }

    #[test]
    fn test_level_1c_has_single_tier() {
        assert_eq!(derive_download_resolution(R60m, "B01", L1C), R10m);
        assert_eq!(derive_download_resolution(R20m, "B04", L1C), R10m);
        assert_eq!(derive_download_resolution(R10m, "TCI", L1C), R10m);
    }
}
