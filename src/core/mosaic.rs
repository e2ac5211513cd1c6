use crate::core::gdal_ops;
use crate::core::geometry::{bounding_box, wgs84_to_web_mercator};
use crate::io::cache::unique_tmp_path;
use crate::types::LoaderResult;
use geo::Polygon;
use std::fs;
use std::path::{Path, PathBuf};

/// Mosaic per-product tiles into a single raster clipped to the polygon's
/// bounding box, reprojected to Web Mercator.
///
/// Tiles are passed in selection order; where they overlap, earlier tiles
/// win because later ones only fill nodata. The result is a transient file
/// under `tmp_dir` owned by the caller.
pub fn composite(
    polygon: &Polygon<f64>,
    tile_paths: &[PathBuf],
    tmp_dir: &Path,
) -> LoaderResult<PathBuf> {
    let bbox = bounding_box(polygon)?;
    let (min_x, min_y) = wgs84_to_web_mercator(bbox.min().x, bbox.min().y)?;
    let (max_x, max_y) = wgs84_to_web_mercator(bbox.max().x, bbox.max().y)?;

    fs::create_dir_all(tmp_dir)?;
    let dest = unique_tmp_path(tmp_dir, "mosaic", "tiff");
    log::info!(
        "Mosaicking {} tile(s) into {}",
        tile_paths.len(),
        dest.display()
    );
    if let Err(e) = gdal_ops::warp_mosaic(tile_paths, &dest, (min_x, min_y, max_x, max_y)) {
        // the warp tool may leave a partial output behind
        let _ = fs::remove_file(&dest);
        return Err(e);
    }
    Ok(dest)
}
