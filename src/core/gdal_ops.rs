use crate::types::{LoaderError, LoaderResult};
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;
use std::process::Command;

/// Run one external GDAL tool and surface its stderr on failure
fn run_tool(tool: &str, args: &[String]) -> LoaderResult<()> {
    log::debug!("Running {} {}", tool, args.join(" "));
    let output = Command::new(tool)
        .args(args)
        .output()
        .map_err(|e| LoaderError::ExternalTool {
            tool: tool.to_string(),
            detail: format!("failed to spawn: {}", e),
        })?;
    if !output.status.success() {
        return Err(LoaderError::ExternalTool {
            tool: tool.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Convert a raster (typically a downloaded JPEG2000 granule) to GeoTIFF
pub fn translate(src: &Path, dest: &Path) -> LoaderResult<()> {
    run_tool(
        "gdal_translate",
        &[
            "-of".to_string(),
            "GTiff".to_string(),
            src.display().to_string(),
            dest.display().to_string(),
        ],
    )
}

/// Convert collar pixels that are nearly black to nodata. Only the
/// true-color composite needs this; spectral bands keep their raw values.
pub fn nearblack(src: &Path, dest: &Path) -> LoaderResult<()> {
    run_tool(
        "nearblack",
        &[
            "-o".to_string(),
            dest.display().to_string(),
            src.display().to_string(),
        ],
    )
}

/// Resample a raster to a square pixel size in meters
pub fn resample(src: &Path, dest: &Path, meters: u32) -> LoaderResult<()> {
    run_tool(
        "gdalwarp",
        &[
            "-tr".to_string(),
            meters.to_string(),
            meters.to_string(),
            src.display().to_string(),
            dest.display().to_string(),
        ],
    )
}

/// Warp and mosaic tiles into one Web Mercator raster clipped to `bounds`.
///
/// `bounds` is (min_x, min_y, max_x, max_y) in EPSG:3857. Inputs are
/// consumed in order; later tiles only fill pixels the earlier ones left
/// as nodata (source value 0).
pub fn warp_mosaic(
    inputs: &[impl AsRef<Path>],
    dest: &Path,
    bounds: (f64, f64, f64, f64),
) -> LoaderResult<()> {
    let mut args = vec![
        "-multi".to_string(),
        "-srcnodata".to_string(),
        "0".to_string(),
        "-t_srs".to_string(),
        "EPSG:3857".to_string(),
        "-te".to_string(),
        bounds.0.to_string(),
        bounds.1.to_string(),
        bounds.2.to_string(),
        bounds.3.to_string(),
    ];
    for input in inputs {
        args.push(input.as_ref().display().to_string());
    }
    args.push(dest.display().to_string());
    run_tool("gdalwarp", &args)
}

/// Read band 1 of a raster as `f32`, with its geotransform and projection
pub fn read_band_f32(path: &Path) -> LoaderResult<(Array2<f32>, [f64; 6], String)> {
    let dataset = Dataset::open(path)?;
    let (width, height) = dataset.raster_size();
    let geo_transform = dataset.geo_transform()?;
    let projection = dataset.projection();

    let rasterband = dataset.rasterband(1)?;
    let band_data = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
    let array = Array2::from_shape_vec((height, width), band_data.into_shape_and_vec().1)
        .map_err(|e| LoaderError::InvalidFormat(format!("raster shape: {}", e)))?;
    Ok((array, geo_transform, projection))
}

/// Write a single-band `f32` GeoTIFF carrying the given georeferencing
pub fn write_geotiff_f32(
    path: &Path,
    data: &Array2<f32>,
    geo_transform: &[f64; 6],
    projection: &str,
) -> LoaderResult<()> {
    let (height, width) = data.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset =
        driver.create_with_band_type::<f32, _>(path, width, height, 1)?;
    dataset.set_geo_transform(geo_transform)?;
    if !projection.is_empty() {
        dataset.set_projection(projection)?;
    }

    let mut rasterband = dataset.rasterband(1)?;
    let mut buffer = Buffer::new((width, height), data.iter().copied().collect());
    rasterband.write((0, 0), (width, height), &mut buffer)?;
    rasterband.set_no_data_value(Some(f32::NAN as f64))?;
    Ok(())
}
