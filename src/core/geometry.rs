use crate::types::{LoaderError, LoaderResult};
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use geo::{Area, BoundingRect, Coord, LineString, Polygon, Rect};
use regex::Regex;

/// Build a polygon from ordered WGS84 (lon, lat) vertices.
///
/// The ring is closed implicitly. Degenerate (zero-area) input is rejected.
pub fn polygon_from_vertices(vertices: &[(f64, f64)]) -> LoaderResult<Polygon<f64>> {
    if vertices.len() < 3 {
        return Err(LoaderError::Geometry(format!(
            "polygon needs at least 3 vertices, got {}",
            vertices.len()
        )));
    }
    let ring: Vec<Coord<f64>> = vertices.iter().map(|&(x, y)| Coord { x, y }).collect();
    let polygon = Polygon::new(LineString::from(ring), vec![]);
    if polygon.unsigned_area() <= 0.0 {
        return Err(LoaderError::Geometry("polygon has zero area".to_string()));
    }
    Ok(polygon)
}

/// Axis-aligned bounding box of a polygon
pub fn bounding_box(polygon: &Polygon<f64>) -> LoaderResult<Rect<f64>> {
    polygon
        .bounding_rect()
        .ok_or_else(|| LoaderError::Geometry("polygon has no bounding box".to_string()))
}

/// The rectangular polygon spanning a polygon's bounding box. Catalog
/// searches are bbox-only; exact coverage is resolved later against the
/// candidates' footprints.
pub fn bbox_polygon(polygon: &Polygon<f64>) -> LoaderResult<Polygon<f64>> {
    Ok(bounding_box(polygon)?.to_polygon())
}

/// WKT rendering of a polygon's exterior ring, as the catalog expects it
pub fn polygon_wkt(polygon: &Polygon<f64>) -> String {
    let coords: Vec<String> = polygon
        .exterior()
        .coords()
        .map(|c| format!("{} {}", c.x, c.y))
        .collect();
    format!("POLYGON(({}))", coords.join(","))
}

/// Parse a GML footprint as returned by the catalog into a WGS84 polygon.
///
/// The catalog encodes coordinates as whitespace-separated "lat,lon" pairs;
/// they are swapped into (lon, lat) order here.
pub fn gml_to_polygon(gml: &str) -> LoaderResult<Polygon<f64>> {
    let re = Regex::new(r"<gml:coordinates>([^<]+)</gml:coordinates>")
        .map_err(|e| LoaderError::Geometry(format!("bad coordinates pattern: {}", e)))?;
    let captures = re
        .captures(gml)
        .ok_or_else(|| LoaderError::Geometry("no <gml:coordinates> in footprint".to_string()))?;

    let mut ring: Vec<Coord<f64>> = Vec::new();
    for pair in captures[1].split_whitespace() {
        let (lat, lon) = pair
            .split_once(',')
            .ok_or_else(|| LoaderError::Geometry(format!("bad coordinate pair '{}'", pair)))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|e| LoaderError::Geometry(format!("bad latitude '{}': {}", lat, e)))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .map_err(|e| LoaderError::Geometry(format!("bad longitude '{}': {}", lon, e)))?;
        ring.push(Coord { x: lon, y: lat });
    }
    if ring.len() < 3 {
        return Err(LoaderError::Geometry(format!(
            "footprint ring has only {} points",
            ring.len()
        )));
    }
    Ok(Polygon::new(LineString::from(ring), vec![]))
}

/// Reproject a single WGS84 point to Web Mercator (EPSG:3857)
pub fn wgs84_to_web_mercator(lon: f64, lat: f64) -> LoaderResult<(f64, f64)> {
    let mut source = SpatialRef::from_epsg(4326)?;
    let mut target = SpatialRef::from_epsg(3857)?;
    source.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    target.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    let transform = CoordTransform::new(&source, &target)?;

    let mut xs = [lon];
    let mut ys = [lat];
    transform.transform_coords(&mut xs, &mut ys, &mut [])?;
    Ok((xs[0], ys[0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: [(f64, f64); 4] = [(10.0, 50.0), (11.0, 50.0), (11.0, 51.0), (10.0, 51.0)];

    #[test]
    fn test_polygon_from_vertices_closes_ring() {
        let polygon = polygon_from_vertices(&SQUARE).unwrap();
        assert!((polygon.unsigned_area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        let collinear = [(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)];
        assert!(matches!(
            polygon_from_vertices(&collinear),
            Err(LoaderError::Geometry(_))
        ));
    }

    #[test]
    fn test_bbox_polygon_of_triangle() {
        let triangle = polygon_from_vertices(&[(0.0, 0.0), (4.0, 0.0), (0.0, 2.0)]).unwrap();
        let bbox = bbox_polygon(&triangle).unwrap();
        assert!((bbox.unsigned_area() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_wkt_rendering() {
        let polygon = polygon_from_vertices(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]).unwrap();
        let wkt = polygon_wkt(&polygon);
        assert!(wkt.starts_with("POLYGON((0 0,1 0,1 1"));
        assert!(wkt.ends_with("))"));
    }

    #[test]
    fn test_gml_footprint_swaps_to_lon_lat() {
        let gml = "<gml:Polygon srsName=\"http://www.opengis.net/gml/srs/epsg.xml#4326\">\
                   <gml:outerBoundaryIs><gml:LinearRing><gml:coordinates>\
                   50.0,10.0 50.0,11.0 51.0,11.0 51.0,10.0 50.0,10.0\
                   </gml:coordinates></gml:LinearRing></gml:outerBoundaryIs></gml:Polygon>";
        let footprint = gml_to_polygon(gml).unwrap();
        let first = footprint.exterior().coords().next().unwrap();
        assert_eq!(first.x, 10.0); // lon
        assert_eq!(first.y, 50.0); // lat
        assert!((footprint.unsigned_area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_gml_without_coordinates_fails() {
        assert!(gml_to_polygon("<gml:Polygon></gml:Polygon>").is_err());
    }

    #[test]
    fn test_web_mercator_origin() {
        let (x, y) = wgs84_to_web_mercator(0.0, 0.0).unwrap();
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }
}
