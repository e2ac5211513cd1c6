use crate::types::{CandidateProduct, LoaderError, LoaderResult};
use geo::{Area, BooleanOps, Intersects, MultiPolygon, Polygon};
use std::cmp::Ordering;

/// Ordered subset of candidates chosen to cover a requested polygon
#[derive(Debug, Clone)]
pub struct CoverageSelection {
    /// Products in selection order; mosaicking consumes them in this order
    pub products: Vec<CandidateProduct>,
    /// Area left uncovered; zero on success
    pub residual_area: f64,
}

impl CoverageSelection {
    pub fn uuids(&self) -> Vec<&str> {
        self.products.iter().map(|p| p.uuid.as_str()).collect()
    }
}

/// Candidate ordering: most recently ingested first, ties broken by
/// *higher* reported cloud cover.
///
/// The cloud-cover direction mirrors the upstream catalog client
/// bit-for-bit and is almost certainly an upstream defect; keep the literal
/// direction rather than "fixing" it, so selections stay reproducible
/// against the reference behavior.
fn prefer_recent_then_cloudier(a: &CandidateProduct, b: &CandidateProduct) -> Ordering {
    b.ingestion_date.cmp(&a.ingestion_date).then_with(|| {
        b.cloud_cover_pct
            .partial_cmp(&a.cloud_cover_pct)
            .unwrap_or(Ordering::Equal)
    })
}

/// Greedily select the minimal ordered subset of candidates whose
/// footprints jointly cover `polygon`.
///
/// Scans candidates in [`prefer_recent_then_cloudier`] order, removing each
/// intersecting footprint from the still-missing region until nothing is
/// missing. Candidates past that point are not selected. Fails with
/// [`LoaderError::IncompleteCoverage`] when the candidates cannot cover the
/// polygon. Deterministic for a fixed candidate list and polygon.
pub fn select_covering_products(
    polygon: &Polygon<f64>,
    candidates: &[CandidateProduct],
) -> LoaderResult<CoverageSelection> {
    let mut sorted: Vec<&CandidateProduct> = candidates.iter().collect();
    sorted.sort_by(|a, b| prefer_recent_then_cloudier(a, b));

    let mut missing = MultiPolygon::from(polygon.clone());
    let mut selected: Vec<CandidateProduct> = Vec::new();

    for candidate in sorted {
        if missing.unsigned_area() <= 0.0 {
            break;
        }
        if missing.intersects(&candidate.footprint) {
            let footprint = MultiPolygon::from(candidate.footprint.clone());
            // remove the intersecting area from the missing region
            missing = missing.xor(&footprint).difference(&footprint);
            selected.push(candidate.clone());
        }
    }

    let residual_area = missing.unsigned_area();
    if residual_area > 0.0 {
        log::warn!(
            "Coverage incomplete: residual area {} after {} candidate(s)",
            residual_area,
            candidates.len()
        );
        return Err(LoaderError::IncompleteCoverage {
            residual_area,
            candidates: candidates.len(),
        });
    }

    log::debug!(
        "Selected {} of {} candidate(s) for full coverage: {:?}",
        selected.len(),
        candidates.len(),
        selected.iter().map(|p| p.uuid.as_str()).collect::<Vec<_>>()
    );
    Ok(CoverageSelection {
        products: selected,
        residual_area,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::polygon_from_vertices;
    use crate::types::ProductLevel;
    use chrono::{TimeZone, Utc};

    fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
        polygon_from_vertices(&[
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
        ])
        .unwrap()
    }

    fn candidate(uuid: &str, footprint: Polygon<f64>, day: u32, cloud: f64) -> CandidateProduct {
        CandidateProduct {
            uuid: uuid.to_string(),
            title: format!("S2A_MSIL2A_{}", uuid),
            ingestion_date: Utc.with_ymd_and_hms(2019, 1, day, 12, 0, 0).unwrap(),
            cloud_cover_pct: cloud,
            footprint,
            level: ProductLevel::L2A,
        }
    }

    #[test]
    fn test_single_footprint_containing_polygon() {
        let polygon = rect(10.2, 50.2, 10.8, 50.8);
        let candidates = vec![candidate("a", rect(10.0, 50.0, 11.0, 51.0), 10, 5.0)];

        let selection = select_covering_products(&polygon, &candidates).unwrap();
        assert_eq!(selection.uuids(), vec!["a"]);
        assert_eq!(selection.residual_area, 0.0);
    }

    #[test]
    fn test_disjoint_candidates_jointly_covering() {
        // Two side-by-side footprints, each covering half of the polygon;
        // a third, older candidate past full coverage must not be selected.
        let polygon = rect(10.0, 50.0, 12.0, 51.0);
        let candidates = vec![
            candidate("west", rect(9.5, 49.5, 11.0, 51.5), 12, 10.0),
            candidate("east", rect(11.0, 49.5, 12.5, 51.5), 11, 10.0),
            candidate("late", rect(9.5, 49.5, 12.5, 51.5), 1, 0.0),
        ];

        let selection = select_covering_products(&polygon, &candidates).unwrap();
        assert_eq!(selection.uuids(), vec!["west", "east"]);
    }

    #[test]
    fn test_no_intersection_reports_full_residual() {
        let polygon = rect(10.0, 50.0, 11.0, 51.0);
        let candidates = vec![candidate("far", rect(20.0, 20.0, 21.0, 21.0), 10, 5.0)];

        match select_covering_products(&polygon, &candidates) {
            Err(LoaderError::IncompleteCoverage {
                residual_area,
                candidates: n,
            }) => {
                assert!((residual_area - 1.0).abs() < 1e-9);
                assert_eq!(n, 1);
            }
            other => panic!("expected IncompleteCoverage, got {:?}", other.map(|s| s.uuids().join(","))),
        }
    }

    #[test]
    fn test_tie_break_prefers_higher_cloud_cover() {
        // Equal ingestion dates: the literal sort direction picks the
        // cloudier candidate first.
        let polygon = rect(10.0, 50.0, 11.0, 51.0);
        let full = rect(9.5, 49.5, 11.5, 51.5);
        let candidates = vec![
            candidate("clear", full.clone(), 10, 2.0),
            candidate("cloudy", full, 10, 60.0),
        ];

        let selection = select_covering_products(&polygon, &candidates).unwrap();
        assert_eq!(selection.uuids(), vec!["cloudy"]);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let polygon = rect(10.0, 50.0, 12.0, 51.0);
        let candidates = vec![
            candidate("west", rect(9.5, 49.5, 11.0, 51.5), 12, 10.0),
            candidate("east", rect(11.0, 49.5, 12.5, 51.5), 11, 10.0),
        ];

        let first = select_covering_products(&polygon, &candidates).unwrap();
        let second = select_covering_products(&polygon, &candidates).unwrap();
        assert_eq!(first.uuids(), second.uuids());
    }

    #[test]
    fn test_most_recent_candidate_wins() {
        let polygon = rect(10.0, 50.0, 11.0, 51.0);
        let full = rect(9.5, 49.5, 11.5, 51.5);
        let candidates = vec![
            candidate("older", full.clone(), 3, 50.0),
            candidate("newer", full, 14, 50.0),
        ];

        let selection = select_covering_products(&polygon, &candidates).unwrap();
        assert_eq!(selection.uuids(), vec!["newer"]);
    }
}
