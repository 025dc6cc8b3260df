//! Catchment resolution: which local drainage units the AOI overlaps.
//!
//! The overlay service is only asked for a coarse candidate set (polygons
//! intersecting a query ring). The exact overlap test against the AOI always
//! runs locally.

use crate::aoi::{AreaOfInterest, BoundingBox};
use crate::error::{QueryError, Result, Stage};
use crate::services::HydroServices;
use geo::{Area, BooleanOps, LineString, MultiPolygon, Polygon, Simplify, Validation};
use geojson::{Feature, FeatureCollection};
use log::{debug, info};
use nldi_utils::{dedup, ids::json_to_i64};

/// Rings with more vertices than this overflow the overlay service's
/// request parameter length.
pub const MAX_QUERY_VERTICES: usize = 237;

/// Vertex count a simplified query ring must reach.
pub const TARGET_QUERY_VERTICES: usize = 235;

/// Simplification tolerance (degrees) added on every pass.
pub const SIMPLIFY_TOLERANCE_STEP: f64 = 1e-6;

/// Hard cap on simplification passes; 0.05 degrees of tolerance at most.
pub const MAX_SIMPLIFY_PASSES: usize = 50_000;

/// Which polygon(s) are sent to the overlay service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryShape {
    /// One rectangle covering the whole AOI.
    #[default]
    BoundingBox,
    /// One request per AOI ring, each within the vertex budget.
    Rings,
}

/// A catchment unit and the feature it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Catchment {
    pub id: i64,
    pub geometry: MultiPolygon<f64>,
    pub feature: Feature,
}

impl TryFrom<Feature> for Catchment {
    type Error = QueryError;

    fn try_from(feature: Feature) -> Result<Self> {
        let id = feature
            .property("featureid")
            .and_then(json_to_i64)
            .ok_or_else(|| {
                QueryError::upstream(Stage::Catchments, "catchment feature without a featureid")
            })?;
        let geometry = match &feature.geometry {
            Some(geometry) => geo::Geometry::<f64>::try_from(geometry.value.clone())
                .map_err(|e| QueryError::upstream(Stage::Catchments, e))?,
            None => {
                return Err(QueryError::upstream(
                    Stage::Catchments,
                    format!("catchment {id} has no geometry"),
                ))
            }
        };
        let geometry = match geometry {
            geo::Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
            geo::Geometry::MultiPolygon(multi) => multi,
            _ => {
                return Err(QueryError::upstream(
                    Stage::Catchments,
                    format!("catchment {id} is not polygonal"),
                ))
            }
        };
        Ok(Catchment {
            id,
            geometry,
            feature,
        })
    }
}

/// Catchments kept for one query, in discovery order, one per id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatchmentSet {
    pub catchments: Vec<Catchment>,
}

impl CatchmentSet {
    pub fn ids(&self) -> Vec<i64> {
        self.catchments.iter().map(|c| c.id).collect()
    }

    pub fn len(&self) -> usize {
        self.catchments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catchments.is_empty()
    }

    pub fn to_feature_collection(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.catchments.iter().map(|c| c.feature.clone()).collect(),
            foreign_members: None,
        }
    }
}

/// Bring a query ring within the overlay service's vertex budget.
///
/// Rings already at or under [`MAX_QUERY_VERTICES`] are returned as-is.
/// Larger rings are simplified from the input ring with a tolerance that grows
/// by [`SIMPLIFY_TOLERANCE_STEP`] per pass until at most
/// [`TARGET_QUERY_VERTICES`] remain and the ring is still a simple polygon.
/// A self-intersecting candidate moves on to the next tolerance; a pass
/// whose result has collapsed ends the search.
pub fn fit_vertex_budget(ring: &LineString<f64>) -> Result<LineString<f64>> {
    if ring.0.len() <= MAX_QUERY_VERTICES {
        return Ok(ring.clone());
    }
    let mut tolerance = SIMPLIFY_TOLERANCE_STEP;
    let mut rejected = 0usize;
    for pass in 1..=MAX_SIMPLIFY_PASSES {
        let candidate = ring.simplify(&tolerance);
        if !is_closed_ring(&candidate) {
            return Err(QueryError::malformed(format!(
                "ring collapsed at tolerance {tolerance:e} before reaching {TARGET_QUERY_VERTICES} vertices"
            )));
        }
        if candidate.0.len() <= TARGET_QUERY_VERTICES {
            if Polygon::new(candidate.clone(), vec![]).is_valid() {
                debug!(
                    "simplified query ring from {} to {} vertices in {pass} passes (tolerance {tolerance:e})",
                    ring.0.len(),
                    candidate.0.len()
                );
                return Ok(candidate);
            }
            rejected += 1;
        }
        tolerance += SIMPLIFY_TOLERANCE_STEP;
    }
    Err(QueryError::malformed(format!(
        "ring of {} vertices could not be simplified to {TARGET_QUERY_VERTICES} within {MAX_SIMPLIFY_PASSES} passes \
         ({rejected} self-intersecting candidates rejected)",
        ring.0.len()
    )))
}

fn is_closed_ring(ring: &LineString<f64>) -> bool {
    ring.0.len() >= 4
        && ring.0.first() == ring.0.last()
        && Polygon::new(ring.clone(), vec![]).unsigned_area() > 0.0
}

/// The rings sent to the overlay service for `shape`.
pub fn query_rings(aoi: &AreaOfInterest, shape: QueryShape) -> Result<Vec<LineString<f64>>> {
    match shape {
        QueryShape::BoundingBox => Ok(vec![fit_vertex_budget(&aoi.bounding_box().to_ring())?]),
        QueryShape::Rings => aoi.rings().iter().map(fit_vertex_budget).collect(),
    }
}

/// WKT for a single-ring polygon, as used in the `INTERSECTS` filter.
pub fn ring_wkt(ring: &LineString<f64>) -> String {
    let coords = ring
        .coords()
        .map(|c| format!("{} {}", c.x, c.y))
        .collect::<Vec<_>>()
        .join(", ");
    format!("POLYGON (({coords}))")
}

/// True when the candidate shares interior area with some AOI member.
///
/// Members are tested one at a time: flattened rings may overlap each other
/// and would not form a valid multipolygon together.
pub fn overlaps_aoi(aoi: &AreaOfInterest, candidate: &MultiPolygon<f64>) -> bool {
    let Some(candidate_box) = BoundingBox::of(candidate) else {
        return false;
    };
    if !aoi.bounding_box().intersects(&candidate_box) {
        return false;
    }
    aoi.polygons().any(|polygon| {
        MultiPolygon::new(vec![polygon.clone()])
            .intersection(candidate)
            .unsigned_area()
            > 0.0
    })
}

/// Resolve the catchments overlapping `aoi`.
pub async fn resolve_catchments<S: HydroServices>(
    services: &S,
    aoi: &AreaOfInterest,
    shape: QueryShape,
) -> Result<CatchmentSet> {
    let mut candidates: Vec<Feature> = Vec::new();
    for ring in query_rings(aoi, shape)? {
        let wkt = ring_wkt(&ring);
        debug!("requesting catchments intersecting {} vertices", ring.0.len());
        let collection = services.catchments_intersecting(&wkt).await?;
        candidates.extend(collection.features);
    }
    let candidate_count = candidates.len();

    let mut kept = Vec::new();
    for feature in candidates {
        let catchment = Catchment::try_from(feature)?;
        if overlaps_aoi(aoi, &catchment.geometry) {
            kept.push(catchment);
        }
    }
    let catchments = dedup::first_seen_by_key(kept, |c| c.id);
    info!(
        "{} of {} candidate catchments overlap the area of interest",
        catchments.len(),
        candidate_count
    );
    Ok(CatchmentSet { catchments })
}
