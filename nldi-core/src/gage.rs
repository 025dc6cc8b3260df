//! Gage resolution inside the AOI and downstream of its outlets.

use crate::aoi::AreaOfInterest;
use crate::collection::dedup_features;
use crate::error::{QueryError, Result};
use crate::services::HydroServices;
use geo::{Contains, Coord, Point};
use geojson::{Feature, FeatureCollection, Value};
use log::{debug, info};
use nldi_utils::{dedup, ids::code_from_identifier};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Merged, deduplicated gage features for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GageSet {
    pub features: Vec<Feature>,
}

impl GageSet {
    /// Station codes in feature order, each once; gages without a code are
    /// skipped.
    pub fn codes(&self) -> Vec<String> {
        dedup::first_seen(self.features.iter().filter_map(station_code))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn to_feature_collection(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.features.clone(),
            foreign_members: None,
        }
    }
}

/// The station code of a gage: `Code` from gage stats, otherwise the tail of
/// the NLDI `identifier`.
pub fn station_code(feature: &Feature) -> Option<String> {
    let text = |value: &JsonValue| match value {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    };
    feature.property("Code").and_then(text).or_else(|| {
        feature
            .property("identifier")
            .and_then(text)
            .map(|id| code_from_identifier(&id).to_string())
    })
}

fn point_of(feature: &Feature) -> Option<Point<f64>> {
    match &feature.geometry.as_ref()?.value {
        Value::Point(position) => match position.as_slice() {
            [x, y, ..] => Some(Point::new(*x, *y)),
            _ => None,
        },
        _ => None,
    }
}

/// True when the gage point lies strictly inside some AOI member polygon;
/// points on a boundary are outside.
pub fn within_aoi(aoi: &AreaOfInterest, feature: &Feature) -> bool {
    match point_of(feature) {
        Some(point) => aoi.polygons().any(|polygon| polygon.contains(&point)),
        None => false,
    }
}

/// Gages inside the AOI plus gages up to `distance_km` downstream of each
/// head node.
pub async fn resolve_gages<S: HydroServices>(
    services: &S,
    aoi: &AreaOfInterest,
    head_nodes: &[Coord<f64>],
    distance_km: f64,
) -> Result<GageSet> {
    let bounded = services.gages_in_bounds(&aoi.bounding_box()).await?;
    let candidate_count = bounded.features.len();
    let mut gages: Vec<Feature> = bounded
        .features
        .into_iter()
        .filter(|feature| within_aoi(aoi, feature))
        .collect();
    info!(
        "{} of {} bounded gages lie inside the area of interest",
        gages.len(),
        candidate_count
    );

    for head_node in head_nodes {
        let traced = services.downstream_gages(*head_node, distance_km).await?;
        debug!(
            "{} features downstream of ({}, {})",
            traced.features.len(),
            head_node.x,
            head_node.y
        );
        // the first feature is the start point of the trace
        gages.extend(traced.features.into_iter().skip(1));
    }

    let features = dedup_features(gages);
    info!("{} gages in the area of interest and {distance_km} km downstream", features.len());
    Ok(GageSet { features })
}

/// Mark each gage `active` according to one batched status lookup.
///
/// Gages without a station code are inactive; when none has a code the
/// lookup is skipped.
///
/// On failure the gages are left untouched and `DegradedAnnotation` is
/// returned for the caller to log.
pub async fn annotate_active<S: HydroServices>(services: &S, gages: &mut GageSet) -> Result<()> {
    if gages.is_empty() {
        return Ok(());
    }
    let codes = gages.codes();
    let active: HashSet<String> = if codes.is_empty() {
        debug!("no station codes among {} gages, skipping status lookup", gages.len());
        HashSet::new()
    } else {
        services
            .active_station_codes(&codes)
            .await
            .map_err(|e| QueryError::DegradedAnnotation(e.to_string()))?
            .into_iter()
            .collect()
    };
    let mut active_count = 0;
    for feature in &mut gages.features {
        let is_active = station_code(feature).is_some_and(|code| active.contains(&code));
        active_count += usize::from(is_active);
        feature.set_property("active", is_active);
    }
    info!("{active_count} of {} gages are active", gages.len());
    Ok(())
}
