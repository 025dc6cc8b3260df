//! One polygon query, from inbound request to assembled result.

use crate::aoi::AreaOfInterest;
use crate::catchment::resolve_catchments;
use crate::collection::ResultCollection;
use crate::config::QueryOptions;
use crate::error::{QueryError, Result};
use crate::flowline::FlowNetworkTracer;
use crate::gage::{annotate_active, resolve_gages};
use crate::services::HydroServices;
use geojson::GeoJson;
use log::{info, warn};
use serde::Deserialize;

/// The inbound request, as posted by the web layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// GeoJSON polygons to query.
    #[serde(alias = "aoi")]
    pub data: GeoJson,
    #[serde(default, alias = "get_flowlines")]
    pub return_flowlines: bool,
    #[serde(default, alias = "get_gages")]
    pub return_gages: bool,
    /// Kilometres to follow each outlet downstream.
    #[serde(default, alias = "downstream_dist")]
    pub downstream_distance: f64,
    #[serde(default)]
    pub annotate_active: bool,
}

impl QueryRequest {
    pub fn new(data: GeoJson) -> Self {
        QueryRequest {
            data,
            return_flowlines: false,
            return_gages: false,
            downstream_distance: 0.0,
            annotate_active: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.downstream_distance.is_finite() || self.downstream_distance < 0.0 {
            return Err(QueryError::InvalidRequest(format!(
                "downstreamDistance must be a non-negative number of kilometres, got {}",
                self.downstream_distance
            )));
        }
        Ok(())
    }
}

/// Runs the query stages in order against one set of services.
///
/// Holds no state between runs; every call to [`PolyQuery::run`] owns its
/// own accumulators.
pub struct PolyQuery<'a, S> {
    services: &'a S,
    options: QueryOptions,
}

impl<'a, S: HydroServices> PolyQuery<'a, S> {
    pub fn new(services: &'a S, options: QueryOptions) -> Self {
        PolyQuery { services, options }
    }

    pub async fn run(&self, request: &QueryRequest) -> Result<ResultCollection> {
        request.validate()?;
        let aoi = AreaOfInterest::from_geojson(&request.data)?;
        info!(
            "polygon query: {} polygons, {} vertices, flowlines={}, gages={}, downstream={} km",
            aoi.geometry().0.len(),
            aoi.vertex_count(),
            request.return_flowlines,
            request.return_gages,
            request.downstream_distance
        );

        let catchments = resolve_catchments(self.services, &aoi, self.options.query_shape).await?;
        let mut result = ResultCollection::builder().catchments(&catchments);

        // gages need the outlet head nodes even when flowlines are not returned
        if !(request.return_flowlines || request.return_gages) {
            return Ok(result.build());
        }
        let expansion_km = if request.return_flowlines {
            request.downstream_distance
        } else {
            0.0
        };
        let trace = FlowNetworkTracer::new(self.services, self.options.chunk_size)
            .trace(&catchments.ids(), expansion_km)
            .await?;
        if request.return_flowlines {
            result = result.flowlines(&trace);
        }

        if request.return_gages {
            let mut gages = resolve_gages(
                self.services,
                &aoi,
                &trace.head_nodes,
                request.downstream_distance,
            )
            .await?;
            if request.annotate_active {
                if let Err(e) = annotate_active(self.services, &mut gages).await {
                    warn!("{e}; returning gages without active status");
                }
            }
            result = result.gages(&gages);
        }

        Ok(result.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_field_names() {
        let request: QueryRequest = serde_json::from_str(
            r#"{
                "data": {"type": "Polygon", "coordinates": [[[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.0, 0.0]]]},
                "returnFlowlines": true,
                "returnGages": false,
                "downstreamDistance": 12.5
            }"#,
        )
        .unwrap();
        assert!(request.return_flowlines);
        assert!(!request.return_gages);
        assert!(!request.annotate_active);
        assert_eq!(request.downstream_distance, 12.5);
    }

    #[test]
    fn test_request_accepts_legacy_names() {
        let request: QueryRequest = serde_json::from_str(
            r#"{
                "aoi": {"type": "Polygon", "coordinates": [[[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.0, 0.0]]]},
                "get_flowlines": true,
                "downstream_dist": 3
            }"#,
        )
        .unwrap();
        assert!(request.return_flowlines);
        assert_eq!(request.downstream_distance, 3.0);
    }

    #[test]
    fn test_negative_distance_is_rejected() {
        let mut request = QueryRequest::new(
            r#"{"type": "Polygon", "coordinates": [[[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.0, 0.0]]]}"#
                .parse()
                .unwrap(),
        );
        request.downstream_distance = -1.0;
        let err = request.validate().unwrap_err();
        assert!(err.is_client_error());
    }
}
