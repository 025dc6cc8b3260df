//! Flow network tracing for a resolved catchment set.
//!
//! Flowlines are fetched in chunks of catchment ids. Only when every chunk
//! has been collected are the outlets computed, as a pure function over the
//! accumulated edges: an edge whose `tonode` is not the `fromnode` of any
//! edge in the set drains out of the queried subgraph. Outlets then seed the
//! optional downstream expansion.

use crate::collection::dedup_features;
use crate::error::{QueryError, Result, Stage};
use crate::services::HydroServices;
use geo::Coord;
use geojson::{Feature, FeatureCollection, Value};
use log::{debug, info};
use nldi_utils::{dedup, ids::json_to_i64};
use std::collections::HashSet;

/// Maximum catchment ids per flowline request.
pub const FLOWLINE_CHUNK_SIZE: usize = 100;

/// One stream segment of the local network.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEdge {
    pub comid: i64,
    pub from_node: i64,
    pub to_node: i64,
    /// First coordinate of the segment geometry.
    pub head_node: Option<Coord<f64>>,
}

impl FlowEdge {
    pub fn from_feature(feature: &Feature) -> Result<Self> {
        let field = |name: &str| {
            feature.property(name).and_then(json_to_i64).ok_or_else(|| {
                QueryError::upstream(
                    Stage::Flowlines,
                    format!("flowline feature without a numeric {name}"),
                )
            })
        };
        Ok(FlowEdge {
            comid: field("comid")?,
            from_node: field("fromnode")?,
            to_node: field("tonode")?,
            head_node: feature.geometry.as_ref().and_then(|g| first_coord(&g.value)),
        })
    }
}

fn first_coord(value: &Value) -> Option<Coord<f64>> {
    let position = match value {
        Value::LineString(line) => line.first(),
        Value::MultiLineString(lines) => lines.first().and_then(|line| line.first()),
        _ => None,
    }?;
    match position.as_slice() {
        [x, y, ..] => Some(Coord { x: *x, y: *y }),
        _ => None,
    }
}

/// Comids whose `to_node` is absent from the set of all `from_node`s.
///
/// Order follows the edges; a comid is reported once.
pub fn find_outlets(edges: &[FlowEdge]) -> Vec<i64> {
    let from_nodes: HashSet<i64> = edges.iter().map(|e| e.from_node).collect();
    dedup::first_seen(
        edges
            .iter()
            .filter(|e| !from_nodes.contains(&e.to_node))
            .map(|e| e.comid),
    )
}

/// Progress of a single chunk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    Requested,
    Parsed,
    Failed,
}

/// Progress of the tracer as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceState {
    Accumulating,
    OutletsComputed,
    DownstreamExpansion,
    Done,
}

/// Flowlines, their ids, and the outlet head nodes for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowlineTrace {
    pub features: Vec<Feature>,
    pub comids: Vec<i64>,
    pub outlets: Vec<i64>,
    pub head_nodes: Vec<Coord<f64>>,
}

impl FlowlineTrace {
    pub fn to_feature_collection(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.features.clone(),
            foreign_members: None,
        }
    }
}

/// Runs the chunked fetch, outlet analysis and downstream expansion.
pub struct FlowNetworkTracer<'a, S> {
    services: &'a S,
    chunk_size: usize,
    state: TraceState,
    chunks: Vec<ChunkState>,
}

impl<'a, S: HydroServices> FlowNetworkTracer<'a, S> {
    pub fn new(services: &'a S, chunk_size: usize) -> Self {
        FlowNetworkTracer {
            services,
            chunk_size: chunk_size.max(1),
            state: TraceState::Accumulating,
            chunks: Vec::new(),
        }
    }

    pub fn state(&self) -> TraceState {
        self.state
    }

    pub fn chunk_states(&self) -> &[ChunkState] {
        &self.chunks
    }

    fn transition(&mut self, next: TraceState) {
        debug!("flowline trace {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Trace the network draining `catchment_ids`, expanding each outlet
    /// `distance_km` downstream when the distance is positive.
    pub async fn trace(&mut self, catchment_ids: &[i64], distance_km: f64) -> Result<FlowlineTrace> {
        self.state = TraceState::Accumulating;
        self.chunks = vec![ChunkState::Pending; catchment_ids.len().div_ceil(self.chunk_size)];

        let mut features: Vec<Feature> = Vec::new();
        let mut edges: Vec<FlowEdge> = Vec::new();
        for (index, chunk) in catchment_ids.chunks(self.chunk_size).enumerate() {
            self.chunks[index] = ChunkState::Requested;
            debug!(
                "requesting flowlines for chunk {}/{} ({} ids)",
                index + 1,
                self.chunks.len(),
                chunk.len()
            );
            let parsed = self
                .services
                .flowlines_by_comid(chunk)
                .await
                .and_then(|collection| {
                    let chunk_edges = collection
                        .features
                        .iter()
                        .map(FlowEdge::from_feature)
                        .collect::<Result<Vec<_>>>()?;
                    Ok((collection.features, chunk_edges))
                });
            match parsed {
                Ok((chunk_features, chunk_edges)) => {
                    self.chunks[index] = ChunkState::Parsed;
                    features.extend(chunk_features);
                    edges.extend(chunk_edges);
                }
                Err(e) => {
                    self.chunks[index] = ChunkState::Failed;
                    return Err(e);
                }
            }
        }

        let outlets = find_outlets(&edges);
        let head_nodes = outlets
            .iter()
            .filter_map(|comid| {
                edges
                    .iter()
                    .find(|e| e.comid == *comid)
                    .and_then(|e| e.head_node)
            })
            .collect::<Vec<_>>();
        let mut comids: Vec<i64> = edges.iter().map(|e| e.comid).collect();
        self.transition(TraceState::OutletsComputed);
        info!(
            "{} local flowlines, {} outlets from {} catchments",
            edges.len(),
            outlets.len(),
            catchment_ids.len()
        );

        if distance_km > 0.0 {
            self.transition(TraceState::DownstreamExpansion);
            for outlet in &outlets {
                let downstream = self
                    .services
                    .downstream_flowlines(*outlet, distance_km)
                    .await?;
                for feature in &downstream.features {
                    let comid = feature
                        .property("nhdplus_comid")
                        .and_then(json_to_i64)
                        .ok_or_else(|| {
                            QueryError::upstream(
                                Stage::DownstreamFlowlines,
                                format!("feature downstream of {outlet} without nhdplus_comid"),
                            )
                        })?;
                    comids.push(comid);
                }
                features.extend(downstream.features);
            }
        }

        let features = dedup_features(features);
        let comids = dedup::first_seen(comids);
        self.transition(TraceState::Done);
        Ok(FlowlineTrace {
            features,
            comids,
            outlets,
            head_nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aoi::BoundingBox;
    use serde_json::json;
    use std::cell::Cell;

    /// Serves one unconnected edge per comid and fails the nth chunk request.
    struct ChunkedFlowlines {
        failing_chunk: Option<usize>,
        requests: Cell<usize>,
    }

    fn empty() -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: vec![],
            foreign_members: None,
        }
    }

    impl HydroServices for ChunkedFlowlines {
        async fn catchments_intersecting(&self, _query_wkt: &str) -> Result<FeatureCollection> {
            Ok(empty())
        }

        async fn flowlines_by_comid(&self, comids: &[i64]) -> Result<FeatureCollection> {
            let index = self.requests.get();
            self.requests.set(index + 1);
            if self.failing_chunk == Some(index) {
                return Err(QueryError::upstream(Stage::Flowlines, "503 Service Unavailable"));
            }
            let features = comids
                .iter()
                .map(|comid| {
                    Feature::from_json_value(json!({
                        "type": "Feature",
                        "properties": {"comid": comid, "fromnode": comid * 10, "tonode": comid * 10 + 1},
                        "geometry": {"type": "LineString", "coordinates": [[-105.0, 40.0], [-104.9, 40.1]]}
                    }))
                    .unwrap()
                })
                .collect();
            Ok(FeatureCollection {
                features,
                ..empty()
            })
        }

        async fn downstream_flowlines(&self, _comid: i64, _distance_km: f64) -> Result<FeatureCollection> {
            Ok(empty())
        }

        async fn gages_in_bounds(&self, _bbox: &BoundingBox) -> Result<FeatureCollection> {
            Ok(empty())
        }

        async fn downstream_gages(&self, _start: Coord<f64>, _distance_km: f64) -> Result<FeatureCollection> {
            Ok(empty())
        }

        async fn active_station_codes(&self, _codes: &[String]) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_failed_chunk_stops_the_trace() {
        let services = ChunkedFlowlines {
            failing_chunk: Some(1),
            requests: Cell::new(0),
        };
        let mut tracer = FlowNetworkTracer::new(&services, 2);
        let err = tracer.trace(&[1, 2, 3, 4, 5], 0.0).await.unwrap_err();

        assert!(matches!(
            err,
            QueryError::UpstreamUnavailable {
                stage: Stage::Flowlines,
                ..
            }
        ));
        assert_eq!(
            tracer.chunk_states(),
            &[ChunkState::Parsed, ChunkState::Failed, ChunkState::Pending]
        );
        assert_eq!(tracer.state(), TraceState::Accumulating);
        assert_eq!(services.requests.get(), 2);
    }

    #[tokio::test]
    async fn test_successful_trace_ends_done() {
        let services = ChunkedFlowlines {
            failing_chunk: None,
            requests: Cell::new(0),
        };
        let mut tracer = FlowNetworkTracer::new(&services, 2);
        let trace = tracer.trace(&[1, 2, 3, 4, 5], 0.0).await.unwrap();

        assert_eq!(tracer.state(), TraceState::Done);
        assert_eq!(tracer.chunk_states(), &[ChunkState::Parsed; 3]);
        assert_eq!(trace.comids, vec![1, 2, 3, 4, 5]);
        assert_eq!(trace.outlets, vec![1, 2, 3, 4, 5]);
        assert_eq!(trace.head_nodes.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_ids_make_no_requests() {
        let services = ChunkedFlowlines {
            failing_chunk: None,
            requests: Cell::new(0),
        };
        let mut tracer = FlowNetworkTracer::new(&services, 100);
        let trace = tracer.trace(&[], 10.0).await.unwrap();

        assert!(trace.features.is_empty());
        assert!(tracer.chunk_states().is_empty());
        assert_eq!(tracer.state(), TraceState::Done);
        assert_eq!(services.requests.get(), 0);
    }

    fn edge(comid: i64, from_node: i64, to_node: i64) -> FlowEdge {
        FlowEdge {
            comid,
            from_node,
            to_node,
            head_node: None,
        }
    }

    #[test]
    fn test_find_outlets_chain() {
        // 1: A -> B, 2: B -> C; C is never a from node
        let edges = vec![edge(1, 10, 11), edge(2, 11, 12)];
        assert_eq!(find_outlets(&edges), vec![2]);
    }

    #[test]
    fn test_find_outlets_across_chunks() {
        // on its own, the first half would report 101 and 102 as outlets
        let first_half = vec![edge(101, 1, 2), edge(102, 3, 4)];
        assert_eq!(find_outlets(&first_half), vec![101, 102]);

        let mut all = first_half;
        all.push(edge(103, 2, 3));
        assert_eq!(find_outlets(&all), vec![102]);
    }

    #[test]
    fn test_find_outlets_confluence() {
        let edges = vec![edge(1, 1, 3), edge(2, 2, 3), edge(3, 3, 4), edge(4, 5, 6)];
        assert_eq!(find_outlets(&edges), vec![3, 4]);
    }

    #[test]
    fn test_find_outlets_empty() {
        assert!(find_outlets(&[]).is_empty());
    }

    #[test]
    fn test_edge_from_multilinestring_feature() {
        let feature = Feature::from_json_value(json!({
            "type": "Feature",
            "properties": {"comid": 1233789, "fromnode": 510001234.0, "tonode": 510001235},
            "geometry": {"type": "MultiLineString", "coordinates": [[[-105.1, 40.2], [-105.0, 40.3]]]}
        }))
        .unwrap();
        let edge = FlowEdge::from_feature(&feature).unwrap();
        assert_eq!(edge.comid, 1233789);
        assert_eq!(edge.from_node, 510001234);
        assert_eq!(edge.to_node, 510001235);
        assert_eq!(edge.head_node, Some(Coord { x: -105.1, y: 40.2 }));
    }

    #[test]
    fn test_edge_without_tonode_is_upstream_failure() {
        let feature = Feature::from_json_value(json!({
            "type": "Feature",
            "properties": {"comid": 1, "fromnode": 2},
            "geometry": null
        }))
        .unwrap();
        let err = FlowEdge::from_feature(&feature).unwrap_err();
        assert!(err.to_string().contains("tonode"));
    }
}
