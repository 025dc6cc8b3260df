//! HTTP implementation of [`HydroServices`] against the USGS services.

use crate::aoi::BoundingBox;
use crate::config::ServiceConfig;
use crate::error::{QueryError, Result, Stage};
use crate::services::{parse_active_station_codes, parse_feature_collection, HydroServices};
use geo::Coord;
use geojson::FeatureCollection;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

/// `INTERSECTS` CQL filter for the catchment layer.
pub fn intersects_filter(query_wkt: &str) -> String {
    format!("INTERSECTS(the_geom, {query_wkt})")
}

/// `comid IN (...)` CQL filter; a single id is an ordinary list of one.
pub fn comid_filter(comids: &[i64]) -> String {
    let ids = comids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("comid IN ({ids})")
}

/// Parameter list for a downstream gage trace from `start`.
pub fn navigation_payload(start: Coord<f64>, distance_km: f64) -> Value {
    json!([
        {
            "id": 1,
            "name": "Start point location",
            "required": true,
            "description": "Specified lat/long/crs  navigation start location",
            "valueType": "geojson point geometry",
            "value": {
                "type": "Point",
                "coordinates": [start.x, start.y],
                "crs": {"properties": {"name": "EPSG:4326"}, "type": "name"}
            }
        },
        {
            "id": 0,
            "name": "Limit",
            "required": false,
            "description": "Limits network operations to within specified option",
            "valueType": "exclusiveOption",
            "value": {
                "id": 3,
                "name": "Distance (km)",
                "description": "Limiting distance in kilometers from starting point",
                "valueType": "numeric",
                "value": distance_km
            }
        },
        {
            "id": 5,
            "name": "Direction",
            "required": true,
            "description": "Network operation direction",
            "valueType": "exclusiveOption",
            "value": "downstream"
        },
        {
            "id": 6,
            "name": "Query Source",
            "required": true,
            "description": "Specified data source to query",
            "valueType": "option",
            "value": ["nwisgage"]
        }
    ])
}

/// Client for the NLDI geoserver, NLDI navigation, StreamStats and NWIS.
///
/// Requests carry the configured timeout and are never retried.
pub struct NldiClient {
    client: Client,
    config: ServiceConfig,
}

impl NldiClient {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(NldiClient { client, config })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Send a request and return the body whatever the status; the caller's
    /// parser decides whether the body is usable.
    async fn fetch(&self, stage: Stage, request: RequestBuilder) -> Result<String> {
        let response = request
            .send()
            .await
            .map_err(|e| QueryError::upstream(stage, e))?;
        let status = response.status();
        debug!("{stage} responded {status} from {}", response.url());
        let body = response
            .text()
            .await
            .map_err(|e| QueryError::upstream(stage, e))?;
        if !status.is_success() {
            debug!("{stage} error body: {body}");
        }
        Ok(body)
    }

    async fn fetch_collection(
        &self,
        stage: Stage,
        request: RequestBuilder,
    ) -> Result<FeatureCollection> {
        let body = self.fetch(stage, request).await?;
        parse_feature_collection(stage, &body)
    }

    fn wfs_request(&self, type_name: &str, cql_filter: String) -> Vec<(&'static str, String)> {
        vec![
            ("service", "wfs".to_string()),
            ("version", "1.0.0".to_string()),
            ("request", "GetFeature".to_string()),
            ("typeName", type_name.to_string()),
            ("outputFormat", "application/json".to_string()),
            ("srsName", self.config.srs_name.clone()),
            ("CQL_FILTER", cql_filter),
        ]
    }
}

impl HydroServices for NldiClient {
    async fn catchments_intersecting(&self, query_wkt: &str) -> Result<FeatureCollection> {
        let params = self.wfs_request(&self.config.catchment_layer, intersects_filter(query_wkt));
        let request = self.client.get(&self.config.geoserver_url).query(&params);
        self.fetch_collection(Stage::Catchments, request).await
    }

    async fn flowlines_by_comid(&self, comids: &[i64]) -> Result<FeatureCollection> {
        let mut params = self.wfs_request(&self.config.flowline_layer, comid_filter(comids));
        params.push(("maxFeatures", self.config.max_features.to_string()));
        let request = self.client.get(&self.config.geoserver_url).query(&params);
        self.fetch_collection(Stage::Flowlines, request).await
    }

    async fn downstream_flowlines(
        &self,
        comid: i64,
        distance_km: f64,
    ) -> Result<FeatureCollection> {
        let url = format!(
            "{}/comid/{comid}/navigation/DM/flowlines",
            self.config.nldi_url.trim_end_matches('/')
        );
        let request = self
            .client
            .get(url)
            .query(&[("f", "json".to_string()), ("distance", distance_km.to_string())]);
        self.fetch_collection(Stage::DownstreamFlowlines, request)
            .await
    }

    async fn gages_in_bounds(&self, bbox: &BoundingBox) -> Result<FeatureCollection> {
        let request = self.client.get(&self.config.gage_stats_url).query(&[
            ("xmin", bbox.min_x.to_string()),
            ("ymin", bbox.min_y.to_string()),
            ("xmax", bbox.max_x.to_string()),
            ("ymax", bbox.max_y.to_string()),
            ("geojson", "true".to_string()),
            ("includeStats", "false".to_string()),
        ]);
        self.fetch_collection(Stage::BoundedGages, request).await
    }

    async fn downstream_gages(
        &self,
        start: Coord<f64>,
        distance_km: f64,
    ) -> Result<FeatureCollection> {
        let request = self
            .client
            .post(&self.config.navigation_url)
            .json(&navigation_payload(start, distance_km));
        self.fetch_collection(Stage::DownstreamGages, request).await
    }

    async fn active_station_codes(&self, codes: &[String]) -> Result<Vec<String>> {
        let request = self.client.get(&self.config.station_status_url).query(&[
            ("format", "mapper".to_string()),
            ("sites", codes.join(",")),
            ("siteStatus", "active".to_string()),
        ]);
        let body = self.fetch(Stage::StationStatus, request).await?;
        parse_active_station_codes(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comid_filter() {
        assert_eq!(comid_filter(&[1233789]), "comid IN (1233789)");
        assert_eq!(comid_filter(&[1, 2, 3]), "comid IN (1, 2, 3)");
    }

    #[test]
    fn test_intersects_filter() {
        assert_eq!(
            intersects_filter("POLYGON ((0 0, 0 1, 1 1, 0 0))"),
            "INTERSECTS(the_geom, POLYGON ((0 0, 0 1, 1 1, 0 0)))"
        );
    }

    #[test]
    fn test_navigation_payload() {
        let payload = navigation_payload(Coord { x: -105.2, y: 39.7 }, 10.0);
        assert_eq!(payload[0]["value"]["coordinates"], json!([-105.2, 39.7]));
        assert_eq!(payload[1]["value"]["value"], json!(10.0));
        assert_eq!(payload[2]["value"], "downstream");
        assert_eq!(payload[3]["value"], json!(["nwisgage"]));
    }

    #[test]
    fn test_client_uses_default_endpoints() {
        let client = NldiClient::new(ServiceConfig::default()).unwrap();
        assert_eq!(client.config().catchment_layer, "wmadata:catchmentsp");
        assert_eq!(client.config().max_features, 5000);
    }
}
