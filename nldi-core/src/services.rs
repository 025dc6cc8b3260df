//! The boundary between the query engine and the remote hydrologic services.
//!
//! Every stage talks to the outside world only through [`HydroServices`],
//! so the engine can run against [`crate::client::NldiClient`] in production
//! and against scripted responses in tests. Implementations return parsed
//! documents; a body that does not parse is an `UpstreamUnavailable` error
//! for the stage that asked for it.

use crate::aoi::BoundingBox;
use crate::error::{QueryError, Result, Stage};
use geo::Coord;
use geojson::{FeatureCollection, GeoJson};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Outbound calls the engine needs, one method per remote operation.
///
/// Calls are awaited one at a time; nothing here requires the futures to be
/// `Send`.
#[allow(async_fn_in_trait)]
pub trait HydroServices {
    /// Catchment polygons intersecting a WKT polygon.
    async fn catchments_intersecting(&self, query_wkt: &str) -> Result<FeatureCollection>;

    /// Flowline network features for one chunk of comids.
    async fn flowlines_by_comid(&self, comids: &[i64]) -> Result<FeatureCollection>;

    /// Flowlines downstream (main stem) of `comid`, up to `distance_km`.
    async fn downstream_flowlines(&self, comid: i64, distance_km: f64)
        -> Result<FeatureCollection>;

    /// Gage stations inside a bounding box.
    async fn gages_in_bounds(&self, bbox: &BoundingBox) -> Result<FeatureCollection>;

    /// Gage stations downstream of a start point. The first feature of the
    /// response is the start point itself.
    async fn downstream_gages(&self, start: Coord<f64>, distance_km: f64)
        -> Result<FeatureCollection>;

    /// The subset of `codes` that are currently active stations.
    async fn active_station_codes(&self, codes: &[String]) -> Result<Vec<String>>;
}

/// Parse a response body that must be a GeoJSON feature collection.
pub fn parse_feature_collection(stage: Stage, body: &str) -> Result<FeatureCollection> {
    match body.parse::<GeoJson>() {
        Ok(GeoJson::FeatureCollection(collection)) => Ok(collection),
        Ok(_) => Err(QueryError::upstream(
            stage,
            "response is GeoJSON but not a FeatureCollection",
        )),
        Err(e) => Err(QueryError::upstream(stage, e)),
    }
}

/// Pull the active station codes out of an NWIS `mapper` XML response.
///
/// Each `<site>` element carries its code in the `sno` attribute. A body
/// without a `<sites>` element is not a status response at all.
pub fn parse_active_station_codes(body: &str) -> Result<Vec<String>> {
    let fail = |reason: String| QueryError::upstream(Stage::StationStatus, reason);
    let mut reader = Reader::from_str(body);
    let mut codes = Vec::new();
    let mut saw_sites = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                match element.name().as_ref() {
                    b"sites" => saw_sites = true,
                    b"site" => {
                        for attribute in element.attributes() {
                            let attribute = attribute.map_err(|e| fail(e.to_string()))?;
                            if attribute.key.as_ref() == b"sno" {
                                let code = attribute
                                    .unescape_value()
                                    .map_err(|e| fail(e.to_string()))?;
                                codes.push(code.trim().to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(fail(format!(
                    "invalid XML at position {}: {e}",
                    reader.buffer_position()
                )))
            }
        }
    }
    if !saw_sites {
        return Err(fail("response has no <sites> element".to_string()));
    }
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;

    // https://waterservices.usgs.gov/nwis/site/?format=mapper&sites=06719505,06720000&siteStatus=active
    const MAPPER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mapper>
  <sites>
    <site sno="06719505" sna="CLEAR CREEK AT GOLDEN, CO" cat="ST" lat="39.7530" lng="-105.2353" agc="USGS"/>
    <site sno="06720000" sna="SOUTH PLATTE RIVER AT DENVER, CO" cat="ST" lat="39.7597" lng="-105.0039" agc="USGS"></site>
  </sites>
</mapper>
"#;

    #[test]
    fn test_parse_active_station_codes() {
        let codes = parse_active_station_codes(MAPPER_XML).unwrap();
        assert_eq!(codes, vec!["06719505", "06720000"]);
    }

    #[test]
    fn test_parse_empty_sites() {
        let codes = parse_active_station_codes("<mapper><sites/></mapper>").unwrap();
        assert!(codes.is_empty());
    }

    #[test]
    fn test_status_body_that_is_not_xml() {
        let err = parse_active_station_codes("No sites found matching all criteria").unwrap_err();
        assert!(matches!(
            err,
            QueryError::UpstreamUnavailable {
                stage: Stage::StationStatus,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_feature_collection() {
        let body = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"featureid": 1}, "geometry": null}
        ]}"#;
        let collection = parse_feature_collection(Stage::Catchments, body).unwrap();
        assert_eq!(collection.features.len(), 1);
    }

    #[test]
    fn test_html_error_page_is_upstream_failure() {
        let err = parse_feature_collection(Stage::Flowlines, "<html>503 Service Unavailable</html>")
            .unwrap_err();
        match err {
            QueryError::UpstreamUnavailable { stage, .. } => assert_eq!(stage, Stage::Flowlines),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_bare_geometry_is_not_a_collection() {
        let body = r#"{"type": "Point", "coordinates": [-105.0, 40.0]}"#;
        assert!(parse_feature_collection(Stage::BoundedGages, body).is_err());
    }
}
