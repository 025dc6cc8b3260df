//! Endpoint and batching configuration for the remote hydrologic services.

use crate::catchment::QueryShape;
use crate::flowline::FLOWLINE_CHUNK_SIZE;
use std::time::Duration;

/// NLDI geoserver hosting the catchment and flowline WFS layers.
pub const NLDI_GEOSERVER_URL: &str = "https://labs.waterdata.usgs.gov/geoserver/wmadata/ows";

/// NLDI linked-data root; navigation paths are appended per comid.
pub const NLDI_URL: &str = "https://labs.waterdata.usgs.gov/api/nldi/linked-data";

/// StreamStats network trace endpoint used for downstream gages.
pub const SS_NAV_SERVICE_URL: &str =
    "https://streamstats.usgs.gov/navigationservices/navigation/networktrace/route";

/// StreamStats gage stats bounding-box endpoint.
pub const GAGE_STATS_URL: &str = "https://streamstats.usgs.gov/gagestatsservices/stations/Bounds";

/// NWIS site service used to look up active stations.
pub const STATION_STATUS_URL: &str = "https://waterservices.usgs.gov/nwis/site/";

pub const CATCHMENT_LAYER: &str = "wmadata:catchmentsp";
pub const FLOWLINE_LAYER: &str = "wmadata:nhdflowline_network";

/// The only coordinate reference used by any request.
pub const SRS_NAME: &str = "EPSG:4326";

/// Upper bound on features the geoserver returns for one flowline chunk.
pub const MAX_FEATURES: u32 = 5000;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Where and how the remote services are reached.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub geoserver_url: String,
    pub nldi_url: String,
    pub navigation_url: String,
    pub gage_stats_url: String,
    pub station_status_url: String,
    pub catchment_layer: String,
    pub flowline_layer: String,
    pub srs_name: String,
    pub max_features: u32,
    /// Applied to every request; an expired timeout is an upstream failure.
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            geoserver_url: NLDI_GEOSERVER_URL.to_string(),
            nldi_url: NLDI_URL.to_string(),
            navigation_url: SS_NAV_SERVICE_URL.to_string(),
            gage_stats_url: GAGE_STATS_URL.to_string(),
            station_status_url: STATION_STATUS_URL.to_string(),
            catchment_layer: CATCHMENT_LAYER.to_string(),
            flowline_layer: FLOWLINE_LAYER.to_string(),
            srs_name: SRS_NAME.to_string(),
            max_features: MAX_FEATURES,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Per-query engine knobs that do not depend on the transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    pub query_shape: QueryShape,
    /// Catchment ids per flowline request.
    pub chunk_size: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            query_shape: QueryShape::default(),
            chunk_size: FLOWLINE_CHUNK_SIZE,
        }
    }
}
