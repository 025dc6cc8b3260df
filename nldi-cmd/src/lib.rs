//! Command implementations for the NLDI polygon query CLI.
//!
//! Provides subcommands that run one polygon query against the USGS
//! services, either from an AOI file plus flags or from a full request
//! document.

use clap::{Args, Subcommand};
use nldi_core::config::{
    ServiceConfig, DEFAULT_TIMEOUT_SECS, GAGE_STATS_URL, NLDI_GEOSERVER_URL, NLDI_URL,
    SS_NAV_SERVICE_URL, STATION_STATUS_URL,
};
use std::path::PathBuf;
use std::time::Duration;

pub mod query;

#[derive(Subcommand)]
pub enum Command {
    /// Query catchments, and optionally flowlines and gages, for an AOI file
    Query {
        /// GeoJSON file holding the area of interest polygons
        #[arg(short = 'i', long)]
        input: PathBuf,

        /// Include the flowline network draining the catchments
        #[arg(long)]
        flowlines: bool,

        /// Include gages inside and downstream of the AOI
        #[arg(long)]
        gages: bool,

        /// Kilometres to follow the network downstream of each outlet
        #[arg(short = 'd', long, default_value_t = 0.0)]
        downstream_km: f64,

        /// Mark each gage with its active status
        #[arg(long)]
        active: bool,

        /// Query catchments ring by ring instead of with the AOI bounding box
        #[arg(long)]
        rings: bool,

        /// Output path for the result collection (stdout when omitted)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Run a query from a JSON request document as posted by the web layer
    Request {
        /// JSON file holding `data`, `returnFlowlines`, `returnGages` and `downstreamDistance`
        #[arg(short = 'i', long)]
        input: PathBuf,

        /// Output path for the result collection (stdout when omitted)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
}

/// Service endpoints, overridable by flag or environment.
#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    #[arg(long, env = "NLDI_GEOSERVER_URL", default_value = NLDI_GEOSERVER_URL, global = true)]
    pub geoserver_url: String,

    #[arg(long, env = "NLDI_URL", default_value = NLDI_URL, global = true)]
    pub nldi_url: String,

    #[arg(long, env = "NLDI_NAVIGATION_URL", default_value = SS_NAV_SERVICE_URL, global = true)]
    pub navigation_url: String,

    #[arg(long, env = "NLDI_GAGE_STATS_URL", default_value = GAGE_STATS_URL, global = true)]
    pub gage_stats_url: String,

    #[arg(long, env = "NLDI_STATION_STATUS_URL", default_value = STATION_STATUS_URL, global = true)]
    pub station_status_url: String,

    /// Seconds before any single request is abandoned
    #[arg(long, env = "NLDI_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    pub timeout_secs: u64,
}

impl ServiceArgs {
    pub fn to_config(&self) -> ServiceConfig {
        ServiceConfig {
            geoserver_url: self.geoserver_url.clone(),
            nldi_url: self.nldi_url.clone(),
            navigation_url: self.navigation_url.clone(),
            gage_stats_url: self.gage_stats_url.clone(),
            station_status_url: self.station_status_url.clone(),
            request_timeout: Duration::from_secs(self.timeout_secs),
            ..ServiceConfig::default()
        }
    }
}

pub async fn run(command: Command, services: ServiceArgs) -> anyhow::Result<()> {
    let config = services.to_config();
    match command {
        Command::Query {
            input,
            flowlines,
            gages,
            downstream_km,
            active,
            rings,
            output,
        } => {
            let flags = query::QueryFlags {
                flowlines,
                gages,
                downstream_km,
                active,
                rings,
            };
            query::run_query(config, &input, flags, output.as_deref()).await
        }
        Command::Request { input, output } => {
            query::run_request(config, &input, output.as_deref()).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        services: ServiceArgs,
    }

    #[test]
    fn test_service_overrides() {
        let cli = TestCli::try_parse_from([
            "nldi-cli",
            "--nldi-url",
            "http://localhost:8080/linked-data",
            "--timeout-secs",
            "5",
        ])
        .unwrap();
        let config = cli.services.to_config();
        assert_eq!(config.nldi_url, "http://localhost:8080/linked-data");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.catchment_layer, "wmadata:catchmentsp");
    }
}
