//! Polygon query commands.

use anyhow::Context;
use geojson::GeoJson;
use log::info;
use nldi_core::catchment::QueryShape;
use nldi_core::client::NldiClient;
use nldi_core::collection::{GroupKind, ResultCollection};
use nldi_core::config::{QueryOptions, ServiceConfig};
use nldi_core::error::ErrorResponse;
use nldi_core::query::{PolyQuery, QueryRequest};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// What the `query` subcommand asks for besides catchments.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueryFlags {
    pub flowlines: bool,
    pub gages: bool,
    pub downstream_km: f64,
    pub active: bool,
    pub rings: bool,
}

impl QueryFlags {
    pub fn request(&self, data: GeoJson) -> QueryRequest {
        QueryRequest {
            return_flowlines: self.flowlines,
            return_gages: self.gages,
            downstream_distance: self.downstream_km,
            annotate_active: self.active,
            ..QueryRequest::new(data)
        }
    }

    pub fn options(&self) -> QueryOptions {
        QueryOptions {
            query_shape: if self.rings {
                QueryShape::Rings
            } else {
                QueryShape::BoundingBox
            },
            ..QueryOptions::default()
        }
    }
}

/// Query an AOI read from a GeoJSON file.
pub async fn run_query(
    config: ServiceConfig,
    input: &Path,
    flags: QueryFlags,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let data: GeoJson = text
        .parse()
        .with_context(|| format!("{} is not GeoJSON", input.display()))?;
    execute(config, flags.options(), &flags.request(data), output).await
}

/// Query from a JSON request document.
pub async fn run_request(
    config: ServiceConfig,
    input: &Path,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let request = parse_request(&text)
        .with_context(|| format!("{} is not a polygon query request", input.display()))?;
    execute(config, QueryOptions::default(), &request, output).await
}

pub fn parse_request(text: &str) -> serde_json::Result<QueryRequest> {
    serde_json::from_str(text)
}

async fn execute(
    config: ServiceConfig,
    options: QueryOptions,
    request: &QueryRequest,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let client = NldiClient::new(config)?;
    match PolyQuery::new(&client, options).run(request).await {
        Ok(result) => {
            info!("{}", summary(&result));
            write_result(&result, output)
        }
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&ErrorResponse::from(&e))?);
            Err(e.into())
        }
    }
}

/// One line per group: `catchments=12 flowlines=40 gages=3`.
pub fn summary(result: &ResultCollection) -> String {
    result
        .features
        .iter()
        .map(|group| {
            let name = match group.id {
                GroupKind::Catchments => "catchments",
                GroupKind::Flowlines => "flowlines",
                GroupKind::Gages => "gages",
            };
            format!("{name}={}", group.features().len())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_result(result: &ResultCollection, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, result)?;
            writer.flush()?;
            info!("wrote {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, result)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nldi_core::catchment::CatchmentSet;
    use nldi_core::flowline::FlowlineTrace;

    const SQUARE: &str = r#"{"type": "Polygon", "coordinates": [[[-105.0, 40.0], [-105.0, 41.0], [-104.0, 41.0], [-104.0, 40.0], [-105.0, 40.0]]]}"#;

    #[test]
    fn test_flags_to_request() {
        let flags = QueryFlags {
            flowlines: true,
            downstream_km: 25.0,
            rings: true,
            ..QueryFlags::default()
        };
        let request = flags.request(SQUARE.parse().unwrap());
        assert!(request.return_flowlines);
        assert!(!request.return_gages);
        assert!(!request.annotate_active);
        assert_eq!(request.downstream_distance, 25.0);
        assert_eq!(flags.options().query_shape, QueryShape::Rings);
        assert_eq!(QueryFlags::default().options().query_shape, QueryShape::BoundingBox);
    }

    #[test]
    fn test_parse_request_document() {
        let text = format!(
            r#"{{"data": {SQUARE}, "returnGages": true, "downstreamDistance": 10, "annotateActive": true}}"#
        );
        let request = parse_request(&text).unwrap();
        assert!(request.return_gages);
        assert!(request.annotate_active);
        assert_eq!(request.downstream_distance, 10.0);
    }

    #[test]
    fn test_request_without_data_is_rejected() {
        assert!(parse_request(r#"{"returnGages": true}"#).is_err());
    }

    #[test]
    fn test_summary() {
        let result = ResultCollection::builder()
            .catchments(&CatchmentSet::default())
            .flowlines(&FlowlineTrace::default())
            .build();
        assert_eq!(summary(&result), "catchments=0 flowlines=0");
    }
}
