//! Area-of-interest normalization.
//!
//! Input polygons arrive as a GeoJSON feature collection of `Polygon` and
//! `MultiPolygon` features. They are flattened into one `MultiPolygon`, with
//! every coordinate rounded to four decimal places so that query strings and
//! later float comparisons are stable.

use crate::error::{QueryError, Result};
use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, PolygonType, Position, Value};
use nldi_utils::coords::round_pair;

/// Smallest closed ring: three distinct corners plus the closing point.
pub const MIN_RING_POSITIONS: usize = 4;

/// Axis-aligned bounding box in lon/lat degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// `None` when the geometry has no coordinates.
    pub fn of(geometry: &MultiPolygon<f64>) -> Option<Self> {
        geometry.bounding_rect().map(|rect| BoundingBox {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        })
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// The box as a closed five-point ring, starting at the lower-left corner
    /// and running up the west edge.
    pub fn to_ring(&self) -> LineString<f64> {
        LineString::from(vec![
            (self.min_x, self.min_y),
            (self.min_x, self.max_y),
            (self.max_x, self.max_y),
            (self.max_x, self.min_y),
            (self.min_x, self.min_y),
        ])
    }
}

/// The query polygon(s), immutable once normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    geometry: MultiPolygon<f64>,
    rings: Vec<LineString<f64>>,
    bbox: BoundingBox,
}

impl AreaOfInterest {
    /// Flatten a feature collection of polygons into one AOI.
    ///
    /// A `Polygon` with several rings contributes each ring as its own
    /// member; `MultiPolygon` members are kept whole.
    pub fn normalize(features: &FeatureCollection) -> Result<Self> {
        let mut polygons: Vec<Polygon<f64>> = Vec::new();
        let mut rings: Vec<LineString<f64>> = Vec::new();

        for (index, feature) in features.features.iter().enumerate() {
            let geometry = feature
                .geometry
                .as_ref()
                .ok_or_else(|| QueryError::malformed(format!("feature {index} has no geometry")))?;
            match &geometry.value {
                Value::Polygon(polygon_rings) => {
                    if polygon_rings.is_empty() {
                        return Err(QueryError::malformed(format!(
                            "feature {index} is a polygon without rings"
                        )));
                    }
                    for positions in polygon_rings {
                        let ring = rounded_ring(positions, index)?;
                        rings.push(ring.clone());
                        polygons.push(Polygon::new(ring, vec![]));
                    }
                }
                Value::MultiPolygon(members) => {
                    for member in members {
                        let polygon = rounded_polygon(member, index)?;
                        rings.push(polygon.exterior().clone());
                        rings.extend(polygon.interiors().iter().cloned());
                        polygons.push(polygon);
                    }
                }
                other => {
                    return Err(QueryError::malformed(format!(
                        "feature {index} has unsupported geometry type {}",
                        value_kind(other)
                    )))
                }
            }
        }

        let geometry = MultiPolygon::new(polygons);
        let bbox = BoundingBox::of(&geometry)
            .ok_or_else(|| QueryError::malformed("area of interest contains no polygons"))?;
        Ok(AreaOfInterest {
            geometry,
            rings,
            bbox,
        })
    }

    /// Normalize any GeoJSON document: a collection, a single feature or a
    /// bare geometry.
    pub fn from_geojson(document: &GeoJson) -> Result<Self> {
        match document {
            GeoJson::FeatureCollection(collection) => Self::normalize(collection),
            GeoJson::Feature(feature) => Self::normalize(&single(feature.clone())),
            GeoJson::Geometry(geometry) => Self::normalize(&single(Feature {
                bbox: None,
                geometry: Some(geometry.clone()),
                id: None,
                properties: None,
                foreign_members: None,
            })),
        }
    }

    pub fn from_geojson_str(text: &str) -> Result<Self> {
        let document: GeoJson = text
            .parse()
            .map_err(|e: geojson::Error| QueryError::malformed(e.to_string()))?;
        Self::from_geojson(&document)
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// Every ring in input order, exteriors and holes alike.
    pub fn rings(&self) -> &[LineString<f64>] {
        &self.rings
    }

    pub fn polygons(&self) -> impl Iterator<Item = &Polygon<f64>> {
        self.geometry.0.iter()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    pub fn vertex_count(&self) -> usize {
        self.rings.iter().map(|ring| ring.0.len()).sum()
    }
}

fn single(feature: Feature) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: vec![feature],
        foreign_members: None,
    }
}

fn rounded_polygon(rings: &PolygonType, index: usize) -> Result<Polygon<f64>> {
    let mut rings = rings.iter();
    let exterior = rings
        .next()
        .ok_or_else(|| QueryError::malformed(format!("feature {index} has an empty polygon member")))?;
    let exterior = rounded_ring(exterior, index)?;
    let interiors = rings
        .map(|ring| rounded_ring(ring, index))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn rounded_ring(positions: &[Position], index: usize) -> Result<LineString<f64>> {
    if positions.len() < MIN_RING_POSITIONS {
        return Err(QueryError::malformed(format!(
            "feature {index} has a ring with {} positions, at least {MIN_RING_POSITIONS} required",
            positions.len()
        )));
    }
    let coords = positions
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => {
                let (x, y) = round_pair(*x, *y);
                Ok(Coord { x, y })
            }
            _ => Err(QueryError::malformed(format!(
                "feature {index} has a position with fewer than two ordinates"
            ))),
        })
        .collect::<Result<Vec<_>>>()?;
    if coords.first() != coords.last() {
        return Err(QueryError::malformed(format!(
            "feature {index} has an unclosed ring"
        )));
    }
    Ok(LineString::new(coords))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}
