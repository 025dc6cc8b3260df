//! Merging and assembling the typed result groups.

use crate::catchment::CatchmentSet;
use crate::flowline::FlowlineTrace;
use crate::gage::GageSet;
use geojson::{Feature, FeatureCollection};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

/// Drop features equal to an earlier one, comparing whole features.
///
/// Features from different services share ids but not property shapes, so
/// only full equality is a safe key. The serialized form is used as the key;
/// object keys serialize in sorted order, which makes it order-independent.
pub fn dedup_features(features: impl IntoIterator<Item = Feature>) -> Vec<Feature> {
    let mut seen: HashSet<String> = HashSet::new();
    features
        .into_iter()
        .filter(|feature| match serde_json::to_string(feature) {
            Ok(key) => seen.insert(key),
            Err(_) => true,
        })
        .collect()
}

/// Stable tag of a result group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Catchments,
    Flowlines,
    Gages,
}

impl GroupKind {
    /// Property holding the group's identifier list.
    pub fn ids_property(&self) -> &'static str {
        match self {
            GroupKind::Catchments => "catchmentIDs",
            GroupKind::Flowlines => "flowlineIDs",
            GroupKind::Gages => "gageIDs",
        }
    }
}

/// One group of the response: a feature wrapping the group's collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultGroup {
    #[serde(rename = "type")]
    kind: &'static str,
    pub id: GroupKind,
    pub geometry: FeatureCollection,
    pub properties: Map<String, Value>,
}

impl ResultGroup {
    fn new(id: GroupKind, geometry: FeatureCollection, ids: Value) -> Self {
        let mut properties = Map::new();
        properties.insert(id.ids_property().to_string(), ids);
        ResultGroup {
            kind: "Feature",
            id,
            geometry,
            properties,
        }
    }

    pub fn features(&self) -> &[Feature] {
        &self.geometry.features
    }
}

/// The response to one query; groups are always ordered catchments,
/// flowlines, gages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    pub features: Vec<ResultGroup>,
}

impl ResultCollection {
    pub fn builder() -> ResultCollectionBuilder {
        ResultCollectionBuilder::default()
    }

    pub fn group(&self, kind: GroupKind) -> Option<&ResultGroup> {
        self.features.iter().find(|g| g.id == kind)
    }

    pub fn kinds(&self) -> Vec<GroupKind> {
        self.features.iter().map(|g| g.id).collect()
    }
}

/// Collects whichever groups were requested, in any order.
#[derive(Debug, Default)]
pub struct ResultCollectionBuilder {
    catchments: Option<ResultGroup>,
    flowlines: Option<ResultGroup>,
    gages: Option<ResultGroup>,
}

impl ResultCollectionBuilder {
    pub fn catchments(mut self, catchments: &CatchmentSet) -> Self {
        self.catchments = Some(ResultGroup::new(
            GroupKind::Catchments,
            catchments.to_feature_collection(),
            json!(catchments.ids()),
        ));
        self
    }

    pub fn flowlines(mut self, trace: &FlowlineTrace) -> Self {
        self.flowlines = Some(ResultGroup::new(
            GroupKind::Flowlines,
            trace.to_feature_collection(),
            json!(trace.comids),
        ));
        self
    }

    pub fn gages(mut self, gages: &GageSet) -> Self {
        self.gages = Some(ResultGroup::new(
            GroupKind::Gages,
            gages.to_feature_collection(),
            json!(gages.codes()),
        ));
        self
    }

    pub fn build(self) -> ResultCollection {
        ResultCollection {
            kind: "FeatureCollection",
            features: [self.catchments, self.flowlines, self.gages]
                .into_iter()
                .flatten()
                .collect(),
        }
    }
}
