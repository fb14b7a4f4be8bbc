//! Node types and builders
//!
//! A node is one historical moment, addressed by the canonical path derived
//! from its own date and location fields.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::tdf::compute_tdf_hash;
use crate::temporal::RecordTimestamps;
use crate::url::{self, PathFields};

/// Completeness marker for a node
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Layer {
    /// Path fields and a name only
    #[default]
    Skeleton = 0,
    /// Described: tags, figures, summary
    Enriched = 1,
    /// Backed by rendered external content
    Rendered = 2,
}

impl TryFrom<u8> for Layer {
    type Error = GraphError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Skeleton),
            1 => Ok(Self::Enriched),
            2 => Ok(Self::Rendered),
            other => Err(GraphError::invalid_field(
                "layer",
                format!("{} is not one of 0, 1, 2", other),
            )),
        }
    }
}

impl From<Layer> for u8 {
    fn from(layer: Layer) -> u8 {
        layer as u8
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Who may read a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    #[serde(alias = "private")]
    Draft,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Public => "public",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Visibility {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" | "private" => Ok(Self::Draft),
            "public" => Ok(Self::Public),
            _ => Err(GraphError::invalid_field(
                "visibility",
                format!("'{}' is not draft or public", s),
            )),
        }
    }
}

/// Reference to content produced by the external renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    pub render_id: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub share_url: String,
}

/// A stored moment
///
/// `id` always equals `url::encode` of the path fields. Every field is
/// serialized unconditionally since records are stored with bincode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Canonical path
    pub id: String,
    /// Classification, `event` unless stated otherwise
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub year: i32,
    /// Lowercase month name
    pub month: String,
    pub month_num: u8,
    pub day: u8,
    /// 24-hour `HHMM`
    pub time: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub slug: String,
    pub layer: Layer,
    pub visibility: Visibility,
    pub created_by: String,
    pub tags: BTreeSet<String>,
    pub description: String,
    pub figures: BTreeSet<String>,
    pub content: Option<ContentRef>,
    pub era: String,
    /// Content was generated under a sensitive moderation verdict
    pub disclaimer: bool,
    pub source_type: String,
    pub confidence: Option<f32>,
    pub source_run_id: Option<String>,
    pub tdf_hash: String,
    pub timestamps: RecordTimestamps,
}

impl Node {
    /// Create a new builder for a node draft
    pub fn builder() -> NodeBuilder {
        NodeBuilder::new()
    }

    /// The path fields this node is addressed by
    pub fn fields(&self) -> PathFields {
        PathFields {
            year: self.year,
            month: self.month_num,
            day: self.day,
            time: self.time.clone(),
            country: self.country.clone(),
            region: self.region.clone(),
            city: self.city.clone(),
            slug: self.slug.clone(),
        }
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Public nodes are visible to everyone, drafts only to their creator
    pub fn is_visible_to(&self, caller: Option<&str>) -> bool {
        self.is_public() || caller.is_some_and(|c| c == self.created_by)
    }

    /// `(country, region, city)` key used for location matching
    pub fn location_key(&self) -> (String, String, String) {
        (
            self.country.clone(),
            self.region.clone(),
            self.city.clone(),
        )
    }

    /// Check the invariants that must hold for every stored node
    pub fn validate(&self) -> Result<()> {
        let expected = url::encode(&self.fields())?;
        if expected != self.id {
            return Err(GraphError::invalid_field(
                "id",
                format!("'{}' does not match its fields ('{}')", self.id, expected),
            ));
        }
        if self.layer == Layer::Rendered && self.content.is_none() {
            return Err(GraphError::invalid_field(
                "layer",
                "layer 2 requires a content reference",
            ));
        }
        if let Some(c) = self.confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(GraphError::invalid_field(
                    "confidence",
                    format!("{} is not in [0, 1]", c),
                ));
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary::from(self)
    }
}

/// Compact listing form of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub path: String,
    pub name: String,
    pub description: String,
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub layer: Layer,
    pub visibility: Visibility,
}

impl From<&Node> for NodeSummary {
    fn from(node: &Node) -> Self {
        Self {
            path: node.id.clone(),
            name: node.name.clone(),
            description: node.description.clone(),
            year: node.year,
            month: node.month_num,
            day: node.day,
            layer: node.layer,
            visibility: node.visibility,
        }
    }
}

/// Partial update: one slot per mutable column, `None` leaves it untouched
///
/// Path fields are not here since changing them would change the id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeUpdate {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    #[serde(alias = "one_liner")]
    pub description: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub figures: Option<BTreeSet<String>>,
    pub layer: Option<Layer>,
    pub visibility: Option<Visibility>,
    pub created_by: Option<String>,
    pub content: Option<ContentRef>,
    pub era: Option<String>,
    pub disclaimer: Option<bool>,
    pub source_type: Option<String>,
    pub confidence: Option<f32>,
    pub source_run_id: Option<String>,
}

impl NodeUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge supplied fields into `node` and re-check its invariants
    ///
    /// Stamps `published_at` on first publication and refreshes the
    /// fingerprint. Callers apply to a copy so a rejected update leaves the
    /// stored node untouched.
    pub fn apply(self, node: &mut Node, now: DateTime<Utc>) -> Result<()> {
        if let Some(v) = self.kind {
            node.kind = v;
        }
        if let Some(v) = self.name {
            node.name = v;
        }
        if let Some(v) = self.description {
            node.description = v;
        }
        if let Some(v) = self.tags {
            node.tags = v;
        }
        if let Some(v) = self.figures {
            node.figures = v;
        }
        if let Some(v) = self.layer {
            node.layer = v;
        }
        if let Some(v) = self.visibility {
            node.visibility = v;
        }
        if let Some(v) = self.created_by {
            node.created_by = v;
        }
        if let Some(v) = self.content {
            node.content = Some(v);
        }
        if let Some(v) = self.era {
            node.era = v;
        }
        if let Some(v) = self.disclaimer {
            node.disclaimer = v;
        }
        if let Some(v) = self.source_type {
            node.source_type = v;
        }
        if let Some(v) = self.confidence {
            node.confidence = Some(v);
        }
        if let Some(v) = self.source_run_id {
            node.source_run_id = Some(v);
        }

        if node.is_public() {
            node.timestamps.mark_published(now);
        }
        node.timestamps.touch(now);
        node.tdf_hash = compute_tdf_hash(node);
        node.validate()
    }
}

/// Everything needed to insert or merge a node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDraft {
    pub fields: PathFields,
    pub attrs: NodeUpdate,
}

impl NodeDraft {
    /// Canonical id this draft addresses
    pub fn id(&self) -> Result<String> {
        url::encode(&self.fields)
    }

    /// Materialize a brand-new node, filling unsupplied attributes with defaults
    pub fn into_node(self, now: DateTime<Utc>) -> Result<Node> {
        let id = url::encode(&self.fields)?;
        let month = self
            .fields
            .month_name()
            .ok_or_else(|| GraphError::invalid_field("month", "out of range"))?;

        let PathFields {
            year,
            month: month_num,
            day,
            time,
            country,
            region,
            city,
            slug,
        } = self.fields;

        let mut node = Node {
            id,
            kind: "event".to_string(),
            name: String::new(),
            year,
            month: month.to_string(),
            month_num,
            day,
            time,
            country,
            region,
            city,
            slug,
            layer: Layer::default(),
            visibility: Visibility::default(),
            created_by: "system".to_string(),
            tags: BTreeSet::new(),
            description: String::new(),
            figures: BTreeSet::new(),
            content: None,
            era: String::new(),
            disclaimer: false,
            source_type: "historical".to_string(),
            confidence: None,
            source_run_id: None,
            tdf_hash: String::new(),
            timestamps: RecordTimestamps::new_at(now),
        };

        self.attrs.apply(&mut node, now)?;
        Ok(node)
    }
}

/// Month given either as a number or a name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MonthValue {
    Number(u8),
    Name(String),
}

impl MonthValue {
    pub fn number(&self) -> Result<u8> {
        match self {
            Self::Number(n) if (1..=12).contains(n) => Ok(*n),
            Self::Number(n) => Err(GraphError::invalid_field(
                "month",
                format!("{} is not in 1-12", n),
            )),
            Self::Name(name) => url::month_number(name).ok_or_else(|| {
                GraphError::invalid_field("month", format!("'{}' is not a month name", name))
            }),
        }
    }
}

/// Loosely-typed node description, as found in seed files and tool calls
///
/// Path fields may be given individually, through `id`/`path`, or both; the
/// individual fields win.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeInput {
    #[serde(default, alias = "path")]
    pub id: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<MonthValue>,
    #[serde(default)]
    pub day: Option<u8>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(flatten)]
    pub attrs: NodeUpdate,
}

impl NodeInput {
    pub fn into_draft(self) -> Result<NodeDraft> {
        let base = match &self.id {
            Some(id) => Some(url::decode(id)?),
            None => None,
        };

        let year = match (self.year, &base) {
            (Some(y), _) => y,
            (None, Some(b)) => b.year,
            (None, None) => return Err(GraphError::invalid_field("year", "is required")),
        };
        let month = match (&self.month, &base) {
            (Some(m), _) => m.number()?,
            (None, Some(b)) => b.month,
            (None, None) => return Err(GraphError::invalid_field("month", "is required")),
        };
        let day = match (self.day, &base) {
            (Some(d), _) => d,
            (None, Some(b)) => b.day,
            (None, None) => return Err(GraphError::invalid_field("day", "is required")),
        };
        let time = self
            .time
            .or_else(|| base.as_ref().map(|b| b.time.clone()))
            .unwrap_or_else(|| DEFAULT_TIME.to_string());

        let country = pick("country", self.country, base.as_ref().map(|b| &b.country))?;
        let region = pick("region", self.region, base.as_ref().map(|b| &b.region))?;
        let city = pick("city", self.city, base.as_ref().map(|b| &b.city))?;

        let slug = match (self.slug, &base, &self.attrs.name) {
            (Some(s), _, _) => s,
            (None, Some(b), _) => b.slug.clone(),
            (None, None, Some(name)) => url::slugify(name),
            (None, None, None) => return Err(GraphError::invalid_field("slug", "is required")),
        };

        Ok(NodeDraft {
            fields: PathFields {
                year,
                month,
                day,
                time,
                country,
                region,
                city,
                slug,
            },
            attrs: self.attrs,
        })
    }
}

fn pick(field: &'static str, given: Option<String>, base: Option<&String>) -> Result<String> {
    given
        .or_else(|| base.cloned())
        .ok_or_else(|| GraphError::invalid_field(field, "is required"))
}

/// Noon, used when no time of day is known
pub const DEFAULT_TIME: &str = "1200";

/// Builder for NodeDraft with fluent API
#[derive(Debug, Default)]
pub struct NodeBuilder {
    year: Option<i32>,
    month: Option<u8>,
    day: Option<u8>,
    time: Option<String>,
    location: Option<(String, String, String)>,
    slug: Option<String>,
    attrs: NodeUpdate,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set year, month number and day
    pub fn date(mut self, year: i32, month: u8, day: u8) -> Self {
        self.year = Some(year);
        self.month = Some(month);
        self.day = Some(day);
        self
    }

    /// Set the 24-hour `HHMM` time (noon if not set)
    pub fn time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    /// Set country, region and city segments
    pub fn location(
        mut self,
        country: impl Into<String>,
        region: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        self.location = Some((country.into(), region.into(), city.into()));
        self
    }

    /// Set the slug (derived from the name if not set)
    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.attrs.kind = Some(kind.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.attrs.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.attrs.description = Some(description.into());
        self
    }

    /// Add a tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.attrs
            .tags
            .get_or_insert_with(BTreeSet::new)
            .insert(tag.into());
        self
    }

    /// Set multiple tags
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attrs.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Add a historical figure
    pub fn figure(mut self, figure: impl Into<String>) -> Self {
        self.attrs
            .figures
            .get_or_insert_with(BTreeSet::new)
            .insert(figure.into());
        self
    }

    pub fn figures<I, S>(mut self, figures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attrs.figures = Some(figures.into_iter().map(Into::into).collect());
        self
    }

    pub fn layer(mut self, layer: Layer) -> Self {
        self.attrs.layer = Some(layer);
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.attrs.visibility = Some(visibility);
        self
    }

    /// Shorthand for public visibility
    pub fn public(self) -> Self {
        self.visibility(Visibility::Public)
    }

    pub fn created_by(mut self, who: impl Into<String>) -> Self {
        self.attrs.created_by = Some(who.into());
        self
    }

    pub fn content(mut self, content: ContentRef) -> Self {
        self.attrs.content = Some(content);
        self
    }

    pub fn era(mut self, era: impl Into<String>) -> Self {
        self.attrs.era = Some(era.into());
        self
    }

    pub fn disclaimer(mut self, disclaimer: bool) -> Self {
        self.attrs.disclaimer = Some(disclaimer);
        self
    }

    pub fn source_type(mut self, source_type: impl Into<String>) -> Self {
        self.attrs.source_type = Some(source_type.into());
        self
    }

    /// Set confidence score
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.attrs.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn source_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.attrs.source_run_id = Some(run_id.into());
        self
    }

    /// Build the NodeDraft
    ///
    /// Segment shapes are checked when the draft is stored, not here.
    pub fn build(self) -> std::result::Result<NodeDraft, NodeBuilderError> {
        let (year, month, day) = match (self.year, self.month, self.day) {
            (Some(y), Some(m), Some(d)) => (y, m, d),
            _ => return Err(NodeBuilderError::MissingDate),
        };
        let (country, region, city) = self.location.ok_or(NodeBuilderError::MissingLocation)?;
        let name = self
            .attrs
            .name
            .as_deref()
            .ok_or(NodeBuilderError::MissingName)?;
        let slug = self.slug.unwrap_or_else(|| url::slugify(name));

        Ok(NodeDraft {
            fields: PathFields {
                year,
                month,
                day,
                time: self.time.unwrap_or_else(|| DEFAULT_TIME.to_string()),
                country,
                region,
                city,
                slug,
            },
            attrs: self.attrs,
        })
    }
}

/// Errors that can occur when building a NodeDraft
#[derive(Debug, thiserror::Error)]
pub enum NodeBuilderError {
    #[error("Missing required field: date")]
    MissingDate,
    #[error("Missing required field: location")]
    MissingLocation,
    #[error("Missing required field: name")]
    MissingName,
}

impl From<NodeBuilderError> for GraphError {
    fn from(err: NodeBuilderError) -> Self {
        let field = match err {
            NodeBuilderError::MissingDate => "date",
            NodeBuilderError::MissingLocation => "location",
            NodeBuilderError::MissingName => "name",
        };
        GraphError::invalid_field(field, "is required")
    }
}
