//! Component C4 (and the data model of spec.md §3): the abstract
//! `ResourceType`/`ResourceVerb` permission vocabulary, the concrete
//! Kubernetes `GroupResource` triple it maps onto, and the immutable
//! `ResourceMap` built from configuration at startup.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::error::AuthError;

/// The abstract resource kinds Cryostat's permission model talks about.
/// Closed enum: adding a kind is a compile-time event, not a runtime one
/// (spec.md §9, "Polymorphic permissions").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Target,
    Recording,
    Certificate,
    Credentials,
    ProbeTemplate,
    Template,
    Rule,
    Report,
    GrafanaDashboardUrl,
    MatchExpression,
}

impl ResourceType {
    /// All variants, used to build the default config-key set and in tests.
    pub const ALL: &'static [ResourceType] = &[
        ResourceType::Target,
        ResourceType::Recording,
        ResourceType::Certificate,
        ResourceType::Credentials,
        ResourceType::ProbeTemplate,
        ResourceType::Template,
        ResourceType::Rule,
        ResourceType::Report,
        ResourceType::GrafanaDashboardUrl,
        ResourceType::MatchExpression,
    ];

    fn config_key(self) -> &'static str {
        match self {
            ResourceType::Target => "TARGET",
            ResourceType::Recording => "RECORDING",
            ResourceType::Certificate => "CERTIFICATE",
            ResourceType::Credentials => "CREDENTIALS",
            ResourceType::ProbeTemplate => "PROBE_TEMPLATE",
            ResourceType::Template => "TEMPLATE",
            ResourceType::Rule => "RULE",
            ResourceType::Report => "REPORT",
            ResourceType::GrafanaDashboardUrl => "GRAFANA_DASHBOARD_URL",
            ResourceType::MatchExpression => "MATCH_EXPRESSION",
        }
    }

    fn from_config_key(key: &str) -> Option<Self> {
        ResourceType::ALL
            .iter()
            .copied()
            .find(|ty| ty.config_key().eq_ignore_ascii_case(key.trim()))
    }
}

/// The four CRUD-shaped verbs the abstract permission model supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceVerb {
    Create,
    Read,
    Update,
    Delete,
}

impl ResourceVerb {
    /// Translate to the Kubernetes verb string used on a
    /// `SelfSubjectAccessReview` (spec.md §4.3: `CREATE→create, READ→get,
    /// UPDATE→patch, DELETE→delete`). This is total over the closed enum —
    /// there is no "unknown verb" case to reject, unlike the source, which
    /// reaches this table through a value that could in principle be
    /// anything.
    pub fn as_k8s_verb(self) -> &'static str {
        match self {
            ResourceVerb::Create => "create",
            ResourceVerb::Read => "get",
            ResourceVerb::Update => "patch",
            ResourceVerb::Delete => "delete",
        }
    }
}

/// An abstract permission: "can this caller `verb` this `resource`?"
/// Immutable by construction (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceAction {
    pub resource: ResourceType,
    pub verb: ResourceVerb,
}

impl ResourceAction {
    pub fn new(resource: ResourceType, verb: ResourceVerb) -> Self {
        Self { resource, verb }
    }
}

static GROUP_RESOURCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([\w]+)([.\w]+)?(?:/([\w]+))?$").expect("static regex"));

/// The concrete Kubernetes triple `(group, resource, subResource)` that a
/// `ResourceType` maps onto. Any component may be empty; equality and
/// hashing are componentwise (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupResource {
    pub group: String,
    pub resource: String,
    pub sub_resource: String,
}

impl GroupResource {
    pub fn new(
        resource: impl Into<String>,
        group: impl Into<String>,
        sub_resource: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            group: group.into(),
            sub_resource: sub_resource.into(),
        }
    }
}

/// Error returned when a `GroupResource` string fails to parse
/// (spec.md §3, the `^([\w]+)([.\w]+)?(?:/([\w]+))?$` grammar).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupResourceParseError(pub String);

impl fmt::Display for GroupResourceParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed GroupResource string: {:?}", self.0)
    }
}

impl std::error::Error for GroupResourceParseError {}

impl FromStr for GroupResource {
    type Err = GroupResourceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = GROUP_RESOURCE_PATTERN
            .captures(s.trim())
            .ok_or_else(|| GroupResourceParseError(s.to_string()))?;
        let resource = captures
            .get(1)
            .ok_or_else(|| GroupResourceParseError(s.to_string()))?
            .as_str()
            .to_string();
        let group = captures
            .get(2)
            .map(|m| m.as_str().trim_start_matches('.').to_string())
            .unwrap_or_default();
        let sub_resource = captures
            .get(3)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        Ok(GroupResource {
            resource,
            group,
            sub_resource,
        })
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        if !self.group.is_empty() {
            write!(f, ".{}", self.group)?;
        }
        if !self.sub_resource.is_empty() {
            write!(f, "/{}", self.sub_resource)?;
        }
        Ok(())
    }
}

/// The immutable `ResourceType -> set<GroupResource>` mapping loaded once at
/// startup (spec.md §4.4). A lookup of a type absent from the map yields the
/// empty set, which by policy grants that action (spec.md §3, invariant 4).
#[derive(Debug, Clone, Default)]
pub struct ResourceMap {
    inner: HashMap<ResourceType, HashSet<GroupResource>>,
}

impl ResourceMap {
    /// Build a `ResourceMap` from a key/value configuration source: each
    /// recognized key is a `ResourceType` name, the value a comma-separated
    /// list of canonical `GroupResource` strings. Unknown keys and malformed
    /// values are logged and dropped; construction never fails.
    ///
    /// Returns the map plus the count of dropped entries (key or value),
    /// letting callers/tests assert on it without changing the
    /// authorization semantics of a dropped entry.
    pub fn from_properties<I, K, V>(entries: I) -> (Self, usize)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut inner: HashMap<ResourceType, HashSet<GroupResource>> = HashMap::new();
        let mut dropped = 0usize;

        for (key, value) in entries {
            let key = key.as_ref();
            let Some(resource_type) = ResourceType::from_config_key(key) else {
                warn!(key, "unrecognized ResourceType key in resource map config");
                dropped += 1;
                continue;
            };

            let mut parsed = HashSet::new();
            for piece in value.as_ref().split(',') {
                let piece = piece.trim();
                if piece.is_empty() {
                    continue;
                }
                match piece.parse::<GroupResource>() {
                    Ok(gr) => {
                        parsed.insert(gr);
                    }
                    Err(err) => {
                        warn!(key, piece, %err, "malformed GroupResource in resource map config");
                        dropped += 1;
                    }
                }
            }

            inner.entry(resource_type).or_default().extend(parsed);
        }

        (ResourceMap { inner }, dropped)
    }

    /// Iterate the concrete resources for an abstract `ResourceType`.
    /// Absence yields an empty iterator, never an error.
    pub fn iter_lookup(&self, resource_type: ResourceType) -> impl Iterator<Item = &GroupResource> {
        self.inner.get(&resource_type).into_iter().flatten()
    }
}

/// Translate a `ResourceVerb` to its Kubernetes verb string, or an
/// [`AuthError::InvalidArgument`] for a verb outside the closed set. Kept as
/// a fallible function (even though `ResourceVerb` is exhaustive today) so
/// the fan-out in `access` has a single place to surface the "unknown verb
/// is a programmer error" rule from spec.md §4.3(b) if the enum ever grows
/// ahead of this table.
pub fn translate_verb(verb: ResourceVerb) -> Result<&'static str, AuthError> {
    Ok(verb.as_k8s_verb())
}
