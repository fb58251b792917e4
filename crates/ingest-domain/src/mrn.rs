use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A canonical "Marmot Resource Name": `mrn://<type>/<provider>/<name>`.
///
/// Lineage MRNs encode `source->target` in the name component; documentation
/// MRNs embed the owning asset's MRN. Both still parse with [`Mrn::parse`]
/// since the grammar only splits on the first two `/` after the scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mrn(String);

const SCHEME: &str = "mrn://";

impl Mrn {
    /// Build a new MRN from its three components.
    pub fn new(r#type: &str, provider: &str, name: &str) -> Self {
        Mrn(format!("{SCHEME}{type}/{provider}/{name}"))
    }

    /// Wrap an already-canonical MRN string (e.g. one a plugin supplied
    /// directly) without re-deriving it from components.
    pub fn new_from_string(s: impl Into<String>) -> Self {
        Mrn(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(type, provider, name)`. Fails if the scheme is missing or
    /// fewer than three path segments are present.
    pub fn parse(s: &str) -> Result<(String, String, String), DomainError> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| DomainError::InvalidMrn(s.to_string()))?;
        let mut parts = rest.splitn(3, '/');
        let r#type = parts.next().filter(|s| !s.is_empty());
        let provider = parts.next().filter(|s| !s.is_empty());
        let name = parts.next().filter(|s| !s.is_empty());
        match (r#type, provider, name) {
            (Some(t), Some(p), Some(n)) => Ok((t.to_string(), p.to_string(), n.to_string())),
            _ => Err(DomainError::InvalidMrn(s.to_string())),
        }
    }

    /// Synthesize a lineage MRN: `mrn://lineage/<lower(type)>/<source>-><target>`.
    pub fn lineage(edge_type: &str, source: &Mrn, target: &Mrn) -> Self {
        Mrn::new(
            "lineage",
            &edge_type.to_lowercase(),
            &format!("{}->{}", source.as_str(), target.as_str()),
        )
    }

    /// Synthesize a documentation MRN: `mrn://documentation/<lower(type)>/<asset_mrn>`.
    pub fn documentation(doc_type: &str, asset: &Mrn) -> Self {
        Mrn::new("documentation", &doc_type.to_lowercase(), asset.as_str())
    }
}

impl fmt::Display for Mrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Mrn> for String {
    fn from(m: Mrn) -> String {
        m.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let mrn = Mrn::new("table", "postgres", "public.users");
        let (t, p, n) = Mrn::parse(mrn.as_str()).unwrap();
        assert_eq!(t, "table");
        assert_eq!(p, "postgres");
        assert_eq!(n, "public.users");
    }

    #[test]
    fn round_trips_names_with_slashes() {
        // Lineage/documentation names legitimately contain '/' and '->'.
        let mrn = Mrn::new("lineage", "kafka", "topic/a->topic/b");
        let (t, p, n) = Mrn::parse(mrn.as_str()).unwrap();
        assert_eq!(t, "lineage");
        assert_eq!(p, "kafka");
        assert_eq!(n, "topic/a->topic/b");
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(Mrn::parse("table/postgres/public.users").is_err());
    }

    #[test]
    fn rejects_incomplete_path() {
        assert!(Mrn::parse("mrn://table/postgres").is_err());
    }

    #[test]
    fn lineage_and_documentation_synthesis() {
        let a = Mrn::new("table", "pg", "a");
        let b = Mrn::new("table", "pg", "b");
        let lineage = Mrn::lineage("TableLineage", &a, &b);
        assert_eq!(lineage.as_str(), "mrn://lineage/tablelineage/mrn://table/pg/a->mrn://table/pg/b");

        let doc = Mrn::documentation("Readme", &a);
        assert_eq!(doc.as_str(), "mrn://documentation/readme/mrn://table/pg/a");
    }
}
