use serde::{Deserialize, Serialize};

/// Aggregation tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggKind {
    Sum,
    Avg,
    Min,
    Max,
    Facet,
}

impl AggKind {
    pub fn parse(s: &str) -> Option<AggKind> {
        match s.to_ascii_uppercase().as_str() {
            "SUM" => Some(AggKind::Sum),
            "AVG" => Some(AggKind::Avg),
            "MIN" => Some(AggKind::Min),
            "MAX" => Some(AggKind::Max),
            "FACET" => Some(AggKind::Facet),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggKind::Sum => "SUM",
            AggKind::Avg => "AVG",
            AggKind::Min => "MIN",
            AggKind::Max => "MAX",
            AggKind::Facet => "FACET",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggSpec {
    pub field: String,
    pub kind: AggKind,
}
