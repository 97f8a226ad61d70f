use serde::{Deserialize, Serialize};

/// Condition tokens recognized by the engine. Front-ends normalize their
/// own spellings (`=`, `IN`, `in`, `ge`, …) to these before planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Cond {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Range,
    Set,
    Any,
    Empty,
}

impl Cond {
    /// Parse a condition token, case-insensitively, accepting the symbolic
    /// spellings used by the SQL surface.
    pub fn parse(s: &str) -> Option<Cond> {
        match s.to_ascii_uppercase().as_str() {
            "EQ" | "=" | "==" => Some(Cond::Eq),
            "LT" | "<" => Some(Cond::Lt),
            "LE" | "<=" => Some(Cond::Le),
            "GT" | ">" => Some(Cond::Gt),
            "GE" | ">=" => Some(Cond::Ge),
            "RANGE" => Some(Cond::Range),
            "SET" | "IN" => Some(Cond::Set),
            "ANY" => Some(Cond::Any),
            "EMPTY" => Some(Cond::Empty),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Cond::Eq => "EQ",
            Cond::Lt => "LT",
            Cond::Le => "LE",
            Cond::Gt => "GT",
            Cond::Ge => "GE",
            Cond::Range => "RANGE",
            Cond::Set => "SET",
            Cond::Any => "ANY",
            Cond::Empty => "EMPTY",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Cond::parse("eq"), Some(Cond::Eq));
        assert_eq!(Cond::parse("Range"), Some(Cond::Range));
        assert_eq!(Cond::parse("in"), Some(Cond::Set));
        assert_eq!(Cond::parse(">="), Some(Cond::Ge));
        assert_eq!(Cond::parse("like"), None);
    }
}
