use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub desc: bool,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Sort {
        Sort {
            field: field.into(),
            desc: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Sort {
        Sort {
            field: field.into(),
            desc: true,
        }
    }
}
