//! Chain layer a relay was observed on.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    L1,
    L2,
}

impl Layer {
    /// Column holding this layer's relay transaction hash.
    pub(crate) fn relay_hash_column(self) -> &'static str {
        match self {
            Self::L1 => "layer1_hash",
            Self::L2 => "layer2_hash",
        }
    }

    /// Column holding the height this layer's relay was observed at (0 if none).
    pub(crate) fn relay_height_column(self) -> &'static str {
        match self {
            Self::L1 => "layer1_height",
            Self::L2 => "layer2_height",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::L1 => Self::L2,
            Self::L2 => Self::L1,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L1 => f.write_str("l1"),
            Self::L2 => f.write_str("l2"),
        }
    }
}
