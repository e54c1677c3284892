use serde::{Deserialize, Serialize};

/// An independent deployment zone of the remote compute provider.
/// Identity is the code; `enabled` is the only mutable field and is
/// local-only (toggled by the presentation layer through the catalog).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Region {
    pub code: String,
    pub display_name: String,
    pub enabled: bool,
}
