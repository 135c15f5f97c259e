//! Request-layer contracts
//!
//! Transport-independent pieces of the request surface: parameter binding,
//! rollup and filename grammars, navigation listing and job status polling.

pub mod export;
pub mod navigation;
pub mod params;
pub mod status;

use serde::{Deserialize, Serialize};

pub use export::ExportFile;
pub use navigation::{
    list_content, HierarchyMode, ItemKind, NavigationItem, NavigationQuery, NavigationReply,
    Visibility,
};
pub use params::{parse_rollups, AnalysisParams, LazyMode};
pub use status::JobStatusService;

/// How objects are referenced in replies
///
/// `Human` uses natural names (`'Total Sales'`), `Machine` uses invariant
/// canonical references (`@'5603ca63'`), `Legacy` additionally exposes the
/// internal compound key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Style {
    /// Canonical references plus internal keys
    Legacy,
    /// Canonical, invariant references
    Machine,
    /// Natural names
    #[default]
    Human,
}

impl std::str::FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LEGACY" => Ok(Style::Legacy),
            "MACHINE" => Ok(Style::Machine),
            "HUMAN" => Ok(Style::Human),
            other => Err(format!("unknown style '{}'", other)),
        }
    }
}
