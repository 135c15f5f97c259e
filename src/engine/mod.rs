//! Pluggable collaborators: metadata, statistics, members, execution

pub mod memory;
pub mod traits;

pub use memory::{
    FixedStatistics, InMemoryCatalog, InMemoryMemberSource, MemoryAnalysisEngine,
    StaticAccessRights,
};
pub use traits::{
    AccessRights, AnalysisEngine, DimensionCatalog, ExpressionParser, MemberSource,
    ProjectCatalog, StatisticsService,
};
