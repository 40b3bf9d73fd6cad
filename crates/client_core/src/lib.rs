//! Client-side aggregation and synchronization engine for the group Q&A board.
//!
//! [`store::Dashboard`] owns the aggregated view of a user's groups, questions
//! and answers. It resolves memberships with [`membership`], fills the view
//! through [`aggregator::GroupAggregator`] and routes every write through
//! [`mutations::MutationCoordinator`]. All remote traffic goes through a
//! [`gateway::RemoteGateway`].

pub mod aggregator;
pub mod config;
pub mod error;
pub mod gateway;
pub mod membership;
pub mod mutations;
pub mod store;

pub use aggregator::{Aggregation, GroupAggregator, GroupContent, GroupFailure};
pub use config::{load_settings, ClientSettings};
pub use error::DashboardError;
pub use gateway::{HttpGateway, RemoteGateway};
pub use mutations::{MembershipReconcile, MutationCoordinator, QuestionReconcile};
pub use store::{Dashboard, DashboardEvent, DashboardSnapshot, SyncOptions};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
