use std::future::Future;

use crate::core::{
    db::{photo::PhotoRepository, project::ProjectRepository},
    error::StoreResult,
};

/// One concrete persistence strategy. The deployment picks exactly one at
/// startup; the stores are generic over it.
pub trait Backend: ProjectRepository + PhotoRepository {
    fn backend_tag(&self) -> &'static str;

    /// Make the store ready for use (schema, connectivity).
    fn init(&self) -> impl Future<Output = StoreResult<()>>;

    /// Whether writes cross the network, which decides how upload progress
    /// is reported.
    fn is_remote(&self) -> bool {
        false
    }
}
