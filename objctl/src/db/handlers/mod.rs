//! Database repositories.

pub mod objects;
pub mod permissions;
pub mod tags;
pub mod users;

pub use objects::Objects;
pub use permissions::ObjectPermissions;
pub use tags::Tags;
pub use users::Users;
