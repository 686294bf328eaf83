pub mod comments;
pub mod projects;
pub mod reactions;
pub mod users;
pub mod versions;
