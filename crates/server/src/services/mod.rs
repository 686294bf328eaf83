pub mod access;
pub mod comments;
pub mod notify;
pub mod projects;
pub mod reactions;
pub mod scoring;
pub mod users;
pub mod versions;
