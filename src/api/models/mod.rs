pub mod captures;
pub mod sessions;
