pub mod captures;
pub mod sessions;
pub mod static_assets;
