mod cache;

pub use cache::{StatusCache, StatusSnapshot};
