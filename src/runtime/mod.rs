pub mod allocator;
pub mod arena;
pub mod binding;
pub mod error;
pub mod internal;
pub mod platform;
pub mod query_data;
pub mod types;
pub mod value;

pub use query_data::QueryData;
