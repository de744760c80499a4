pub mod connections;
pub mod filter;
pub mod query;
pub mod schema;
pub mod value;
