pub mod assets;
pub mod http_store;
pub mod initial_data;
pub mod parsers;
