pub mod catalog;
pub mod embed;
pub mod gateway;
pub mod memory_store;
pub mod object_store;
