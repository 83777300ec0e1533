pub mod catalog;
pub mod columns;
pub mod db;
pub mod loader;
pub mod models;
pub mod pipeline;
