pub mod attachments;
pub mod config;
pub mod context;
pub mod db;
pub mod directory;
pub mod error;
pub mod intake;
pub mod models;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod state;
pub mod storage;
pub mod workflow;
