pub mod archive;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod forms;
pub mod github;
pub mod images;
pub mod lifecycle;
pub mod routes;
pub mod state;
pub mod storage;
pub mod templates;
