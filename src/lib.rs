//! Postboard - A small blogging platform
//!
//! Users publish short posts, optionally filed under a group, comment on
//! each other's posts and follow authors to get a personalized feed.

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod forms;
pub mod pagination;
pub mod routes;
