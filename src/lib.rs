//! Social network REST backend.
//!
//! Users, posts, comments, likes, reposts, bookmarks and sessions over SQLite,
//! with images in S3 and a background job that keeps post trending scores fresh.

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod service;
pub mod storage;
pub mod trending;
pub mod web;
