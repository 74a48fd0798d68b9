pub mod admin;
pub mod auth;
pub mod cache;
pub mod config;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod pages;
pub mod parent;
pub mod render;
pub mod routes;
pub mod student;
pub mod teacher;
