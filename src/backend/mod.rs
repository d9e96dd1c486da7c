//! Backend module - REST client for the subscription persistence API

pub mod auth;
pub mod messages;
pub mod rest;

pub use rest::BackendRestClient;
