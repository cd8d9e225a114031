//! # discobra-rest
//!
//! Thin REST helper over the Discord HTTP API. Each call is stateless: it
//! sends one authenticated request and maps the response status to either a
//! JSON body or a [`RestError`].

pub mod client;
pub mod error;

pub use client::{Method, RestClient, RestResponse};
pub use error::{RestError, RestResult};
