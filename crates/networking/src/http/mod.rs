//! HTTP client for the Supabase REST (PostgREST) API

mod client;

pub use client::*;
