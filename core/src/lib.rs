pub mod advice;
pub mod db;
pub mod export;
pub mod gemini;
pub mod identity;
pub mod models;
pub mod reconcile;
pub mod remote;
pub mod service;
pub mod session;
pub mod stats;
pub mod sync;
