//! Command queue between the UI thread and the backend worker.

pub mod commands;
