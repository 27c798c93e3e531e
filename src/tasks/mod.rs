// src/tasks/mod.rs

//! Protocol tasks shipped with the server.

pub mod chat;

pub use chat::ChatTask;
