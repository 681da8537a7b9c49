//! Tinycraft backend
//!
//! Accetta richieste di modifica (testo o immagini), le esegue in background e
//! permette ai client di seguire l'avanzamento via polling o SSE.

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;
