pub mod backoff;
pub mod connection_handler;
pub mod listener;
