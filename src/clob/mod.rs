//! CLOB pricing API client.

pub mod prices;
