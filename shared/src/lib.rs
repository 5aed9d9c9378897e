//! Types shared between the auth server and anything that talks to it:
//! token claims, login wire types, and the server configuration model.

pub mod config;
pub mod types;
