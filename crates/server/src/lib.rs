#![forbid(unsafe_code)]

mod config;
mod jsonrpc;
mod render;
mod server;
mod tools;

pub use config::ServerConfig;
pub use jsonrpc::{JsonRpcRequest, json_rpc_error, json_rpc_response};
pub use server::{Server, run_stdio};
