pub mod macros;

pub mod chains;
pub mod config;
pub mod helpers;
pub mod logger;
pub mod rpc;
pub mod validator;
