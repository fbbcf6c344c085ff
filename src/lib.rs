pub mod client;
pub mod comments;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod markdown;
pub mod message;
pub mod relay;
pub mod text;
