pub mod connection;
pub mod lane;
pub mod protocol;
pub mod routes;
pub mod server;
pub mod sink;
pub mod state;

pub use server::GatewayServer;
