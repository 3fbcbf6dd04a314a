pub mod http;
pub mod replies;
pub mod router;
pub mod server;
pub mod subsystems;
pub mod testing;
