#![allow(dead_code)]

mod test_app;
mod test_server;

pub use test_app::TestApp;
pub use test_server::TestServer;
