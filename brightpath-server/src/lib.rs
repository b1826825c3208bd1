pub mod media;
pub mod server;
pub mod storage;
