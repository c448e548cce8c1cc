pub mod chat;
pub mod config_cmd;
pub mod history;
pub mod init_db;
pub mod memories;
pub mod protocols;
pub mod serve;
