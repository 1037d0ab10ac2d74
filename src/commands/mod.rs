//! Handlers behind the CLI subcommands other than `run` and `daemon`.

pub mod config_show;
pub mod doctor;
pub mod init;
pub mod schedule;
