use std::{net::IpAddr, path::PathBuf};

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "atm-server")]
#[command(about = "Serves balance queries and withdrawals to ATM terminals")]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, env = "ATM_PORT", default_value_t = 2525)]
    pub port: u16,

    /// Address to listen on
    #[arg(short, long, env = "ATM_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Path of the persisted ledger
    #[arg(short, long, env = "ATM_LEDGER", default_value = "users.json")]
    pub ledger: PathBuf,

    /// Maximum number of terminals served at once, unbounded when unset
    #[arg(long, env = "ATM_MAX_SESSIONS")]
    pub max_sessions: Option<usize>,
}
