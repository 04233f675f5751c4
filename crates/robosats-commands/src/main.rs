//! `manage`: schema management for the RoboSats backend
//!
//! ```bash
//! manage migrate
//! manage migrate api 0037
//! manage showmigrations api
//! manage sqlmigrate api 0038_alter_lnpayment_order_donated
//! manage makemigrations --check
//! ```

use clap::Parser;
use robosats_commands::{Cli, execute};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	execute(Cli::parse()).await
}
