//! Command line definition.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BUILD_GIT_SHA"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Debug, Parser)]
#[command(name = "puredrop", author, version, long_version = LONG_VERSION, about)]
pub struct Cli {
    /// Directory holding the session database, config and logs.
    #[arg(long, global = true, env = "PUREDROP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Configuration file (defaults to <data-dir>/config.json).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `info,puredrop_lib=trace`.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in with mobile number and password.
    Login {
        mobile: String,
        #[arg(long, env = "PUREDROP_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create a customer account.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        mobile: String,
        #[arg(long)]
        address: String,
        #[arg(long, env = "PUREDROP_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Defaults to the password when omitted.
        #[arg(long)]
        confirm_password: Option<String>,
    },
    /// Sign out and forget the stored session.
    Logout,
    /// Show the signed-in account.
    Whoami,
    /// Version, build and local paths.
    About,

    /// Place a same-day order.
    Order(OrderArgs),
    /// Schedule an order for a later date.
    Advance {
        /// Delivery date, YYYY-MM-DD, tomorrow or later.
        #[arg(long)]
        date: String,
        #[command(flatten)]
        order: OrderArgs,
    },
    /// Your past orders.
    History {
        #[command(flatten)]
        filter: HistoryArgs,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Check a `lat,lng` against the delivery area and resolve its address.
    Locate {
        #[arg(allow_hyphen_values = true)]
        coordinate: String,
    },
    /// Search an address and check it against the delivery area.
    Search { query: Vec<String> },

    /// Today's orders, refreshed until interrupted.
    Dashboard {
        /// Print one snapshot and exit.
        #[arg(long)]
        once: bool,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// All orders with filters.
    Orders {
        /// pending, completed, cancelled or all.
        #[arg(long)]
        status: Option<String>,
        /// daily, advance or all.
        #[arg(long)]
        booking_type: Option<String>,
        /// Created on, YYYY-MM-DD.
        #[arg(long)]
        date: Option<String>,
        /// Name or mobile contains.
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Mark a pending order delivered.
    Complete { order_id: i64 },
    /// Cancel a pending order.
    Cancel { order_id: i64 },
    /// Quantities and revenue per week, month or year.
    Performance {
        #[arg(long, default_value = "month")]
        period: String,
    },
    /// Orders placed from a mobile number.
    Users {
        mobile: String,
        #[command(flatten)]
        filter: HistoryArgs,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Block a customer account.
    Block { mobile: String },
    /// Re-activate a customer account.
    Activate { mobile: String },
    /// Save a customer's orders report as text.
    Report {
        mobile: String,
        #[command(flatten)]
        filter: HistoryArgs,
        /// Output directory (defaults to the current one).
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Follow the route to an order's delivery point.
    Track {
        order_id: i64,
        /// Delivery point to use when the order location lookup fails.
        #[arg(long, allow_hyphen_values = true)]
        destination: Option<String>,
        /// Fixed admin position; otherwise `lat,lng` lines are read from stdin.
        #[arg(long, allow_hyphen_values = true)]
        from: Option<String>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct OrderArgs {
    #[arg(long, default_value_t = 0)]
    pub normal: u32,
    #[arg(long, default_value_t = 0)]
    pub cool: u32,
    /// Defaults to the signed-in name.
    #[arg(long)]
    pub name: Option<String>,
    /// Defaults to the signed-in mobile.
    #[arg(long)]
    pub mobile: Option<String>,
    /// Typed delivery address.
    #[arg(long)]
    pub address: Option<String>,
    /// Map location as `lat,lng`.
    #[arg(long, allow_hyphen_values = true)]
    pub at: Option<String>,
    /// Pick the location by address search instead of `--at`.
    #[arg(long, conflicts_with = "at")]
    pub search: Option<String>,
    /// Skip the confirmation prompt.
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Debug, Clone, Args)]
pub struct HistoryArgs {
    /// From date, YYYY-MM-DD (inclusive).
    #[arg(long)]
    pub from: Option<String>,
    /// To date, YYYY-MM-DD (inclusive).
    #[arg(long)]
    pub to: Option<String>,
    /// pending, completed, cancelled or all.
    #[arg(long)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_advance_order_with_flattened_args() {
        let cli = Cli::try_parse_from([
            "puredrop", "advance", "--date", "2026-10-20", "--normal", "2", "--at", "16.53,81.97",
            "-y",
        ])
        .unwrap();
        match cli.command {
            Command::Advance { date, order } => {
                assert_eq!(date, "2026-10-20");
                assert_eq!(order.normal, 2);
                assert_eq!(order.at.as_deref(), Some("16.53,81.97"));
                assert!(order.yes);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["puredrop", "orders", "--status", "pending", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Command::Orders { page: 1, .. }));
    }
}
