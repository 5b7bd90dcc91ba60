use clap::Subcommand;

use super::config::ConfigArgs;
use super::query::{RateArgs, TicketArgs};
use super::session::SessionArgs;

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Latest ticket id for a customer and signature
    Ticket(TicketArgs),

    /// Delivery success rate for a customer over a reporting window
    Rate(RateArgs),

    /// Inspect or clear the stored SSO session
    Session(SessionArgs),

    /// Show, validate or locate the configuration
    Config(ConfigArgs),
}
