use clap::Parser;
use std::net::SocketAddr;

/// Command-line surface for the HTTP server (spec's ambient "configuration"
/// section). Everything that tunes the storage engine itself comes from
/// `logcar_core::Config::from_env()` — this only carries what's specific to
/// standing up the listener and guarding it.
#[derive(clap::Parser, Clone)]
pub struct Args {
    #[clap(default_value = "0.0.0.0:2003")]
    pub address: SocketAddr,

    /// Comma-separated bearer tokens accepted by every `/records` route.
    /// Falls back to `LOGCAR_API_TOKENS` when not passed on the command line.
    #[clap(long = "tokens", env = "LOGCAR_API_TOKENS", value_delimiter = ',')]
    pub tokens: Vec<String>,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }
}
