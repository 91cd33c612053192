/// Issue a bearer token for the classbook sync API.
///
/// Usage: JWT_SECRET=... mint-token --user-id ID [--email ADDR] [--ttl SECONDS]
use clap::Parser;

use classbook::services::session::issue_token;

#[derive(Parser)]
#[command(name = "mint-token", about = "Issue a bearer token for the classbook sync API")]
struct Args {
    /// Opaque user id the token is valid for
    #[arg(long)]
    user_id: String,

    #[arg(long)]
    email: Option<String>,

    /// Lifetime in seconds (default 30 days)
    #[arg(long, default_value_t = 30 * 24 * 3600)]
    ttl: u64,
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("Missing required env var: JWT_SECRET"))?;
    let token = issue_token(&args.user_id, args.email.as_deref(), &secret, args.ttl)?;
    println!("{token}");
    Ok(())
}
