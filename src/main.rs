use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

mod args;
use args::Args;

mod backend;
use backend::Backend;

mod cookies;
mod guard;
mod identity;
mod password;
mod token;
mod user;
mod views;

mod guidepost;
use guidepost::{GuidePost, SessionConfig};

mod routes;

mod time;

#[cfg(test)]
mod mock;

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let addr = match args.addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("invalid listen address: {e}");
            return ExitCode::FAILURE;
        }
    };

    let backend = Backend::new(args.data_dir()).await;

    // one key per process: restarting logs everybody out
    let key = token::SigningKey::generate();
    let hashing = password::HashPool::new(
        password::PasswordHasher::new(args.bcrypt_cost()),
        args.hash_workers(),
    );
    let session = SessionConfig {
        ttl: args.token_ttl(),
        secure: args.secure(),
    };

    let guide = Arc::new(GuidePost::new(backend, key, hashing, session));

    info!("listening on {addr}");
    warp::serve(routes::routes(guide)).run(addr).await;

    ExitCode::SUCCESS
}
