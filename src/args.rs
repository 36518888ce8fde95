use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use clap::Parser;

#[derive(Parser, Debug)]
pub struct Args {
    /// Whether clients connect over https.
    /// If so, the access_token cookie is sent as a secure cookie.
    #[arg(short, long)]
    secure: bool,

    /// The address to listen on. By default only the
    /// IPv4 loopback is used.
    #[arg(short, long)]
    address: Option<String>,

    /// The port to listen on.
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Where the user store lives.
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Lifetime of a login, in seconds. Also the cookie's max-age.
    #[arg(long, default_value_t = 86_400)]
    token_ttl: u32,

    /// bcrypt work factor for newly hashed passwords.
    #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
    bcrypt_cost: u32,

    /// How many password hashes may be computed at once.
    #[arg(long, default_value_t = 4)]
    hash_workers: usize,
}

impl Args {
    pub fn addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.address
            .as_deref()
            .unwrap_or("127.0.0.1")
            .parse()
            .map(|addr: IpAddr| (addr, self.port).into())
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn token_ttl(&self) -> ::time::Duration {
        ::time::Duration::seconds(self.token_ttl.into())
    }

    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    pub fn hash_workers(&self) -> usize {
        self.hash_workers
    }
}
