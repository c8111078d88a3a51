use anyhow::{Context, Result};
use std::io::{self, Read};

// Decode a bearer token passed as the first argument, or read from stdin.
fn main() -> Result<()> {
    let token = match std::env::args().nth(1) {
        Some(token) if token != "-" => token,
        _ => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read token from stdin")?;
            buffer
        }
    };

    let segments = bff::token::decode_bearer_token(token.trim())?;
    let json = serde_json::to_string_pretty(&segments)?;
    println!("{json}");
    Ok(())
}
