use anyhow::Context;
use clap::Args;
use serde_json::json;

use crate::auth::{generate_jwt, Claims};
use crate::cli::OutputFormat;
use crate::config;
use crate::types::Role;

#[derive(Debug, Args)]
pub struct TokenArgs {
    #[arg(long, help = "Principal id (student id for students, staff id otherwise)")]
    pub sub: i64,
    #[arg(long, help = "student, instructor, program_head, dean, registrar, accounting or admin")]
    pub role: Role,
    #[arg(long, default_value = "", help = "Display name carried in the token")]
    pub name: String,
    #[arg(long, help = "Lifetime in hours (defaults to the configured expiry)")]
    pub hours: Option<u64>,
}

pub fn handle(args: TokenArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let security = &config::config().security;
    let hours = args.hours.unwrap_or(security.jwt_expiry_hours);
    let claims = Claims::new(args.sub, args.role, args.name, hours);
    let token = generate_jwt(&claims, &security.jwt_secret).context("cannot mint token")?;

    match output_format {
        OutputFormat::Json => {
            let body = json!({
                "success": true,
                "token": token,
                "role": claims.role,
                "sub": claims.sub,
                "exp": claims.exp
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => println!("{}", token),
    }
    Ok(())
}
