//! Password hashing utility for usermod
//!
//! Generates an Argon2id PHC string with the same parameters the server
//! uses, for seeding accounts without going through registration.
//!
//! Usage:
//!   cargo run --bin hash-password
//!   cargo run --bin hash-password "MySecurePassword123!"
//!
//! The hash column is BYTEA; the SQL printed below stores the PHC string's
//! UTF-8 bytes, which is what the server writes.

use std::env;
use std::io::{self, Write};

use usermod_api::auth::{validate_password, PasswordVault};

fn main() -> anyhow::Result<()> {
    let password = if let Some(pwd) = env::args().nth(1) {
        pwd
    } else {
        // Read from stdin so the password does not show in the process list
        print!("Enter password to hash: ");
        io::stdout().flush()?;

        let mut password = String::new();
        io::stdin().read_line(&mut password)?;
        password.trim_end_matches(['\r', '\n']).to_string()
    };

    if let Err(e) = validate_password(&password) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let hash = PasswordVault::default().hash(&password)?;
    let phc = String::from_utf8(hash)?;

    println!("\n===========================================");
    println!("Password Hash (Argon2id):");
    println!("===========================================");
    println!("{}", phc);
    println!("===========================================\n");

    println!("Example SQL:");
    println!(
        "UPDATE users SET password_hash = convert_to('{}', 'UTF8') WHERE lower(email) = 'admin@example.com';",
        phc
    );

    Ok(())
}
