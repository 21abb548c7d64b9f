//! Password hashing for back office configuration.
//!
//! # Usage
//!
//! ```bash
//! echo 'the shared password' | fm-cli hash-password
//! ```
//!
//! The password is read from stdin so it never shows up in shell history or
//! the process list. Put the printed hash in
//! `FRESH_MARKET_ADMIN_PASSWORD_HASH`.

use std::io::BufRead;

use fresh_market_storefront::auth::hash_password;
use secrecy::{ExposeSecret, SecretString};

use super::CommandError;

/// Read one line from stdin and print its Argon2 hash.
///
/// # Errors
///
/// Returns error if stdin cannot be read or the password is too weak.
pub fn hash_from_stdin() -> Result<(), CommandError> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = SecretString::from(line.trim_end_matches(['\r', '\n']).to_string());

    let hash = hash_password(password.expose_secret())?;
    #[allow(clippy::print_stdout)]
    {
        println!("{}", hash.as_str());
    }
    Ok(())
}
