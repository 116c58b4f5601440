//! Print an Argon2 hash for RUMORMILL_ADMIN__PASSWORD_HASH.

use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};

fn main() -> anyhow::Result<()> {
    let password = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: hash_password <password>"))?;
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("Failed to hash password: {}", err))?
        .to_string();
    println!("{}", hash);
    Ok(())
}
