/// Interactive password prompt.
use anyhow::{bail, Context, Result};
use console::Term;

/// Ask for the Redis password on the controlling terminal, without echo.
///
/// Fails if stderr is not attached to a terminal, since nobody could answer.
pub fn ask_password() -> Result<String> {
    let term = Term::stderr();
    if !term.is_term() {
        bail!("--ask-password needs an interactive terminal");
    }
    term.write_str("Password: ")
        .context("failed to write the password prompt")?;
    term.read_secure_line()
        .context("failed to read the password")
}
