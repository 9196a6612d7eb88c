#![forbid(unsafe_code)]

//! Startup safety checks for the backend binary.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Refuses to start when invoked as root. The backend creates the database
/// file under the invoking user, and a root-owned warehouse breaks every
/// later unprivileged run.
pub fn ensure_unprivileged(process: &str) -> Result<()> {
    ensure_unprivileged_uid(Uid::current(), process)
}

fn ensure_unprivileged_uid(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!("{process} refuses to run as root; start it as a regular user");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_uid_is_accepted() {
        assert!(ensure_unprivileged_uid(Uid::from_raw(1000), "backend").is_ok());
    }

    #[test]
    fn root_uid_is_rejected() {
        let err = ensure_unprivileged_uid(Uid::from_raw(0), "backend").unwrap_err();
        assert!(err.to_string().contains("refuses to run as root"));
    }
}
