//! Command: print the version.

/// Version string, from `git describe` when built from a checkout.
#[must_use]
pub fn current() -> &'static str {
    option_env!("FAILOVER_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the version to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    println!("failover-installer {}", current());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_is_not_empty() {
        assert!(!current().is_empty());
    }
}
