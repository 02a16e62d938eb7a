//! Utility helpers shared by collectors and storage.

/// Builds a libpq-style connection string from the standard environment variables.
///
/// - PGHOST (default: localhost)
/// - PGPORT (default: 5432)
/// - PGUSER (default: $USER)
/// - PGPASSWORD (default: empty)
/// - PGDATABASE (default: same as PGUSER)
///
/// Returns the name of the missing variable if no user can be determined.
pub fn pg_connection_string_from_env() -> Result<String, &'static str> {
    let user = std::env::var("PGUSER")
        .or_else(|_| std::env::var("USER"))
        .map_err(|_| "PGUSER or USER")?;

    let host = std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("PGPORT").unwrap_or_else(|_| "5432".to_string());
    let password = std::env::var("PGPASSWORD").unwrap_or_default();
    let database = std::env::var("PGDATABASE").unwrap_or_else(|_| user.clone());

    Ok(build_connection_string(
        &host, &port, &user, &password, &database,
    ))
}

fn build_connection_string(
    host: &str,
    port: &str,
    user: &str,
    password: &str,
    database: &str,
) -> String {
    if password.is_empty() {
        format!(
            "host={} port={} user={} dbname={}",
            host, port, user, database
        )
    } else {
        format!(
            "host={} port={} user={} password={} dbname={}",
            host, port, user, password, database
        )
    }
}

/// Formats PostgreSQL error message for display.
pub fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else if msg.contains("does not exist") {
            msg.split("FATAL:")
                .last()
                .unwrap_or(&msg)
                .trim()
                .to_string()
        } else {
            msg
        }
    }
}

/// Truncates a string to at most `max_chars` characters (not bytes).
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Prints a PostgreSQL connection warning to stderr with ANSI colors.
pub fn print_pg_warning(error: &str) {
    const RED: &str = "\x1b[1;31m";
    const YELLOW: &str = "\x1b[33m";
    const RESET: &str = "\x1b[0m";

    eprintln!("{RED}PostgreSQL: {error}{RESET}");
    eprintln!();
    eprintln!("{YELLOW}  Configure connection with environment variables:");
    eprintln!("    export PGHOST=localhost");
    eprintln!("    export PGPORT=5432");
    eprintln!("    export PGUSER=odoo");
    eprintln!("    export PGPASSWORD=secret");
    eprintln!("    export PGDATABASE=odoo");
    eprintln!();
    eprintln!("  Database-backed samplers will report failures until it is reachable.{RESET}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_omits_empty_password() {
        assert_eq!(
            build_connection_string("db", "5433", "odoo", "", "prod"),
            "host=db port=5433 user=odoo dbname=prod"
        );
        assert_eq!(
            build_connection_string("db", "5432", "odoo", "pw", "prod"),
            "host=db port=5432 user=odoo password=pw dbname=prod"
        );
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 5), "abc");
        // Multi-byte characters must not be split.
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("", 0), "");
    }
}
