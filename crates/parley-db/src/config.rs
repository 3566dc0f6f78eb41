//! Location and sizing of the run store.
//!
//! The URL itself is chosen by the caller's config chain (the CLI resolves
//! `--database-url`, `PARLEY_DATABASE_URL`, then `[database] url`). This
//! module supplies the local fallback and the URL surgery the bootstrap
//! needs: the database name, the maintenance URL, and a log-safe form.

use std::time::Duration;

const DEFAULT_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL, query parameters included.
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DbConfig {
    /// Used when no URL was configured anywhere.
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/parley";

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// The resolved URL, or [`Self::DEFAULT_URL`] when there is none.
    pub fn or_default(database_url: Option<String>) -> Self {
        Self::new(database_url.unwrap_or_else(|| Self::DEFAULT_URL.to_owned()))
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    /// Last path segment of the URL, without any `?query`.
    ///
    /// `None` when the URL names no database.
    pub fn database_name(&self) -> Option<&str> {
        let parts = split_url(&self.database_url)?;
        Some(parts.name).filter(|name| !name.is_empty())
    }

    /// Whether [`Self::database_name`] is safe to splice into
    /// `CREATE DATABASE`, which takes no bind parameters.
    pub fn has_plain_database_name(&self) -> bool {
        self.database_name().is_some_and(|name| {
            name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
    }

    /// Same server and query parameters, pointed at the `postgres`
    /// maintenance database.
    pub fn maintenance_url(&self) -> String {
        match split_url(&self.database_url) {
            Some(parts) => format!("{}/postgres{}", parts.server, parts.query),
            None => self.database_url.clone(),
        }
    }

    /// The URL with any password replaced by `***`.
    pub fn redacted_url(&self) -> String {
        redact(&self.database_url)
    }
}

struct UrlParts<'a> {
    /// Scheme, credentials, host and port.
    server: &'a str,
    name: &'a str,
    /// `?...` including the question mark, or empty.
    query: &'a str,
}

fn split_url(url: &str) -> Option<UrlParts<'_>> {
    let authority_start = url.find("://").map_or(0, |i| i + 3);
    let (before_query, query) = match url.find('?') {
        Some(q) => (&url[..q], &url[q..]),
        None => (url, ""),
    };
    let slash = before_query[authority_start..].find('/')? + authority_start;
    Some(UrlParts {
        server: &before_query[..slash],
        name: &before_query[slash + 1..],
        query,
    })
}

fn redact(url: &str) -> String {
    let Some(scheme_end) = url.find("://").map(|i| i + 3) else {
        return url.to_owned();
    };
    let authority_end = url[scheme_end..]
        .find(['/', '?'])
        .map_or(url.len(), |i| i + scheme_end);
    let authority = &url[scheme_end..authority_end];
    let Some(at) = authority.rfind('@') else {
        return url.to_owned();
    };
    let Some(colon) = authority[..at].find(':') else {
        return url.to_owned();
    };
    format!(
        "{}{}:***{}",
        &url[..scheme_end],
        &authority[..colon],
        &url[scheme_end + at..]
    )
}
