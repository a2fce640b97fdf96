//! SQL Anywhere connection options.
//!
//! Options use the engine's own `key=value;key=value` syntax and are passed
//! to the native library as written. The driver only appends the options it
//! depends on (see [`FORCED_OPTIONS`]).

use regex::Regex;
use sqlany_core::Error;
use sqlany_core::Result;
use sqlany_core::error::ConfigError;
use std::ffi::CString;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Options appended to every connect string. Column and parameter strings
/// are exchanged as UTF-8.
pub const FORCED_OPTIONS: &str = "cs=utf8";

static PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*([^=;]+?)\s*=([^;]*)").unwrap_or_else(|e| panic!("invalid pair pattern: {e}"))
});

const SECRET_KEYS: &[&str] = &["pwd", "password"];

/// A connection option string.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    raw: String,
}

impl ConnectOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an option string. It is kept exactly as given.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Set the user ID (`UID`).
    pub fn user(self, user: impl Into<String>) -> Self {
        self.set("UID", user)
    }

    /// Set the password (`PWD`).
    pub fn password(self, password: impl Into<String>) -> Self {
        self.set("PWD", password)
    }

    /// Set the database server name (`ServerName`).
    pub fn server(self, server: impl Into<String>) -> Self {
        self.set("ServerName", server)
    }

    /// Set the database name (`DatabaseName`).
    pub fn database_name(self, name: impl Into<String>) -> Self {
        self.set("DatabaseName", name)
    }

    /// Set the database file to start or connect to (`DatabaseFile`).
    pub fn database_file(self, path: impl Into<String>) -> Self {
        self.set("DatabaseFile", path)
    }

    /// Set the host and optional port (`Host`), e.g. `db1:2638`.
    pub fn host(self, host: impl Into<String>) -> Self {
        self.set("Host", host)
    }

    /// Set an arbitrary option, replacing an existing one with the same key.
    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        let mut replaced = false;
        let segments: Vec<String> = self
            .raw
            .split(';')
            .map(|segment| match segment.split_once('=') {
                Some((k, _)) if !replaced && k.trim().eq_ignore_ascii_case(key) => {
                    replaced = true;
                    format!("{key}={value}")
                }
                _ => segment.to_string(),
            })
            .collect();

        if replaced {
            self.raw = segments.join(";");
        } else {
            if !self.raw.is_empty() && !self.raw.ends_with(';') {
                self.raw.push(';');
            }
            self.raw.push_str(key);
            self.raw.push('=');
            self.raw.push_str(&value);
        }
        self
    }

    /// Look up an option. Keys compare case-insensitively; the first match wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// All `key=value` pairs in order. Segments without `=` are skipped.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        PAIR.captures_iter(&self.raw).filter_map(|caps| {
            let key = caps.get(1)?.as_str();
            let value = caps.get(2)?.as_str().trim();
            Some((key, value))
        })
    }

    /// The option string as given or built.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The string handed to the native connect call: the options followed
    /// by [`FORCED_OPTIONS`].
    pub fn native_string(&self) -> String {
        let mut out = self.raw.clone();
        if !out.is_empty() && !out.ends_with(';') {
            out.push(';');
        }
        out.push_str(FORCED_OPTIONS);
        out
    }

    /// [`native_string`](Self::native_string) as a C string.
    #[allow(clippy::result_large_err)]
    pub fn to_native(&self) -> Result<CString> {
        to_c_string(&self.native_string(), "connection options")
    }
}

impl FromStr for ConnectOptions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.contains('\0') {
            return Err(nul_error("connection options"));
        }
        Ok(Self::from_raw(s))
    }
}

impl From<&str> for ConnectOptions {
    fn from(s: &str) -> Self {
        Self::from_raw(s)
    }
}

impl From<String> for ConnectOptions {
    fn from(s: String) -> Self {
        Self::from_raw(s)
    }
}

impl fmt::Display for ConnectOptions {
    /// Renders the options with passwords masked.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in self.pairs() {
            if !first {
                f.write_str(";")?;
            }
            first = false;
            if SECRET_KEYS.iter().any(|s| key.eq_ignore_ascii_case(s)) {
                write!(f, "{key}=***")?;
            } else {
                write!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectOptions").field(&self.to_string()).finish()
    }
}

fn nul_error(what: &str) -> Error {
    Error::Config(ConfigError {
        message: format!("{what} contain an interior NUL byte"),
    })
}

/// Convert text bound for the native library, rejecting interior NULs.
#[allow(clippy::result_large_err)]
pub(crate) fn to_c_string(s: &str, what: &str) -> Result<CString> {
    CString::new(s).map_err(|_| nul_error(what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_kept_verbatim() {
        let raw = "UID=dba; PWD=sql ;ServerName=demo";
        let opts = ConnectOptions::from_raw(raw);
        assert_eq!(opts.as_str(), raw);
        assert_eq!(opts.native_string(), format!("{raw};cs=utf8"));
    }

    #[test]
    fn test_native_string_separators() {
        assert_eq!(ConnectOptions::new().native_string(), "cs=utf8");
        assert_eq!(
            ConnectOptions::from_raw("uid=dba;").native_string(),
            "uid=dba;cs=utf8"
        );
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let opts = ConnectOptions::from_raw("UID=dba;pwd=sql;  Host = db1:2638 ;junk");
        assert_eq!(opts.get("uid"), Some("dba"));
        assert_eq!(opts.get("PWD"), Some("sql"));
        assert_eq!(opts.get("host"), Some("db1:2638"));
        assert_eq!(opts.get("junk"), None);
        assert_eq!(opts.pairs().count(), 3);
    }

    #[test]
    fn test_builder() {
        let opts = ConnectOptions::new()
            .user("dba")
            .password("sql")
            .server("demo")
            .database_name("demo_db")
            .database_file("/tmp/demo.db")
            .host("localhost:2638");
        assert_eq!(
            opts.as_str(),
            "UID=dba;PWD=sql;ServerName=demo;DatabaseName=demo_db;DatabaseFile=/tmp/demo.db;Host=localhost:2638"
        );
    }

    #[test]
    fn test_set_replaces_existing_key() {
        let opts = ConnectOptions::from_raw("uid=a;pwd=b").set("UID", "c");
        assert_eq!(opts.as_str(), "UID=c;pwd=b");
        assert_eq!(opts.get("uid"), Some("c"));
    }

    #[test]
    fn test_display_masks_password() {
        let opts = ConnectOptions::from_raw("uid=dba;pwd=secret");
        assert_eq!(opts.to_string(), "uid=dba;pwd=***");
        assert!(!format!("{opts:?}").contains("secret"));
    }

    #[test]
    fn test_nul_rejected() {
        assert!(matches!(
            "uid=a\0b".parse::<ConnectOptions>(),
            Err(Error::Config(_))
        ));
        let opts = ConnectOptions::from_raw("uid=a\0b");
        assert!(matches!(opts.to_native(), Err(Error::Config(_))));
        assert_eq!(
            ConnectOptions::from_raw("uid=a").to_native().unwrap().as_bytes(),
            b"uid=a;cs=utf8"
        );
    }
}
