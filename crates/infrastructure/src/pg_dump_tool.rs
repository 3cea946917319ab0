//! External PostgreSQL tooling driven as subprocesses.
//!
//! Every invocation uses an argument vector, never a shell, and the
//! password only ever reaches the child through its environment.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use casekeep_application::DumpTool;
use casekeep_core::{AppError, AppResult};

/// Connection settings for the external PostgreSQL client tools.
///
/// All fields are required; there are no defaults. Construction fails fast
/// on a missing value, and the identifier fields are restricted to
/// `[A-Za-z0-9._-]` before any subprocess is spawned.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    host: String,
    port: String,
    name: String,
    user: String,
    password: String,
}

impl DatabaseSettings {
    /// Creates validated settings.
    pub fn new(
        host: impl Into<String>,
        port: impl Into<String>,
        name: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> AppResult<Self> {
        let host = host.into();
        let port = port.into();
        let name = name.into();
        let user = user.into();
        let password = password.into();

        validate_identifier("host", host.as_str())?;
        validate_identifier("port", port.as_str())?;
        validate_identifier("name", name.as_str())?;
        validate_identifier("user", user.as_str())?;
        if password.is_empty() {
            return Err(AppError::Configuration(
                "database password must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            host,
            port,
            name,
            user,
            password,
        })
    }

    /// Returns the target database name.
    #[must_use]
    pub fn database_name(&self) -> &str {
        self.name.as_str()
    }
}

fn validate_identifier(field: &str, value: &str) -> AppResult<()> {
    if value.is_empty() {
        return Err(AppError::Configuration(format!(
            "database {field} must not be empty"
        )));
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(AppError::Validation(format!(
            "database {field} '{value}' contains characters outside [A-Za-z0-9._-]"
        )));
    }

    Ok(())
}

/// [`DumpTool`] adapter over `pg_dump`, `dropdb`, `createdb`, and `psql`.
#[derive(Debug, Clone)]
pub struct PgDumpTool {
    settings: DatabaseSettings,
}

impl PgDumpTool {
    /// Creates the adapter from validated settings.
    #[must_use]
    pub fn new(settings: DatabaseSettings) -> Self {
        Self { settings }
    }

    async fn run_tool(&self, program: &str, args: &[&str]) -> AppResult<()> {
        debug!(program, "running database tool");
        let output = Command::new(program)
            .args(args)
            .env("PGPASSWORD", self.settings.password.as_str())
            .output()
            .await
            .map_err(|error| {
                AppError::ExternalTool(format!("failed to run {program}: {error}"))
            })?;

        let stderr = String::from_utf8_lossy(output.stderr.as_slice());
        if !output.status.success() {
            return Err(AppError::ExternalTool(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        // The tools exit zero on some failures they only report on stderr.
        if stderr.contains("ERROR") || stderr.contains("FATAL") {
            return Err(AppError::ExternalTool(format!(
                "{program} reported errors: {}",
                stderr.trim()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl DumpTool for PgDumpTool {
    async fn dump_to(&self, out: &Path) -> AppResult<u64> {
        let out_arg = out.display().to_string();
        self.run_tool(
            "pg_dump",
            &[
                "-h",
                self.settings.host.as_str(),
                "-p",
                self.settings.port.as_str(),
                "-U",
                self.settings.user.as_str(),
                "-d",
                self.settings.name.as_str(),
                "-w",
                "-f",
                out_arg.as_str(),
            ],
        )
        .await?;

        let size = tokio::fs::metadata(out)
            .await
            .map_err(|error| {
                AppError::Filesystem(format!(
                    "failed to stat dump file '{}': {error}",
                    out.display()
                ))
            })?
            .len();

        info!(dump = %out.display(), size_bytes = size, "database dump written");
        Ok(size)
    }

    async fn recreate_database(&self) -> AppResult<()> {
        info!(
            database = self.settings.name.as_str(),
            "dropping and recreating database"
        );

        self.run_tool(
            "dropdb",
            &[
                "-h",
                self.settings.host.as_str(),
                "-p",
                self.settings.port.as_str(),
                "-U",
                self.settings.user.as_str(),
                "-w",
                "--if-exists",
                self.settings.name.as_str(),
            ],
        )
        .await?;

        self.run_tool(
            "createdb",
            &[
                "-h",
                self.settings.host.as_str(),
                "-p",
                self.settings.port.as_str(),
                "-U",
                self.settings.user.as_str(),
                "-w",
                self.settings.name.as_str(),
            ],
        )
        .await?;

        Ok(())
    }

    async fn restore_from(&self, dump: &Path) -> AppResult<()> {
        let dump_arg = dump.display().to_string();
        self.run_tool(
            "psql",
            &[
                "-h",
                self.settings.host.as_str(),
                "-p",
                self.settings.port.as_str(),
                "-U",
                self.settings.user.as_str(),
                "-d",
                self.settings.name.as_str(),
                "-w",
                "-X",
                "-q",
                "-v",
                "ON_ERROR_STOP=1",
                "-f",
                dump_arg.as_str(),
            ],
        )
        .await?;

        info!(dump = %dump.display(), "dump loaded into database");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use casekeep_core::AppError;

    use super::DatabaseSettings;

    #[test]
    fn accepts_identifiers_within_the_allow_list() {
        let settings = DatabaseSettings::new(
            "db-01.internal",
            "5432",
            "casekeep_prod",
            "casekeep_svc",
            "s3cret",
        );
        assert!(settings.is_ok());
    }

    #[test]
    fn rejects_shell_metacharacters_in_identifiers() {
        for value in ["db;DROP TABLE cases", "host name", "db`whoami`", "a|b"] {
            let settings =
                DatabaseSettings::new("localhost", "5432", value, "svc", "s3cret");
            assert!(
                matches!(settings, Err(AppError::Validation(_))),
                "expected '{value}' to be rejected"
            );
        }
    }

    #[test]
    fn missing_values_fail_fast_as_configuration_errors() {
        let missing_host = DatabaseSettings::new("", "5432", "db", "svc", "s3cret");
        assert!(matches!(missing_host, Err(AppError::Configuration(_))));

        let missing_password = DatabaseSettings::new("localhost", "5432", "db", "svc", "");
        assert!(matches!(missing_password, Err(AppError::Configuration(_))));
    }
}
