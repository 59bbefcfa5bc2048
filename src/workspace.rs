//! Per-workspace directory layout.
//!
//! ```text
//! R/manifest/       the three sub-documents, encoded
//! R/package/main/   currently live package files
//! R/package/temp/   in-flight downloads for next package
//! R/resources/main/ currently live resources
//! R/resources/temp/ in-flight resource downloads
//! R/backup/main/    snapshot taken before promote (for rollback)
//! R/backup/temp/    backup scratch
//! R/blacklist.json  persisted blacklist of failed package versions
//! ```

pub const PACKAGE_MAIN: &str = "package/main";
pub const PACKAGE_TEMP: &str = "package/temp";
pub const RESOURCES_MAIN: &str = "resources/main";
pub const RESOURCES_TEMP: &str = "resources/temp";
pub const BACKUP_MAIN: &str = "backup/main";
pub const BACKUP_TEMP: &str = "backup/temp";

/// Default root for a workspace: `<data_dir>/airboot/<namespace>`.
/// Only used by the demo binary and the host facade's default namespace
/// resolution; library callers may always supply an explicit root.
pub fn default_root(namespace: &str) -> std::path::PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("airboot")
        .join(sanitize_namespace(namespace))
}

fn sanitize_namespace(namespace: &str) -> String {
    namespace
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
