//! Archival directory templates and no-clobber moves
//!
//! Templates may contain `$YYYY`, `$MM`, `$M`, `$dd` and `$d`, replaced with
//! the local date. Zero-padded tokens are substituted before their
//! single-letter prefixes.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use tokio::fs::{self, OpenOptions};

pub fn resolve_template(template: &str, date: NaiveDate) -> String {
    let tokens: [(&str, String); 5] = [
        ("$YYYY", format!("{:04}", date.year())),
        ("$MM", format!("{:02}", date.month())),
        ("$dd", format!("{:02}", date.day())),
        ("$M", date.month().to_string()),
        ("$d", date.day().to_string()),
    ];

    tokens
        .iter()
        .fold(template.to_string(), |acc, (token, value)| acc.replace(token, value))
}

/// Archival directory for today's date
pub fn resolve_dir(template: &str) -> PathBuf {
    PathBuf::from(resolve_template(template, chrono::Local::now().date_naive()))
}

/// Reduces an uploaded file name to its final path component.
///
/// Returns `None` for names that would not resolve to a file inside the
/// archival directory (empty, `..`, trailing separator).
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.ends_with('/') || trimmed.ends_with('\\') {
        return None;
    }
    let last = trimmed.rsplit(['/', '\\']).next()?;
    Path::new(last)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

/// Moves `from` to `to`, failing with `AlreadyExists` instead of replacing
/// an existing destination.
///
/// The destination is claimed with a hard link, which fails atomically when
/// the name is taken. Across filesystems the file is copied into a freshly
/// created destination instead.
pub async fn move_no_clobber(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    match fs::hard_link(from, to).await {
        Ok(()) => fs::remove_file(from).await,
        Err(e) if matches!(e.kind(), io::ErrorKind::CrossesDevices | io::ErrorKind::Unsupported) => {
            copy_no_clobber(from, to).await?;
            fs::remove_file(from).await
        }
        Err(e) => Err(e),
    }
}

/// Copies into a destination that must not exist yet. A failed copy removes
/// the partial destination it created.
async fn copy_no_clobber(from: &Path, to: &Path) -> io::Result<()> {
    let mut source = fs::File::open(from).await?;
    let mut dest = OpenOptions::new().write(true).create_new(true).open(to).await?;

    let copied = async {
        tokio::io::copy(&mut source, &mut dest).await?;
        dest.sync_all().await
    }
    .await;

    if let Err(e) = copied {
        drop(dest);
        if let Err(cleanup) = fs::remove_file(to).await {
            tracing::warn!(path = %to.display(), error = %cleanup, "Failed to remove partial archive copy");
        }
        return Err(e);
    }
    Ok(())
}
