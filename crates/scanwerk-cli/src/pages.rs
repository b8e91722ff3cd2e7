// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Saving scanned pages to disk.
//
// Pages are named `page<N>.<ext>` with the first N that is not taken yet, and
// are streamed into a `.partial` file that is renamed into place once the
// whole page has arrived. An interrupted scan never leaves a truncated page
// under a final name.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use scanwerk_core::error::Result;
use scanwerk_core::types::DocumentFormat;
use scanwerk_escl::Page;

/// File extension for `page`, from its `Content-Type` when the device sent a
/// known one, otherwise from the requested format.
pub fn page_extension(page: &Page, requested: DocumentFormat) -> &'static str {
    page.content_type()
        .and_then(|ct| ct.split(';').next())
        .and_then(|mime| DocumentFormat::from_mime_type(mime.trim()))
        .unwrap_or(requested)
        .extension()
}

/// First `page<N>.<ext>` in `dir` with `N >= start` that does not exist yet.
pub async fn next_free_path(dir: &Path, start: u32, ext: &str) -> Result<(u32, PathBuf)> {
    let mut n = start.max(1);
    loop {
        let candidate = dir.join(format!("page{n}.{ext}"));
        if !fs::try_exists(&candidate).await? {
            return Ok((n, candidate));
        }
        n += 1;
    }
}

/// Stream `page` into `path`, renaming a temporary file into place at the end.
pub async fn write_page(page: &mut Page, path: &Path) -> Result<u64> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    match copy_into(page, &partial).await {
        Ok(written) => {
            fs::rename(&partial, path).await?;
            debug!(path = %path.display(), bytes = written, "page saved");
            Ok(written)
        }
        Err(err) => {
            if let Err(cleanup) = fs::remove_file(&partial).await {
                warn!(path = %partial.display(), error = %cleanup, "could not remove partial page");
            }
            Err(err)
        }
    }
}

async fn copy_into(page: &mut Page, partial: &Path) -> Result<u64> {
    let mut file = fs::File::create(partial).await?;
    let written = page.copy_to(&mut file).await?;
    file.sync_all().await?;
    Ok(written)
}
