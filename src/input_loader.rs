use std::collections::HashSet;
use std::fs::{self, File};
use std::path::Path;
use log::{info, error, warn};
use serde::Deserialize;
use calamine::{Reader, Xlsx, open_workbook};
use scraper::{Html, Selector};
use url::Url;

use crate::error::InputError;
use crate::session::NavigationDriver;

const TARGET_COLUMNS: [&str; 5] = ["targetid", "target_id", "url", "profile_url", "profile url"];

#[derive(Debug, Deserialize)]
struct TargetRow {
    #[serde(
        rename = "targetId",
        alias = "target_id",
        alias = "url",
        alias = "URL",
        alias = "profile_url",
        alias = "Profile URL"
    )]
    target_id: String,
}

/// Strips query string, fragment, trailing slashes and surrounding whitespace.
/// Returns `None` for blank input.
pub fn canonicalize_target(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let canonical = match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => trimmed.split(['?', '#']).next().unwrap_or(trimmed).to_string(),
    };
    let canonical = canonical.trim_end_matches('/');
    if canonical.is_empty() {
        None
    } else {
        Some(canonical.to_string())
    }
}

/// Canonicalises and drops repeats, keeping first-seen order.
fn dedup_in_order<I: IntoIterator<Item = String>>(raw: I) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|t| canonicalize_target(&t))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Loads targets from a `.txt`, `.csv` or `.xlsx`/`.xls` file.
pub fn load_targets<P: AsRef<Path>>(filename: P) -> Result<Vec<String>, InputError> {
    let path = filename.as_ref();
    if !path.exists() {
        return Err(InputError::NotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let raw = match extension.as_str() {
        "xlsx" | "xls" => load_excel(path)?,
        "csv" => load_csv(path)?,
        _ => load_lines(path)?,
    };

    let targets = dedup_in_order(raw);
    info!("Loaded {} targets from {:?}", targets.len(), path);
    Ok(targets)
}

fn load_lines(path: &Path) -> Result<Vec<String>, InputError> {
    let content = fs::read_to_string(path).map_err(|e| InputError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn load_csv(path: &Path) -> Result<Vec<String>, InputError> {
    let read_err = |reason: String| InputError::Read { path: path.to_path_buf(), reason };
    let file = File::open(path).map_err(|e| read_err(e.to_string()))?;

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = rdr.headers().map_err(|e| read_err(e.to_string()))?;
    if !headers.iter().any(|h| TARGET_COLUMNS.contains(&h.to_lowercase().as_str())) {
        return Err(InputError::MissingColumn {
            path: path.to_path_buf(),
            expected: "targetId, url, profile_url".into(),
        });
    }

    let mut targets = Vec::new();
    for result in rdr.deserialize::<TargetRow>() {
        match result {
            Ok(row) => targets.push(row.target_id),
            Err(e) => error!("Error parsing CSV record: {}", e),
        }
    }
    Ok(targets)
}

fn load_excel(path: &Path) -> Result<Vec<String>, InputError> {
    let mut excel: Xlsx<_> = open_workbook(path).map_err(|e: calamine::XlsxError| InputError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let worksheets = excel.worksheets();
    let Some((_name, range)) = worksheets.first() else {
        return Ok(Vec::new());
    };

    let mut target_idx = None;
    let mut targets = Vec::new();
    for (row_idx, row) in range.rows().enumerate() {
        if row_idx == 0 {
            target_idx = row
                .iter()
                .position(|cell| TARGET_COLUMNS.contains(&cell.to_string().to_lowercase().trim()));
            if target_idx.is_none() {
                return Err(InputError::MissingColumn {
                    path: path.to_path_buf(),
                    expected: "targetId, url, profile_url".into(),
                });
            }
            continue;
        }

        if let Some(cell) = target_idx.and_then(|i| row.get(i)) {
            let value = cell.to_string();
            if !value.trim().is_empty() {
                targets.push(value);
            }
        }
    }
    Ok(targets)
}

/// Profile links on a search-results page: anchors whose path contains
/// `marker`, resolved against `page_url`, canonicalised, in page order.
pub fn extract_profile_links(html: &str, page_url: &str, marker: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").unwrap();
    let base = Url::parse(page_url).ok();

    let links = document.select(&selector).filter_map(|element| {
        let href = element.value().attr("href")?;
        let joined = match &base {
            Some(base) => base.join(href).ok()?,
            None => Url::parse(href).ok()?,
        };
        if joined.path().contains(marker) {
            Some(joined.to_string())
        } else {
            None
        }
    });
    dedup_in_order(links)
}

/// Opens a search-results page through the session and collects the profile
/// links on it.
pub fn collect_from_search(
    driver: &mut dyn NavigationDriver,
    search_url: &str,
    marker: &str,
) -> Result<Vec<String>, InputError> {
    info!("Collecting profile links from {}", search_url);
    let page = driver.open(search_url).map_err(|e| InputError::Collect {
        url: search_url.to_string(),
        reason: e.to_string(),
    })?;
    let targets = extract_profile_links(&page.content, &page.url, marker);
    if targets.is_empty() {
        warn!("No profile links found on {}", search_url);
    } else {
        info!("Found {} profile links", targets.len());
    }
    Ok(targets)
}
