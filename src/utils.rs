use std::io::{self, Write};
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, instrument};

static UNKNOWN: &str = "unknown";
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Makes `input` safe to use as a single path segment.
///
/// Windows-reserved characters become `_`, whitespace runs collapse to one
/// space and the result is trimmed. Input that ends up empty, or made only
/// of dots, yields `unknown` so it can never name `.` or `..`.
pub fn sanitize_filename(input: Option<&str>) -> String {
    let Some(input) = input else {
        return UNKNOWN.to_owned();
    };

    let replaced: String = input
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();

    let cleaned = WHITESPACE.replace_all(&replaced, " ");
    let cleaned = cleaned.trim();
    if cleaned.chars().all(|c| c == '.') {
        return UNKNOWN.to_owned();
    }
    cleaned.to_owned()
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    debug!("user input: {}", input.trim());
    Ok(input.trim().to_owned())
}

#[instrument]
pub fn get_user_input() -> Result<String> {
    let url = prompt("Enter a comic or chapter URL: ")?;
    if url.is_empty() {
        anyhow::bail!("no URL entered");
    }
    Ok(url)
}

/// Asks for an inclusive chapter range. Empty answers take the defaults.
#[instrument]
pub fn get_chapter_range(max_chapter: f64) -> Result<(f64, f64)> {
    let last = if max_chapter > 0.0 { max_chapter } else { 1000.0 };

    let from = prompt("From chapter [1]: ")?;
    let from = if from.is_empty() { 1.0 } else { from.parse::<f64>()? };

    let to = prompt(&format!("To chapter [{}]: ", last))?;
    let to = if to.is_empty() { last } else { to.parse::<f64>()? };

    Ok((from, to))
}

pub fn confirm(message: &str) -> Result<bool> {
    Ok(prompt(message)?.to_lowercase() == "y")
}

#[instrument]
pub fn display_elapsed_time(duration: std::time::Duration) {
    let total_ms = duration.as_millis();

    if total_ms >= 60000 {
        let mins = total_ms / 60000;
        let secs = (total_ms % 60000) / 1000;
        info!("✅ Done in {}m {}s", mins, secs);
    } else if total_ms >= 1000 {
        let secs = total_ms / 1000;
        let ms_remaining = total_ms % 1000;

        if ms_remaining > 0 {
            info!("✅ Done in {}s {}ms", secs, ms_remaining);
        } else {
            info!("✅ Done in {}s", secs);
        }
    } else {
        info!("✅ Done in {}ms", total_ms);
    }
}
