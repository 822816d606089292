// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Cache command - manage the cache store

use colored::Colorize;
use miette::Result;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use super::CacheAction;
use crate::cache::{default_cache_dir, format_size, CacheStore, FilesystemCache};

/// Run the cache command
pub async fn run(action: CacheAction, cache_dir: Option<PathBuf>, _verbose: bool) -> Result<()> {
    let cache_dir = cache_dir.unwrap_or_else(default_cache_dir);
    let cache = FilesystemCache::new(cache_dir.clone())?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats().await?;

            println!("{}", "Cache Statistics".bold());
            println!("{}", "═".repeat(40));
            println!("  Location: {}", cache_dir.display());
            println!("  Entries:  {}", stats.entries);
            println!("  Size:     {}", stats.formatted_size());

            if let Some(oldest) = stats.oldest_entry {
                if let Ok(duration) = oldest.elapsed() {
                    println!("  Oldest:   {} ago", format_age(duration));
                }
            }

            if let Some(newest) = stats.newest_entry {
                if let Ok(duration) = newest.elapsed() {
                    println!("  Newest:   {} ago", format_age(duration));
                }
            }

            Ok(())
        }

        CacheAction::Clear { yes } => {
            let stats = cache.stats().await?;

            if stats.entries == 0 {
                println!("{}", "Cache is already empty.".dimmed());
                return Ok(());
            }

            if !yes {
                print!(
                    "Clear {} cache entries ({})? [y/N] ",
                    stats.entries,
                    stats.formatted_size()
                );
                io::stdout().flush().ok();

                let mut input = String::new();
                io::stdin().read_line(&mut input).ok();

                if !input.trim().eq_ignore_ascii_case("y") {
                    println!("{}", "Cancelled.".dimmed());
                    return Ok(());
                }
            }

            cache.clear().await?;
            println!("{}", "Cache cleared.".green());

            Ok(())
        }

        CacheAction::List => {
            let entries = cache.list().await?;

            println!("{}", "Cached Entries".bold());
            println!("{}", "═".repeat(40));

            if entries.is_empty() {
                println!("{}", "  No cached entries.".dimmed());
                return Ok(());
            }

            for entry in &entries {
                let age = entry
                    .created
                    .elapsed()
                    .map(|d| format!("{} ago", format_age(d)))
                    .unwrap_or_default();
                println!(
                    "  {} {}",
                    entry.key,
                    format!(
                        "{} file(s), {}, {}",
                        entry.files,
                        format_size(entry.size_bytes),
                        age
                    )
                    .dimmed()
                );
            }

            Ok(())
        }

        CacheAction::Remove { key } => {
            if cache.invalidate(&key).await? {
                println!("{} {}", "Removed".green(), key);
                Ok(())
            } else {
                Err(miette::miette!("No cache entry named '{}'", key))
            }
        }
    }
}

fn format_age(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(Duration::from_secs(5)), "5s");
        assert_eq!(format_age(Duration::from_secs(150)), "2m");
        assert_eq!(format_age(Duration::from_secs(7300)), "2h");
        assert_eq!(format_age(Duration::from_secs(200_000)), "2d");
    }
}
