//! Saved default flags.
//!
//! Defaults live in a plain file of CLI-style tokens, one or more per line,
//! with `#` comments. A local `.markjumprc` overrides the user-wide file and
//! flags given on the command line override both.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigFlags {
    pub width: Option<u16>,
    pub height: Option<u16>,
    pub header_inset: Option<u16>,
    pub no_heading_markers: bool,
    pub perf: bool,
    pub render_debug_log: Option<PathBuf>,
}

impl ConfigFlags {
    /// Merge `other` over `self`: switches are or-ed, options from `other` win.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            width: other.width.or(self.width),
            height: other.height.or(self.height),
            header_inset: other.header_inset.or(self.header_inset),
            no_heading_markers: self.no_heading_markers || other.no_heading_markers,
            perf: self.perf || other.perf,
            render_debug_log: other
                .render_debug_log
                .clone()
                .or_else(|| self.render_debug_log.clone()),
        }
    }
}

pub fn global_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("markjump").join("config");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("markjump")
                .join("config");
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("markjump").join("config");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join(".config")
                .join("markjump")
                .join("config");
        }
    }

    local_override_path()
}

pub fn local_override_path() -> PathBuf {
    PathBuf::from(".markjumprc")
}

pub fn load_config_flags(path: &Path) -> Result<ConfigFlags> {
    if !path.exists() {
        return Ok(ConfigFlags::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let tokens = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(|line| line.split_whitespace().map(ToOwned::to_owned))
        .collect::<Vec<_>>();
    Ok(parse_flag_tokens(&tokens))
}

pub fn save_config_flags(path: &Path, flags: &ConfigFlags) -> Result<()> {
    let mut lines = vec!["# markjump defaults (saved with --save)".to_string()];
    if let Some(width) = flags.width {
        lines.push(format!("--width {width}"));
    }
    if let Some(height) = flags.height {
        lines.push(format!("--height {height}"));
    }
    if let Some(inset) = flags.header_inset {
        lines.push(format!("--header-inset {inset}"));
    }
    if flags.no_heading_markers {
        lines.push("--no-heading-markers".to_string());
    }
    if flags.perf {
        lines.push("--perf".to_string());
    }
    if let Some(path) = &flags.render_debug_log {
        lines.push(format!("--render-debug-log {}", path.display()));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
    }
    fs::write(path, format!("{}\n", lines.join("\n")))
        .with_context(|| format!("Failed to write config {}", path.display()))
}

pub fn clear_config_flags(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Pick the flags markjump understands out of a token list.
///
/// Unknown tokens and malformed numbers are skipped.
pub fn parse_flag_tokens(tokens: &[String]) -> ConfigFlags {
    let mut flags = ConfigFlags::default();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_str();
        let (name, inline_value) = match token.split_once('=') {
            Some((name, value)) if name.starts_with("--") => (name, Some(value)),
            _ => (token, None),
        };
        let mut take_value = || {
            inline_value.map(ToOwned::to_owned).or_else(|| {
                let next = tokens.get(i + 1).cloned();
                if next.is_some() {
                    i += 1;
                }
                next
            })
        };
        match name {
            "--no-heading-markers" => flags.no_heading_markers = true,
            "--perf" => flags.perf = true,
            "--width" => flags.width = take_value().and_then(|v| v.parse().ok()),
            "--height" => flags.height = take_value().and_then(|v| v.parse().ok()),
            "--header-inset" => flags.header_inset = take_value().and_then(|v| v.parse().ok()),
            "--render-debug-log" => flags.render_debug_log = take_value().map(PathBuf::from),
            _ => {}
        }
        i += 1;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tokens(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_flag_tokens_extracts_known_flags() {
        let flags = parse_flag_tokens(&tokens(&[
            "markjump",
            "--width",
            "100",
            "--header-inset=2",
            "--no-heading-markers",
            "--render-debug-log=render.log",
            "--follow",
            "#intro",
            "README.md",
        ]));
        assert_eq!(flags.width, Some(100));
        assert_eq!(flags.header_inset, Some(2));
        assert!(flags.no_heading_markers);
        assert_eq!(flags.render_debug_log, Some(PathBuf::from("render.log")));
        assert_eq!(flags.height, None);
        assert!(!flags.perf);
    }

    #[test]
    fn test_parse_flag_tokens_skips_bad_numbers() {
        let flags = parse_flag_tokens(&tokens(&["--height", "tall", "--perf"]));
        assert_eq!(flags.height, None);
        assert!(flags.perf);
    }

    #[test]
    fn test_config_union_merges_cli_over_file_for_options() {
        let file = ConfigFlags {
            width: Some(72),
            height: Some(30),
            perf: true,
            ..ConfigFlags::default()
        };
        let cli = ConfigFlags {
            width: Some(120),
            no_heading_markers: true,
            ..ConfigFlags::default()
        };
        let merged = file.union(&cli);
        assert_eq!(merged.width, Some(120));
        assert_eq!(merged.height, Some(30));
        assert!(merged.perf);
        assert!(merged.no_heading_markers);
    }

    #[test]
    fn test_save_load_and_clear_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(".markjumprc");
        let flags = ConfigFlags {
            width: Some(90),
            height: Some(40),
            header_inset: Some(1),
            no_heading_markers: true,
            perf: true,
            render_debug_log: Some(PathBuf::from("render.log")),
        };

        save_config_flags(&path, &flags).unwrap();
        assert_eq!(load_config_flags(&path).unwrap(), flags);

        clear_config_flags(&path).unwrap();
        assert!(!path.exists());
        assert_eq!(load_config_flags(&path).unwrap(), ConfigFlags::default());
    }
}
