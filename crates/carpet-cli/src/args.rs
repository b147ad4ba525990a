//! Argument parsing and path expansion.

use anyhow::{Context, Result, bail};
use carpet_core::{DEFAULT_PORT, Mode, Os};
use clap::{ArgGroup, Parser};
use std::path::{Path, PathBuf};

/// Usage examples printed after configuration errors.
pub const USAGE: &str = "\
Single file usage:
(Windows) > flyingcarpet --send movie.mp4 --peer mac
[Enter password from receiving end.]
  (Mac)   $ flyingcarpet --receive ./destinationFolder --peer windows
[Enter password into sending end.]

Multiple file usage:
 (Linux)  $ flyingcarpet --send multi --peer windows ../Pictures/*.jpg \"Filename with spaces.txt\" movie.mp4
[Enter password from receiving end.]
(Windows) > flyingcarpet --receive .\\picturesFolder --peer linux
[Enter password into sending end.]";

/// Flying Carpet - encrypted file transfer over a self-hosted ad-hoc
/// wireless link
#[derive(Parser)]
#[command(name = "flyingcarpet")]
#[command(author, version, about, after_help = USAGE)]
#[command(group = ArgGroup::new("direction").required(true).args(["send", "receive"]))]
pub struct Cli {
    /// File to be sent, or the literal `multi` with files and globs
    /// listed after the other flags
    #[arg(long, value_name = "PATH|multi")]
    pub send: Option<String>,

    /// Destination directory for files to be received
    #[arg(long, value_name = "DIR")]
    pub receive: Option<PathBuf>,

    /// Operating system of the other computer: linux, mac, or windows
    #[arg(long)]
    pub peer: Os,

    /// TCP port to use (must match on both ends)
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Files and globs for `--send multi`
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// Turn parsed flags into a transfer mode with final, absolute paths.
///
/// Glob expansion applies to each positional argument under
/// `--send multi`; a pattern that matches nothing is kept as a literal
/// path so the engine can report it missing by name.
pub fn build_mode(cli: &Cli) -> Result<Mode> {
    if let Some(dir) = &cli.receive {
        if !cli.files.is_empty() {
            bail!("positional files are only valid with --send multi");
        }
        return Ok(Mode::Receive(absolute(dir)?));
    }

    let send = cli
        .send
        .as_deref()
        .expect("clap guarantees one of --send/--receive");

    if send == "multi" {
        let mut expanded = Vec::new();
        for pattern in &cli.files {
            expanded.extend(expand_pattern(pattern)?);
        }
        if expanded.is_empty() {
            bail!(
                "No files found to send! When using --send multi, list files to send after other flags. Wildcards accepted."
            );
        }
        Ok(Mode::Send(expanded))
    } else {
        if !cli.files.is_empty() {
            bail!("positional files are only valid with --send multi");
        }
        Ok(Mode::Send(vec![absolute(Path::new(send))?]))
    }
}

/// Expand one positional argument: glob matches, or the literal path when
/// the pattern matches nothing.
fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut matches = Vec::new();
    if let Ok(paths) = glob::glob(pattern) {
        for entry in paths {
            let path =
                entry.with_context(|| format!("error expanding glob {pattern}"))?;
            matches.push(absolute(&path)?);
        }
    }
    if matches.is_empty() {
        matches.push(absolute(Path::new(pattern))?);
    }
    Ok(matches)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("error getting absolute path for {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn cli(argv: &[&str]) -> Cli {
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_requires_exactly_one_direction() {
        assert!(Cli::try_parse_from(["flyingcarpet", "--peer", "mac"]).is_err());
        assert!(
            Cli::try_parse_from([
                "flyingcarpet", "--send", "a", "--receive", "b", "--peer", "mac"
            ])
            .is_err()
        );
    }

    #[test]
    fn test_port_defaults_to_3290() {
        let cli = cli(&["flyingcarpet", "--send", "a.bin", "--peer", "linux"]);
        assert_eq!(cli.port, 3290);
    }

    #[test]
    fn test_single_file_send_is_absolute() {
        let cli = cli(&["flyingcarpet", "--send", "a.bin", "--peer", "linux"]);
        let mode = build_mode(&cli).unwrap();
        match mode {
            Mode::Send(paths) => {
                assert_eq!(paths.len(), 1);
                assert!(paths[0].is_absolute());
                assert!(paths[0].ends_with("a.bin"));
            }
            Mode::Receive(_) => panic!("expected send mode"),
        }
    }

    #[test]
    fn test_multi_expands_globs() {
        let dir = TempDir::new().unwrap();
        for name in ["one.jpg", "two.jpg", "three.txt"] {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            f.write_all(b"x").unwrap();
        }
        let pattern = dir.path().join("*.jpg");
        let cli = cli(&[
            "flyingcarpet",
            "--send",
            "multi",
            "--peer",
            "windows",
            pattern.to_str().unwrap(),
        ]);
        let Mode::Send(paths) = build_mode(&cli).unwrap() else {
            panic!("expected send mode");
        };
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.extension().unwrap() == "jpg"));
    }

    #[test]
    fn test_multi_with_no_files_is_an_error() {
        let cli = cli(&["flyingcarpet", "--send", "multi", "--peer", "mac"]);
        assert!(build_mode(&cli).is_err());
    }

    #[test]
    fn test_unmatched_pattern_kept_as_literal() {
        let cli = cli(&[
            "flyingcarpet",
            "--send",
            "multi",
            "--peer",
            "linux",
            "/definitely/not/here.bin",
        ]);
        let Mode::Send(paths) = build_mode(&cli).unwrap() else {
            panic!("expected send mode");
        };
        assert_eq!(paths, vec![PathBuf::from("/definitely/not/here.bin")]);
    }

    #[test]
    fn test_positionals_rejected_outside_multi() {
        let cli1 = cli(&[
            "flyingcarpet", "--send", "a.bin", "--peer", "linux", "extra.bin",
        ]);
        assert!(build_mode(&cli1).is_err());

        let cli2 = cli(&[
            "flyingcarpet", "--receive", "/tmp", "--peer", "linux", "extra.bin",
        ]);
        assert!(build_mode(&cli2).is_err());
    }

    #[test]
    fn test_peer_parses_all_platforms() {
        for (arg, os) in [("linux", Os::Linux), ("mac", Os::Mac), ("windows", Os::Windows)] {
            let cli = cli(&["flyingcarpet", "--receive", "/tmp", "--peer", arg]);
            assert_eq!(cli.peer, os);
        }
        assert!(Cli::try_parse_from(["flyingcarpet", "--receive", "/tmp", "--peer", "bsd"]).is_err());
    }
}
