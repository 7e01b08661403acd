//! `git am` integration for applying downloaded mboxes.

use std::ffi::{OsStr, OsString};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::anyhow;
use tracing::info;

use crate::client::{CliError, CliResult};

/// Handle on the git executable.
#[derive(Debug, Clone)]
pub(crate) struct Git {
    program: OsString,
}

impl Default for Git {
    fn default() -> Self {
        Self::with_program("git")
    }
}

impl Git {
    pub(crate) fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Apply `mbox` with `git am`, using `-3` when no arguments are given.
    ///
    /// stdout and stderr share one pipe so the captured output keeps the
    /// order git wrote it in.
    pub(crate) fn am(&self, mbox: &Path, args: &[String]) -> CliResult<()> {
        let spawn_failure = |err: io::Error| {
            CliError::failure(anyhow!(
                "failed to run {}: {err}",
                self.program.to_string_lossy()
            ))
        };

        let (mut reader, writer) = io::pipe().map_err(spawn_failure)?;
        let mut child = {
            let mut command = Command::new(&self.program);
            command
                .args(build_am_args(args, mbox.as_os_str()))
                .stdin(Stdio::null())
                .stdout(writer.try_clone().map_err(spawn_failure)?)
                .stderr(writer);
            // the command's copies of the write end close when it drops
            command.spawn().map_err(spawn_failure)?
        };

        let mut captured = Vec::new();
        reader.read_to_end(&mut captured).map_err(|err| {
            CliError::failure(anyhow!("failed to read git am output: {err}"))
        })?;
        let status = child.wait().map_err(spawn_failure)?;
        let combined = String::from_utf8_lossy(&captured).into_owned();

        if !status.success() {
            return Err(CliError::Process {
                code: status.code().unwrap_or(1),
                output: combined,
            });
        }

        let combined = combined.trim_end();
        if !combined.is_empty() {
            info!("{combined}");
        }
        Ok(())
    }
}

pub(crate) fn build_am_args(args: &[String], mbox: &OsStr) -> Vec<OsString> {
    let mut am_args = vec![OsString::from("am")];
    if args.is_empty() {
        am_args.push(OsString::from("-3"));
    } else {
        am_args.extend(args.iter().map(OsString::from));
    }
    am_args.push(mbox.to_os_string());
    am_args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_three_way_merge() {
        let args = build_am_args(&[], OsStr::new("/tmp/1.patch"));
        assert_eq!(args, vec!["am", "-3", "/tmp/1.patch"]);
    }

    #[test]
    fn explicit_arguments_replace_default() {
        let args = build_am_args(
            &["--signoff".to_string(), "-q".to_string()],
            OsStr::new("series.mbox"),
        );
        assert_eq!(args, vec!["am", "--signoff", "-q", "series.mbox"]);
    }

    #[test]
    fn failing_command_surfaces_exit_code() {
        let git = Git::with_program("false");
        let err = git
            .am(Path::new("missing.mbox"), &[])
            .expect_err("false exits non-zero");
        assert!(matches!(err, CliError::Process { code: 1, .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn successful_command_is_ok() {
        let git = Git::with_program("true");
        assert!(git.am(Path::new("any.mbox"), &[]).is_ok());
    }

    #[test]
    fn captured_output_keeps_stream_order() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("fake-git");
        std::fs::write(
            &script,
            "#!/bin/sh\necho applying >&1\necho conflict >&2\necho stopped\nexit 128\n",
        )
        .expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");

        let err = Git::with_program(&script)
            .am(Path::new("x.mbox"), &[])
            .expect_err("script exits non-zero");
        match err {
            CliError::Process { code, output } => {
                assert_eq!(code, 128);
                assert_eq!(output, "applying\nconflict\nstopped\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_a_failure() {
        let git = Git::with_program("git-pw-no-such-program");
        let err = git.am(Path::new("x.mbox"), &[]).expect_err("spawn fails");
        assert!(matches!(err, CliError::Failure(_)));
    }
}
