//! Structured external-command builders and runner.
//!
//! Arguments are pushed one token at a time and each token is checked on its
//! own, so a flag can never smuggle whitespace into a neighbouring argument.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ReelError, ReelResult};

/// Bytes of stderr kept in an [`ReelError::ExternalTool`].
const STDERR_TAIL: usize = 2000;

/// A program plus validated argument tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Adds a flag or value token; rejects empty or whitespace-padded tokens.
    pub fn arg(mut self, token: impl Into<String>) -> ReelResult<Self> {
        let token = token.into();
        validate_token(&self.program, &token)?;
        self.args.push(token.into());
        Ok(self)
    }

    pub fn args_from<I, S>(mut self, tokens: I) -> ReelResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for token in tokens {
            self = self.arg(token)?;
        }
        Ok(self)
    }

    /// Adds a filesystem path verbatim.
    pub fn path_arg(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push(path.as_ref().as_os_str().to_os_string());
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn display(&self) -> String {
        let mut s = self.program.clone();
        for a in &self.args {
            s.push(' ');
            s.push_str(&a.to_string_lossy());
        }
        s
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Runs to completion; non-zero exit becomes [`ReelError::ExternalTool`].
    pub async fn run(&self, stage: &'static str) -> ReelResult<()> {
        self.run_with_stdin(stage, None).await
    }

    /// Like [`run`](Self::run), feeding `input` on stdin.
    pub async fn run_with_stdin(&self, stage: &'static str, input: Option<&[u8]>) -> ReelResult<()> {
        ensure_program(stage, &self.program)?;
        debug!(stage, "Running: {}", self.display());

        let mut child = self
            .command()
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let (Some(bytes), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(bytes).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let trimmed = stderr.trim();
        let start = trimmed
            .char_indices()
            .rev()
            .nth(STDERR_TAIL.saturating_sub(1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        Err(ReelError::ExternalTool {
            stage,
            program: self.program.clone(),
            exit_code: output.status.code(),
            stderr: trimmed[start..].to_string(),
        })
    }
}

fn validate_token(program: &str, token: &str) -> ReelResult<()> {
    if token.is_empty() {
        return Err(ReelError::validation(
            None,
            format!("empty argument passed to {program}"),
        ));
    }
    if token.trim() != token {
        return Err(ReelError::validation(
            None,
            format!("argument {token:?} for {program} has surrounding whitespace"),
        ));
    }
    Ok(())
}

/// Checks `program` is resolvable in PATH.
pub fn ensure_program(stage: &'static str, program: &str) -> ReelResult<PathBuf> {
    which::which(program).map_err(|_| ReelError::ToolNotFound {
        stage,
        program: program.to_string(),
    })
}

/// One `-i` input with the options that precede it.
#[derive(Debug, Clone)]
struct FfmpegInput {
    options: Vec<String>,
    path: PathBuf,
}

/// Builder for ffmpeg invocations with any number of inputs.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<FfmpegInput>,
    output_args: Vec<String>,
    output: PathBuf,
}

impl FfmpegCommand {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output_args: Vec::new(),
            output: output.as_ref().to_path_buf(),
        }
    }

    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_with(Vec::<String>::new(), path)
    }

    /// Adds an input preceded by per-input options such as `-loop 1`.
    pub fn input_with<I, S>(mut self, options: I, path: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(FfmpegInput {
            options: options.into_iter().map(Into::into).collect(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    pub fn map(self, stream: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(stream)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn pixel_format(self, fmt: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(fmt)
    }

    pub fn frame_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    /// Hard cap on the number of video frames written.
    pub fn frames(self, n: u64) -> Self {
        self.output_arg("-frames:v").output_arg(n.to_string())
    }

    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    pub fn shortest(self) -> Self {
        self.output_arg("-shortest")
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn build(&self) -> ReelResult<ToolCommand> {
        let mut cmd = ToolCommand::new("ffmpeg")
            .arg("-y")?
            .args_from(["-v", "error"])?;
        for input in &self.inputs {
            cmd = cmd.args_from(input.options.iter().cloned())?;
            cmd = cmd.arg("-i")?.path_arg(&input.path);
        }
        cmd = cmd.args_from(self.output_args.iter().cloned())?;
        Ok(cmd.path_arg(&self.output))
    }

    /// Runs the command, creating the output's parent directory first.
    pub async fn run(&self, stage: &'static str) -> ReelResult<()> {
        if let Some(parent) = self.output().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.build()?.run(stage).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cmd: &ToolCommand) -> Vec<String> {
        cmd.args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_rejects_padded_tokens() {
        let err = ToolCommand::new("mfa").arg(" --single_speaker").unwrap_err();
        assert!(matches!(err, ReelError::Validation { .. }));
        assert!(ToolCommand::new("mfa").arg("").is_err());
        assert!(ToolCommand::new("mfa").arg("--single_speaker").is_ok());
    }

    #[test]
    fn test_path_args_kept_verbatim() {
        let cmd = ToolCommand::new("ffmpeg").path_arg("my clips/a b.mp4");
        assert_eq!(strings(&cmd), vec!["my clips/a b.mp4"]);
    }

    #[test]
    fn test_ffmpeg_builder_order() {
        let cmd = FfmpegCommand::new("out.mp4")
            .input_with(["-loop", "1"], "img.png")
            .input("voice.wav")
            .video_filter("scale=1080:1920")
            .video_codec("libx264")
            .frames(90)
            .shortest()
            .build()
            .unwrap();
        assert_eq!(cmd.program(), "ffmpeg");
        assert_eq!(
            strings(&cmd),
            vec![
                "-y", "-v", "error", "-loop", "1", "-i", "img.png", "-i", "voice.wav", "-vf",
                "scale=1080:1920", "-c:v", "libx264", "-frames:v", "90", "-shortest", "out.mp4",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let err = ToolCommand::new("reelsmith-definitely-not-installed")
            .run("lookup")
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::ToolNotFound { stage: "lookup", .. }));
    }

    #[tokio::test]
    async fn test_run_creates_output_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("clips/deep");
        let missing = dir.path().join("missing.png");

        // no usable input, so the run itself fails whether or not ffmpeg exists
        let result = FfmpegCommand::new(nested.join("out.mp4"))
            .input(&missing)
            .run("render")
            .await;
        assert!(result.is_err());
        assert!(nested.is_dir());
    }
}
